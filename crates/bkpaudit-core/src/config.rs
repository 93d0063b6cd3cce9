//! Run configuration.
//!
//! Every field has a default, so an empty TOML file is a valid
//! configuration apart from the storage root, which callers normally supply.
//!
//! ```toml
//! storage_root = "/mnt/bkp/VSC"
//! extensions = [".rar", ".zip", ".lscx"]
//! retry_attempts = 3
//! retry_delay_secs = 2
//! network_timeout_secs = 30
//! workers = 5
//! date_format = "%d/%m/%Y"
//!
//! [mail]
//! server = "smtp.example.com"
//! from = "backups@example.com"
//! to = ["it@example.com"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::RetryPolicy;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn default_extensions() -> Vec<String> {
    vec![".rar".into(), ".zip".into(), ".lscx".into()]
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

fn default_network_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    5
}

fn default_date_format() -> String {
    "%d/%m/%Y".into()
}

/// Settings for one verification run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Root of the backup share
    pub storage_root: PathBuf,
    /// Backup file extensions, matched case-insensitively
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Attempts per transient operation, including the first
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Upper bound for a single storage call or directory listing
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
    /// Concurrent directory scans
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// chrono format for dates written to cells and reports
    #[serde(default = "default_date_format")]
    pub date_format: String,
    pub mail: Option<MailConfig>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::new(),
            extensions: default_extensions(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            network_timeout_secs: default_network_timeout_secs(),
            workers: default_workers(),
            date_format: default_date_format(),
            mail: None,
        }
    }
}

impl AuditConfig {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            ..Self::default()
        }
    }

    /// Parse TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "storage_root",
                reason: "must not be empty".into(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid {
                field: "workers",
                reason: "must be at least 1".into(),
            });
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.normalized_extensions().is_empty() {
            return Err(ConfigError::Invalid {
                field: "extensions",
                reason: "at least one backup extension is required".into(),
            });
        }
        Ok(())
    }

    /// Extensions lower-cased and without the leading dot.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_subject() -> String {
    "Missing Backup Report".into()
}

/// SMTP delivery settings for the missing-backup report.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct MailConfig {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl MailConfig {
    pub fn new(server: impl Into<String>, from: impl Into<String>, to: Vec<String>) -> Self {
        Self {
            server: server.into(),
            port: default_smtp_port(),
            username: None,
            password: None,
            from: from.into(),
            to,
            subject: default_subject(),
        }
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish()
    }
}
