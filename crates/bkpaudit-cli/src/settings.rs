//! Configuration assembly: TOML file, then environment and flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bkpaudit_core::{AuditConfig, MailConfig};
use clap::Args;
use tracing::{debug, warn};

/// Options shared by every command that touches storage.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root of the backup storage share
    #[arg(long, value_name = "DIR", env = "BKPAUDIT_STORAGE_ROOT")]
    pub storage_root: Option<PathBuf>,

    /// Scan worker count
    #[arg(long)]
    pub workers: Option<usize>,

    #[command(flatten)]
    pub mail: MailArgs,
}

/// SMTP overrides.
#[derive(Args, Debug, Default)]
pub struct MailArgs {
    /// SMTP relay host
    #[arg(long, env = "SMTP_SERVER")]
    pub smtp_server: Option<String>,

    /// SMTP port
    #[arg(long, env = "SMTP_PORT")]
    pub smtp_port: Option<u16>,

    /// SMTP user name
    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    /// SMTP password
    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    pub smtp_pass: Option<String>,

    /// Sender address
    #[arg(long, env = "FROM_EMAIL")]
    pub from_email: Option<String>,

    /// Recipients, comma-separated
    #[arg(long, env = "TO_EMAIL", value_delimiter = ',')]
    pub to_email: Vec<String>,
}

impl ConfigArgs {
    /// File values, overridden by environment and flags. Not validated.
    pub fn load(&self) -> Result<AuditConfig> {
        let mut config = match &self.config {
            Some(path) => {
                debug!(path = %path.display(), "loading configuration");
                AuditConfig::load(path).with_context(|| format!("loading {}", path.display()))?
            }
            None => AuditConfig::default(),
        };
        if let Some(root) = &self.storage_root {
            config.storage_root = root.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        self.mail.apply(&mut config);
        Ok(config)
    }
}

impl MailArgs {
    fn is_empty(&self) -> bool {
        self.smtp_server.is_none()
            && self.smtp_port.is_none()
            && self.smtp_user.is_none()
            && self.smtp_pass.is_none()
            && self.from_email.is_none()
            && self.to_email.is_empty()
    }

    fn apply(&self, config: &mut AuditConfig) {
        if self.is_empty() {
            return;
        }
        let mut mail = config
            .mail
            .take()
            .unwrap_or_else(|| MailConfig::new(String::new(), String::new(), Vec::new()));
        if let Some(server) = &self.smtp_server {
            mail.server.clone_from(server);
        }
        if let Some(port) = self.smtp_port {
            mail.port = port;
        }
        if self.smtp_user.is_some() {
            mail.username.clone_from(&self.smtp_user);
        }
        if self.smtp_pass.is_some() {
            mail.password.clone_from(&self.smtp_pass);
        }
        if let Some(from) = &self.from_email {
            mail.from.clone_from(from);
        }
        let to: Vec<String> = self
            .to_email
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if !to.is_empty() {
            mail.to = to;
        }

        if mail.server.trim().is_empty() {
            warn!("mail settings given without an SMTP server, mail disabled");
            config.mail = None;
        } else {
            config.mail = Some(mail);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
storage_root = "/mnt/bkp"
workers = 3

[mail]
server = "smtp.example.com"
from = "a@example.com"
to = ["b@example.com"]
"#,
        )
        .unwrap();

        let args = ConfigArgs {
            config: Some(file.path().to_path_buf()),
            storage_root: Some(PathBuf::from("/srv/storage")),
            mail: MailArgs {
                smtp_port: Some(2525),
                to_email: vec!["x@example.com".into(), " ".into(), "y@example.com".into()],
                ..MailArgs::default()
            },
            ..ConfigArgs::default()
        };
        let config = args.load().unwrap();

        assert_eq!(config.storage_root, PathBuf::from("/srv/storage"));
        assert_eq!(config.workers, 3);
        let mail = config.mail.unwrap();
        assert_eq!(mail.server, "smtp.example.com");
        assert_eq!(mail.port, 2525);
        assert_eq!(mail.to, vec!["x@example.com".to_string(), "y@example.com".to_string()]);
    }

    #[test]
    fn mail_without_server_is_disabled() {
        let args = ConfigArgs {
            mail: MailArgs {
                from_email: Some("a@example.com".into()),
                ..MailArgs::default()
            },
            ..ConfigArgs::default()
        };
        assert!(args.load().unwrap().mail.is_none());
    }

    #[test]
    fn no_file_means_defaults() {
        let config = ConfigArgs::default().load().unwrap();
        assert_eq!(config.workers, 5);
        assert_eq!(config.retry_attempts, 3);
        assert!(config.mail.is_none());
    }
}
