//! # bkpaudit-notify
//!
//! Missing-backup notification for bkpaudit.
//!
//! This crate provides:
//! - `NotificationComposer`: collects every week cell still marked
//!   `NOT FOUND` into per-entity groups and renders an HTML report
//! - `MailTransport`: the delivery seam, with `SmtpMailer` as the
//!   production implementation
//!
//! An empty report is never sent. Delivery failures are reported as a
//! [`NotificationOutcome`] and never affect the annotated workbook.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use bkpaudit_core::{CancellationToken, MailConfig};
//! use bkpaudit_notify::{NotificationComposer, SmtpMailer};
//! use bkpaudit_sheet::Workbook;
//!
//! let to = vec!["it@example.com".to_string()];
//! let mail = MailConfig::new("smtp.example.com", "audit@example.com", to);
//! let mailer = SmtpMailer::from_config(&mail).unwrap();
//! let book = Workbook::open(Path::new("tracking.xlsx")).unwrap();
//!
//! let composer = NotificationComposer::from_config(&mail, "%d/%m/%Y");
//! let today = chrono::Local::now().date_naive();
//! let outcome = composer.notify(&book, today, &mailer, &CancellationToken::new());
//! println!("{outcome}");
//! ```

use std::fmt;

use serde::Serialize;
use thiserror::Error;

mod compose;
mod smtp;

pub use compose::{render_html, NotificationComposer};
pub use smtp::SmtpMailer;

/// Mail delivery error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("no recipients configured")]
    NoRecipients,

    #[error("invalid address {address:?}: {message}")]
    Address { address: String, message: String },

    #[error("cannot build message: {0}")]
    Build(String),

    #[error("mail transport failed: {0}")]
    Transport(String),
}

/// A report ready to hand to a [`MailTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub subject: String,
    pub html_body: String,
    pub recipients: Vec<String>,
}

/// Delivers composed reports.
///
/// Implementations report failures through the returned error and must not
/// panic.
pub trait MailTransport: Send {
    fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError>;
}

/// What happened to the notification step of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Notification was not requested
    Skipped,
    /// No cell is marked `NOT FOUND`; nothing to report
    Suppressed,
    /// The report was handed off for delivery
    Sent { groups: usize },
    /// Composition succeeded but delivery did not
    DeliveryFailed(String),
    /// Cancellation was observed before hand-off
    Cancelled,
}

impl fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationOutcome::Skipped => write!(f, "notification skipped"),
            NotificationOutcome::Suppressed => write!(f, "no missing backups, nothing sent"),
            NotificationOutcome::Sent { groups } => write!(f, "report sent ({groups} group(s))"),
            NotificationOutcome::DeliveryFailed(reason) => write!(f, "delivery failed: {reason}"),
            NotificationOutcome::Cancelled => write!(f, "notification cancelled"),
        }
    }
}
