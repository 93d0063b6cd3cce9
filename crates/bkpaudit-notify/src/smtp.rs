//! SMTP delivery through lettre.

use std::time::Duration;

use bkpaudit_core::MailConfig;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::debug;

use crate::{DeliveryError, MailTransport, OutgoingMessage};

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// STARTTLS relay sender.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, DeliveryError> {
        let from = parse_mailbox(&config.from)?;

        let mut builder = SmtpTransport::starttls_relay(&config.server)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .port(config.port)
            .timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        debug!(server = %config.server, port = config.port, "smtp transport ready");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn build(&self, message: &OutgoingMessage) -> Result<Message, DeliveryError> {
        if message.recipients.is_empty() {
            return Err(DeliveryError::NoRecipients);
        }
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_HTML);
        for recipient in &message.recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }
        builder
            .body(message.html_body.clone())
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

impl MailTransport for SmtpMailer {
    fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        let email = self.build(message)?;
        self.transport
            .send(&email)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.trim().parse().map_err(|e: lettre::address::AddressError| DeliveryError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}
