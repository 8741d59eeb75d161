//! services/api/src/adapters/smtp.rs
//!
//! This module contains the mailer adapters. `SmtpMailer` delivers
//! notification emails over SMTP using `lettre`; `LogMailer` stands in when
//! no SMTP account is configured and only logs what would have been sent.

use async_trait::async_trait;
use forum_core::domain::Email;
use forum_core::ports::{Mailer, PortError, PortResult};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::config::SmtpConfig;

/// A mailer that sends over SMTP.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    reply_to: Option<Mailbox>,
}

impl SmtpMailer {
    /// Builds the transport and sender identity from the SMTP configuration.
    pub fn new(config: &SmtpConfig) -> Result<Self, crate::error::ApiError> {
        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        }
        .map_err(|e| crate::error::ApiError::Internal(format!("SMTP transport: {e}")))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        let from = format!("{} <{}>", config.name, config.email)
            .parse::<Mailbox>()
            .map_err(|e| crate::error::ApiError::Internal(format!("SMTP_EMAIL: {e}")))?;
        let reply_to = match &config.reply_to {
            Some(address) => Some(
                address
                    .parse::<Mailbox>()
                    .map_err(|e| crate::error::ApiError::Internal(format!("SMTP_REPLY_TO: {e}")))?,
            ),
            None => None,
        };

        Ok(Self { transport, from, reply_to })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> PortResult<()> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| PortError::Unexpected(format!("recipient address: {e}")))?;

        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .header(ContentType::TEXT_HTML);
        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(reply_to.clone());
        }
        let message = builder
            .body(email.html_body.clone())
            .map_err(|e| PortError::Unexpected(format!("message build: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| PortError::Unexpected(format!("SMTP send: {e}")))?;
        Ok(())
    }
}

/// A mailer that logs instead of sending. Used when SMTP is not configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> PortResult<()> {
        info!(to = %email.to, subject = %email.subject, "Email delivery skipped (no SMTP configured)");
        Ok(())
    }
}
