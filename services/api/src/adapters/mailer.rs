//! services/api/src/adapters/mailer.rs
//!
//! Implementations of the `MailService` port: SMTP delivery through `lettre`,
//! and a logging fallback used when no relay is configured.

use crate::config::SmtpConfig;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use lms_core::ports::{MailService, OutboundMail, PortError, PortResult};
use tracing::{info, instrument};

/// Parses a bare recipient address (`user@domain`, no display name).
pub fn parse_address(raw: &str) -> PortResult<Address> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| PortError::Invalid(format!("Invalid recipient '{}': {e}", raw.trim())))
}

/// Sends mail through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Port 465 uses implicit TLS, ports 25 and 1025 plain SMTP (local relays
    /// and mail catchers), anything else STARTTLS.
    pub fn new(config: &SmtpConfig, from: &str) -> PortResult<Self> {
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| PortError::Invalid(format!("Invalid MAIL_FROM address: {e}")))?;
        let tls_error = |e: lettre::transport::smtp::Error| {
            PortError::Unexpected(format!("Failed to configure SMTP relay: {e}"))
        };
        let mut builder = match config.port {
            465 => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(tls_error)?,
            25 | 1025 => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(tls_error)?,
        }
        .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailService for SmtpMailer {
    fn check_recipient(&self, address: &str) -> PortResult<()> {
        parse_address(address).map(drop)
    }

    #[instrument(skip(self, mail), fields(to = %mail.to, subject = %mail.subject))]
    async fn send(&self, mail: OutboundMail) -> PortResult<()> {
        let to = Mailbox::new(None, parse_address(&mail.to)?);
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject)
            .multipart(MultiPart::alternative_plain_html(
                mail.text_body,
                mail.html_body,
            ))
            .map_err(|e| PortError::Unexpected(format!("Failed to build message: {e}")))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        info!("mail delivered");
        Ok(())
    }
}

/// Logs outbound mail instead of sending it.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl MailService for LogMailer {
    fn check_recipient(&self, address: &str) -> PortResult<()> {
        parse_address(address).map(drop)
    }

    async fn send(&self, mail: OutboundMail) -> PortResult<()> {
        info!(
            to = %mail.to,
            subject = %mail.subject,
            "SMTP is not configured; mail not sent:\n{}",
            mail.text_body
        );
        Ok(())
    }
}
