use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

use crate::config::SmtpConfig;
use crate::error::{AppError, Result};
use crate::types::AlertPayload;

/// Port that speaks TLS from the first byte; anything else upgrades with STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &AlertPayload) -> Result<()>;
}

/// Plaintext mail over SMTP.
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn message(&self, alert: &AlertPayload, from: &str, to: &str) -> Result<Message> {
        let from: Mailbox = from.parse()?;
        let to: Mailbox = to.parse()?;
        let msg = Message::builder()
            .from(from)
            .to(to)
            .subject(alert.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(alert.body.clone())?;
        Ok(msg)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, alert: &AlertPayload) -> Result<()> {
        let SmtpConfig {
            host: Some(host),
            port,
            user: Some(user),
            password: Some(password),
            from: Some(from),
            to: Some(to),
        } = &self.config
        else {
            return Err(AppError::Delivery("Missing SMTP/EMAIL_* settings".to_string()));
        };

        let email = self.message(alert, from, to)?;
        let creds = Credentials::new(user.clone(), password.clone());

        let builder = if *port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        };
        let mailer = builder.port(*port).credentials(creds).build();

        debug!(host = %host, port, "connecting to SMTP server");
        mailer.send(email).await?;
        info!(to = %to, subject = %alert.subject, "deal alert sent");
        Ok(())
    }
}
