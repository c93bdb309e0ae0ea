//! Email notification delivery via SMTP.
//!
//! [`EmailDelivery`] wraps the `lettre` async SMTP transport. If `SMTP_HOST`
//! is not set, [`EmailConfig::from_env`] returns `None` and no relay should
//! be started.

use importdump_db::repositories::UserRepo;
use importdump_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::PlatformEvent;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@importdump.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable        | Required | Default                     |
    /// |-----------------|----------|-----------------------------|
    /// | `SMTP_HOST`     | yes      | none                        |
    /// | `SMTP_PORT`     | no       | `587`                       |
    /// | `SMTP_FROM`     | no       | `noreply@importdump.local`  |
    /// | `SMTP_USER`     | no       | none                        |
    /// | `SMTP_PASSWORD` | no       | none                        |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailDelivery
// ---------------------------------------------------------------------------

/// Sends notification emails via SMTP.
pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Plain-text subject and body for a notification event.
    pub fn render(event: &PlatformEvent) -> (String, String) {
        let category = event.category().unwrap_or(&event.event_type);
        let subject = match event.request_id {
            Some(id) => format!("[ImportDump] {category} (request #{id})"),
            None => format!("[ImportDump] {category}"),
        };
        let mut body = format!("Notification: {category}\nTime: {}\n", event.timestamp);
        if let Some(url) = event.payload.get("request-url").and_then(|v| v.as_str()) {
            body.push_str(&format!("Request: {url}\n"));
        }
        if let Some(reason) = event.payload.get("reason").and_then(|v| v.as_str()) {
            body.push_str(&format!("\n{reason}\n"));
        }
        (subject, body)
    }

    pub async fn deliver(&self, to_email: &str, event: &PlatformEvent) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let (subject, body) = Self::render(event);

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;

        tracing::info!(to = to_email, event_type = %event.event_type, "Notification email sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EmailRelay
// ---------------------------------------------------------------------------

/// Bus subscriber that emails each notification's receiver, best effort.
pub struct EmailRelay {
    pool: DbPool,
    delivery: EmailDelivery,
}

impl EmailRelay {
    pub fn new(pool: DbPool, delivery: EmailDelivery) -> Self {
        Self { pool, delivery }
    }

    /// Run until the bus is dropped.
    pub async fn run(self, mut receiver: broadcast::Receiver<PlatformEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => self.relay(&event).await,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Email relay lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, email relay shutting down");
                    break;
                }
            }
        }
    }

    async fn relay(&self, event: &PlatformEvent) {
        let Some(receiver_id) = event.receiver_id else {
            return;
        };
        let user = match UserRepo::find_by_id(&self.pool, receiver_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(error = %e, receiver_id, "Failed to look up email receiver");
                return;
            }
        };
        let Some(email) = user.email.filter(|e| !e.is_empty()) else {
            return;
        };
        if let Err(e) = self.delivery.deliver(&email, event).await {
            tracing::warn!(error = %e, receiver_id, "Notification email failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use importdump_core::notification::{Notification, CATEGORY_IMPORT_FAILED};

    use super::*;

    #[test]
    fn email_error_display_build() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }

    #[test]
    fn email_error_display_address() {
        let addr_err: Result<lettre::Address, _> = "not-an-email".parse();
        let err = EmailError::Address(addr_err.unwrap_err());
        assert!(err.to_string().contains("Email address parse error"));
    }

    #[test]
    fn render_includes_link_and_reason() {
        let n = Notification::new(CATEGORY_IMPORT_FAILED, 3, 1)
            .with_extra("request-url", "/queue/3")
            .with_extra("reason", "file missing");
        let (subject, body) = EmailDelivery::render(&PlatformEvent::for_receiver(&n, 2));
        assert_eq!(subject, "[ImportDump] import-failed (request #3)");
        assert!(body.contains("Request: /queue/3"));
        assert!(body.contains("file missing"));
    }
}
