//! Outbound notification mail.

pub mod console;
pub mod smtp;
pub mod templates;

use async_trait::async_trait;

use crate::remote::RemoteError;

pub use console::ConsoleMailer;
pub use smtp::{SmtpConfig, SmtpMailer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub cc: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), RemoteError>;
}

/// Send and record the outcome. Failures are logged, never retried.
pub async fn deliver(mailer: &dyn Mailer, mail: Mail) -> Result<(), RemoteError> {
    let to = mail.to.clone();
    let result = mailer.send(mail).await;
    let status = if result.is_ok() { "sent" } else { "failed" };
    metrics::counter!(crate::observability::MAILS_TOTAL, "status" => status).increment(1);
    if let Err(e) = &result {
        tracing::warn!(to = %to, "mail delivery failed: {e}");
    }
    result
}
