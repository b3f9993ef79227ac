use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::remote::RemoteError;

use super::{Mail, Mailer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    /// 465 for implicit TLS.
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, RemoteError> {
        let from = config
            .from_email
            .parse()
            .map_err(|e| RemoteError::unconfigured(format!("invalid from address: {e}")))?;
        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| RemoteError::unconfigured(format!("failed to create SMTP transport: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();
        tracing::info!(host = %config.host, port = config.port, "SMTP transport configured");
        Ok(Self { transport, from })
    }

    fn build(&self, mail: &Mail) -> Result<Message, RemoteError> {
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| RemoteError::mail(format!("invalid to address: {e}")))?;
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(mail.subject.as_str());
        if let Some(cc) = &mail.cc {
            let cc: Mailbox = cc
                .parse()
                .map_err(|e| RemoteError::mail(format!("invalid cc address: {e}")))?;
            builder = builder.cc(cc);
        }
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .map_err(|e| RemoteError::mail(format!("failed to build email: {e}")))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: Mail) -> Result<(), RemoteError> {
        let message = self.build(&mail)?;
        let transport = self.transport.clone();
        // The blocking transport must stay off the async workers.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| RemoteError::mail(format!("send task failed: {e}")))?
            .map_err(|e| RemoteError::mail(format!("failed to send email: {e}")))?;
        tracing::info!(to = %mail.to, "mail sent");
        Ok(())
    }
}
