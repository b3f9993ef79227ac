use async_trait::async_trait;

use crate::remote::RemoteError;

use super::{Mail, Mailer};

/// Prints mail to stdout instead of sending it (development).
#[derive(Debug, Default)]
pub struct ConsoleMailer;

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, mail: Mail) -> Result<(), RemoteError> {
        println!();
        println!("========================================");
        println!("  TO: {}", mail.to);
        if let Some(cc) = &mail.cc {
            println!("  CC: {cc}");
        }
        println!("  SUBJECT: {}", mail.subject);
        println!("----------------------------------------");
        println!("{}", mail.body);
        println!("========================================");
        println!();

        tracing::info!(to = %mail.to, subject = %mail.subject, "mail printed to console");
        Ok(())
    }
}
