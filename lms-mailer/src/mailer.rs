use crate::config::SmtpConfig;
use crate::transports::SmtpTransport;
use crate::{Email, MailerError};
use async_trait::async_trait;

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the message and returns the `Message-ID` it was sent with.
    async fn send_email(&self, email: &Email) -> Result<String, MailerError>;

    /// Checks that the provider accepts connections, without sending anything.
    async fn test_connection(&self) -> Result<bool, MailerError>;
}

/// Builds transports for the two configured providers.
///
/// Called once per delivery attempt; implementations must hand back a fresh transport each
/// time rather than a shared pooled one.
pub trait TransportFactory: Send + Sync {
    fn build_primary(&self, config: &SmtpConfig) -> Result<Box<dyn Mailer>, MailerError>;

    fn build_fallback(&self, config: &SmtpConfig) -> Result<Box<dyn Mailer>, MailerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpTransportFactory;

impl TransportFactory for SmtpTransportFactory {
    fn build_primary(&self, config: &SmtpConfig) -> Result<Box<dyn Mailer>, MailerError> {
        Ok(Box::new(SmtpTransport::from_config(config)?))
    }

    fn build_fallback(&self, config: &SmtpConfig) -> Result<Box<dyn Mailer>, MailerError> {
        Ok(Box::new(SmtpTransport::from_config(config)?))
    }
}
