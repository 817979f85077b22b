//! # LMS Mailer
//!
//! Transactional email for the LMS platform: built-in templates for account activation,
//! password reset, course enrollment and free-form messages, delivered over SMTP through a
//! primary provider with bounded retries and a single fallback attempt.
//!
//! ```rust,no_run
//! use lms_mailer::prelude::*;
//!
//! # async fn run() -> Result<(), MailerError> {
//! let config = DeliveryConfig::from_env()?;
//! let engine = AskamaTemplateEngine::new(TemplateContext {
//!     app_name: config.app_name.clone(),
//!     frontend_url: config.frontend_url.clone(),
//! });
//! let orchestrator = DeliveryOrchestrator::smtp(config);
//!
//! let data = TemplateData::new().insert("activationToken", "abc123")?;
//! let rendered = engine.render(TemplateKind::Activation, &data)?;
//! let outcome = orchestrator
//!     .deliver("learner@example.com", &rendered.subject, &rendered.html)
//!     .await;
//! assert!(outcome.success);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delivery;
pub mod email;
pub mod error;
pub mod mailer;
pub mod templates;
pub mod transports;

pub use config::{DeliveryConfig, SmtpConfig, TlsType};
pub use delivery::{DeliveryOrchestrator, DeliveryOutcome, DeliveryState, Provider};
pub use email::{Email, EmailBuilder, parse_mailbox};
pub use error::{ConfigError, MailerError, TemplateError};
pub use mailer::{Mailer, SmtpTransportFactory, TransportFactory};
pub use templates::{
    AskamaTemplateEngine, RenderedEmail, TemplateContext, TemplateData, TemplateEngine,
    TemplateKind,
};
pub use transports::SmtpTransport;

pub mod prelude {
    pub use crate::{
        AskamaTemplateEngine, ConfigError, DeliveryConfig, DeliveryOrchestrator, DeliveryOutcome,
        Email, EmailBuilder, Mailer, MailerError, RenderedEmail, SmtpConfig, SmtpTransport,
        SmtpTransportFactory, TemplateContext, TemplateData, TemplateEngine, TemplateError,
        TemplateKind, TransportFactory,
    };
}
