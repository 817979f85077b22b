//! Primary/fallback delivery with bounded retries.
//!
//! A single delivery moves through the following states:
//!
//! ```text
//! Pending → PrimaryAttempt(1) → … → PrimaryAttempt(max_retries) → FallbackAttempt → Failed
//!                 │                          │                          │
//!                 └──────────────────────────┴──────────── Sent ◄───────┘
//! ```
//!
//! Every primary attempt builds a fresh transport. Between primary attempts the orchestrator
//! waits `retry_delay_ms`; the fallback provider is tried exactly once. A delivery therefore
//! makes at most `max_retries + 1` send attempts.
//!
//! Dropping the future returned by [`DeliveryOrchestrator::deliver`] abandons the sequence at
//! the next await point (a send or the retry delay).

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DeliveryConfig;
use crate::mailer::{Mailer, SmtpTransportFactory, TransportFactory};
use crate::{Email, MailerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Primary,
    Fallback,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Primary => f.write_str("primary"),
            Provider::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    /// 1-based attempt number against the primary provider.
    PrimaryAttempt(u32),
    FallbackAttempt,
    Sent {
        message_id: String,
        used_fallback: bool,
    },
    Failed,
}

/// Result of one delivery. Serialized field names follow the HTTP API (`messageId`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub used_fallback: bool,
    /// Last primary error. Reported even when the fallback failed too.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_error: Option<String>,
    pub primary_attempts: u32,
    pub fallback_attempted: bool,
}

impl DeliveryOutcome {
    fn rejected(error: String) -> Self {
        Self {
            success: false,
            message_id: None,
            used_fallback: false,
            error: Some(error),
            fallback_error: None,
            primary_attempts: 0,
            fallback_attempted: false,
        }
    }

    /// The message was refused before any provider was tried.
    pub fn is_rejected(&self) -> bool {
        !self.success && self.primary_attempts == 0 && !self.fallback_attempted
    }
}

pub struct DeliveryOrchestrator {
    config: DeliveryConfig,
    factory: Arc<dyn TransportFactory>,
}

impl DeliveryOrchestrator {
    pub fn new(config: DeliveryConfig, factory: Arc<dyn TransportFactory>) -> Self {
        Self { config, factory }
    }

    /// Orchestrator backed by real SMTP transports.
    pub fn smtp(config: DeliveryConfig) -> Self {
        Self::new(config, Arc::new(SmtpTransportFactory))
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub async fn deliver(&self, recipient: &str, subject: &str, html: &str) -> DeliveryOutcome {
        let email = Email::builder()
            .from(self.config.get_from_address())
            .to(recipient)
            .subject(subject)
            .html_body(html)
            .build();

        match email {
            Ok(email) => self.deliver_email(&email).await,
            Err(e) => DeliveryOutcome::rejected(e.to_string()),
        }
    }

    /// Runs the retry/fallback state machine for an already built message.
    pub async fn deliver_email(&self, email: &Email) -> DeliveryOutcome {
        if let Err(e) = email.validate() {
            warn!(error = %e, "Email rejected before delivery");
            return DeliveryOutcome::rejected(e.to_string());
        }

        let recipients = email.to.join(", ");
        let max_retries = self.config.max_retries.max(1);

        let mut state = DeliveryState::Pending;
        let mut primary_attempts = 0;
        let mut primary_error: Option<String> = None;
        let mut fallback_error: Option<String> = None;

        loop {
            state = match state {
                DeliveryState::Pending => DeliveryState::PrimaryAttempt(1),

                DeliveryState::PrimaryAttempt(attempt) => {
                    primary_attempts = attempt;
                    info!(to = %recipients, attempt, "Sending email using primary service");

                    match self.attempt(Provider::Primary, email).await {
                        Ok(message_id) => DeliveryState::Sent {
                            message_id,
                            used_fallback: false,
                        },
                        Err(e) => {
                            warn!(to = %recipients, attempt, error = %e, "Primary email service failed");
                            primary_error = Some(e.to_string());

                            if attempt < max_retries {
                                tokio::time::sleep(self.config.retry_delay()).await;
                                DeliveryState::PrimaryAttempt(attempt + 1)
                            } else {
                                DeliveryState::FallbackAttempt
                            }
                        }
                    }
                }

                DeliveryState::FallbackAttempt => {
                    info!(to = %recipients, "Primary email service exhausted, trying fallback service");

                    match self.attempt(Provider::Fallback, email).await {
                        Ok(message_id) => DeliveryState::Sent {
                            message_id,
                            used_fallback: true,
                        },
                        Err(e) => {
                            error!(to = %recipients, error = %e, "Fallback email service also failed");
                            fallback_error = Some(e.to_string());
                            DeliveryState::Failed
                        }
                    }
                }

                DeliveryState::Sent {
                    message_id,
                    used_fallback,
                } => {
                    info!(to = %recipients, message_id = %message_id, used_fallback, "Email sent successfully");
                    return DeliveryOutcome {
                        success: true,
                        message_id: Some(message_id),
                        used_fallback,
                        error: None,
                        fallback_error: None,
                        primary_attempts,
                        fallback_attempted: used_fallback,
                    };
                }

                DeliveryState::Failed => {
                    return DeliveryOutcome {
                        success: false,
                        message_id: None,
                        used_fallback: false,
                        error: Some(
                            primary_error.unwrap_or_else(|| "Failed to send email".to_string()),
                        ),
                        fallback_error,
                        primary_attempts,
                        fallback_attempted: true,
                    };
                }
            };
        }
    }

    /// Sends the fixed configuration-test message to `to`.
    pub async fn send_test_message(&self, to: &str) -> DeliveryOutcome {
        let html = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px; border: 1px solid #e0e0e0; border-radius: 5px;">
    <h2 style="color: #333;">Email Configuration Test</h2>
    <p>This is a test email to verify that your email service is configured correctly.</p>
    <p>Test completed at: {}</p>
</div>"#,
            chrono::Utc::now().to_rfc3339()
        );

        self.deliver(to, &format!("{} Email Configuration Test", self.config.app_name), &html)
            .await
    }

    /// Checks connectivity to both providers without sending mail.
    pub async fn verify(&self) -> Vec<(Provider, Result<bool, MailerError>)> {
        let mut results = Vec::with_capacity(2);
        for provider in [Provider::Primary, Provider::Fallback] {
            results.push((provider, self.verify_provider(provider).await));
        }
        results
    }

    /// Checks connectivity to one provider without sending mail.
    pub async fn verify_provider(&self, provider: Provider) -> Result<bool, MailerError> {
        let transport = self.build(provider)?;
        let connected = transport.test_connection().await?;
        debug!(%provider, connected, "SMTP connection check");
        Ok(connected)
    }

    fn build(&self, provider: Provider) -> Result<Box<dyn Mailer>, MailerError> {
        match provider {
            Provider::Primary => self.factory.build_primary(&self.config.primary),
            Provider::Fallback => self.factory.build_fallback(&self.config.fallback),
        }
    }

    async fn attempt(&self, provider: Provider, email: &Email) -> Result<String, MailerError> {
        let transport = self.build(provider)?;
        transport.send_email(email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpConfig;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counters {
        primary_builds: AtomicU32,
        fallback_builds: AtomicU32,
        primary_sends: AtomicU32,
        fallback_sends: AtomicU32,
    }

    /// Primary fails `primary_failures` times then succeeds; fallback succeeds iff `fallback_ok`.
    struct ScriptedFactory {
        primary_failures: u32,
        fallback_ok: bool,
        counters: Arc<Counters>,
        sent: Arc<Mutex<Vec<Email>>>,
    }

    impl ScriptedFactory {
        fn new(primary_failures: u32, fallback_ok: bool) -> Self {
            Self {
                primary_failures,
                fallback_ok,
                counters: Arc::new(Counters::default()),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    struct ScriptedMailer {
        provider: Provider,
        succeed: bool,
        counters: Arc<Counters>,
        sent: Arc<Mutex<Vec<Email>>>,
    }

    #[async_trait]
    impl Mailer for ScriptedMailer {
        async fn send_email(&self, email: &Email) -> Result<String, MailerError> {
            let sends = match self.provider {
                Provider::Primary => &self.counters.primary_sends,
                Provider::Fallback => &self.counters.fallback_sends,
            };
            let n = sends.fetch_add(1, Ordering::SeqCst) + 1;

            if !self.succeed {
                let message = match self.provider {
                    Provider::Primary => format!("connect ECONNREFUSED (primary attempt {n})"),
                    Provider::Fallback => "535 Authentication failed".to_string(),
                };
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, message).into());
            }

            self.sent.lock().unwrap().push(email.clone());
            Ok(match self.provider {
                Provider::Primary => format!("pr-{n}"),
                Provider::Fallback => format!("fb-{n}"),
            })
        }

        async fn test_connection(&self) -> Result<bool, MailerError> {
            Ok(self.succeed)
        }
    }

    impl TransportFactory for ScriptedFactory {
        fn build_primary(&self, _config: &SmtpConfig) -> Result<Box<dyn Mailer>, MailerError> {
            let builds = self.counters.primary_builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedMailer {
                provider: Provider::Primary,
                succeed: builds >= self.primary_failures,
                counters: self.counters.clone(),
                sent: self.sent.clone(),
            }))
        }

        fn build_fallback(&self, _config: &SmtpConfig) -> Result<Box<dyn Mailer>, MailerError> {
            self.counters.fallback_builds.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedMailer {
                provider: Provider::Fallback,
                succeed: self.fallback_ok,
                counters: self.counters.clone(),
                sent: self.sent.clone(),
            }))
        }
    }

    fn config(max_retries: u32, retry_delay_ms: u64) -> DeliveryConfig {
        DeliveryConfig {
            max_retries,
            retry_delay_ms,
            ..DeliveryConfig::default()
        }
    }

    fn orchestrator(factory: ScriptedFactory, max_retries: u32) -> DeliveryOrchestrator {
        DeliveryOrchestrator::new(config(max_retries, 0), Arc::new(factory))
    }

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let factory = ScriptedFactory::new(0, true);
        let counters = factory.counters.clone();
        let sent = factory.sent.clone();

        let outcome = orchestrator(factory, 3)
            .deliver("learner@example.com", "Welcome", "<p>Hi</p>")
            .await;

        assert!(outcome.success);
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.message_id.as_deref(), Some("pr-1"));
        assert_eq!(outcome.primary_attempts, 1);
        assert_eq!(counters.fallback_builds.load(Ordering::SeqCst), 0);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["learner@example.com"]);
        assert_eq!(sent[0].from, "LMS Support <support@your-domain.com>");
        assert_eq!(sent[0].text_body.as_deref(), Some("Hi"));
    }

    #[tokio::test]
    async fn test_primary_recovers_before_exhaustion() {
        for k in 1..3 {
            let factory = ScriptedFactory::new(k, true);
            let counters = factory.counters.clone();

            let outcome = orchestrator(factory, 3)
                .deliver("learner@example.com", "Welcome", "<p>Hi</p>")
                .await;

            assert!(outcome.success);
            assert!(!outcome.used_fallback);
            assert_eq!(outcome.primary_attempts, k + 1);
            assert_eq!(counters.primary_sends.load(Ordering::SeqCst), k + 1);
            assert_eq!(counters.fallback_builds.load(Ordering::SeqCst), 0);
            assert_eq!(counters.fallback_sends.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn test_fallback_after_primary_exhausted() {
        let factory = ScriptedFactory::new(u32::MAX, true);
        let counters = factory.counters.clone();

        let outcome = orchestrator(factory, 3)
            .deliver("learner@example.com", "Welcome", "<p>Hi</p>")
            .await;

        assert_eq!(
            outcome,
            DeliveryOutcome {
                success: true,
                message_id: Some("fb-1".to_string()),
                used_fallback: true,
                error: None,
                fallback_error: None,
                primary_attempts: 3,
                fallback_attempted: true,
            }
        );

        let builds = counters.primary_builds.load(Ordering::SeqCst)
            + counters.fallback_builds.load(Ordering::SeqCst);
        assert_eq!(counters.primary_builds.load(Ordering::SeqCst), 3);
        assert_eq!(counters.fallback_builds.load(Ordering::SeqCst), 1);
        assert_eq!(builds, 4);
    }

    #[tokio::test]
    async fn test_both_providers_fail() {
        let factory = ScriptedFactory::new(u32::MAX, false);
        let counters = factory.counters.clone();
        let sent = factory.sent.clone();

        let outcome = orchestrator(factory, 3)
            .deliver("learner@example.com", "Welcome", "<p>Hi</p>")
            .await;

        assert!(!outcome.success);
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.message_id, None);
        assert!(outcome.fallback_attempted);

        // The reported error is the last primary failure; the fallback's is kept separately.
        let error = outcome.error.unwrap();
        assert!(error.contains("ECONNREFUSED (primary attempt 3)"), "{error}");
        assert!(outcome.fallback_error.unwrap().contains("535"));

        let attempts = counters.primary_sends.load(Ordering::SeqCst)
            + counters.fallback_sends.load(Ordering::SeqCst);
        assert_eq!(attempts, 4);
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_single_retry_goes_straight_to_fallback() {
        let factory = ScriptedFactory::new(u32::MAX, true);
        let counters = factory.counters.clone();

        let outcome = orchestrator(factory, 1)
            .deliver("learner@example.com", "Welcome", "<p>Hi</p>")
            .await;

        assert!(outcome.success && outcome.used_fallback);
        assert_eq!(counters.primary_sends.load(Ordering::SeqCst), 1);
        assert_eq!(counters.fallback_sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delay_between_primary_attempts_only() {
        let factory = ScriptedFactory::new(u32::MAX, true);
        let orchestrator = DeliveryOrchestrator::new(config(3, 1000), Arc::new(factory));

        let start = tokio::time::Instant::now();
        let outcome = orchestrator
            .deliver("learner@example.com", "Welcome", "<p>Hi</p>")
            .await;
        let elapsed = start.elapsed();

        assert!(outcome.used_fallback);
        // Two pauses: after attempts 1 and 2, none before the fallback.
        assert!(elapsed >= Duration::from_millis(2000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3000), "{elapsed:?}");
    }

    #[tokio::test]
    async fn test_construction_failure_counts_as_attempt() {
        struct BrokenPrimary {
            fallback: ScriptedFactory,
        }

        impl TransportFactory for BrokenPrimary {
            fn build_primary(&self, config: &SmtpConfig) -> Result<Box<dyn Mailer>, MailerError> {
                Err(MailerError::Builder(format!("cannot resolve {}", config.host)))
            }

            fn build_fallback(&self, config: &SmtpConfig) -> Result<Box<dyn Mailer>, MailerError> {
                self.fallback.build_fallback(config)
            }
        }

        let orchestrator = DeliveryOrchestrator::new(
            config(2, 0),
            Arc::new(BrokenPrimary {
                fallback: ScriptedFactory::new(0, true),
            }),
        );

        let outcome = orchestrator
            .deliver("learner@example.com", "Welcome", "<p>Hi</p>")
            .await;

        assert!(outcome.success);
        assert!(outcome.used_fallback);
        assert_eq!(outcome.primary_attempts, 2);
    }

    #[tokio::test]
    async fn test_invalid_message_is_not_attempted() {
        let factory = ScriptedFactory::new(0, true);
        let counters = factory.counters.clone();

        let outcome = orchestrator(factory, 3).deliver("", "Welcome", "<p>Hi</p>").await;

        assert!(!outcome.success);
        assert_eq!(outcome.primary_attempts, 0);
        assert!(!outcome.fallback_attempted);
        assert_eq!(counters.primary_builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_recipient_is_not_retried() {
        let factory = ScriptedFactory::new(0, true);
        let counters = factory.counters.clone();

        let outcome = orchestrator(factory, 3)
            .deliver("a..b@example.com", "Welcome", "<p>Hi</p>")
            .await;

        assert!(outcome.is_rejected());
        assert_eq!(outcome.primary_attempts, 0);
        assert!(!outcome.fallback_attempted);
        assert_eq!(outcome.fallback_error, None);
        assert_eq!(counters.primary_builds.load(Ordering::SeqCst), 0);
        assert_eq!(counters.fallback_builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prebuilt_email_is_validated() {
        let factory = ScriptedFactory::new(0, true);
        let counters = factory.counters.clone();

        let email = Email {
            to: vec!["learner@example.com".to_string()],
            from: "Acme, Inc. <support@acme.test>".to_string(),
            subject: "Welcome".to_string(),
            html_body: Some("<p>Hi</p>".to_string()),
            text_body: None,
        };
        let outcome = orchestrator(factory, 3).deliver_email(&email).await;

        assert!(outcome.is_rejected());
        assert_eq!(counters.primary_builds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_quoted_sender_name_is_delivered() {
        let factory = ScriptedFactory::new(0, true);
        let sent = factory.sent.clone();
        let config = DeliveryConfig {
            from_name: "Acme, Inc.".to_string(),
            retry_delay_ms: 0,
            ..DeliveryConfig::default()
        };

        let outcome = DeliveryOrchestrator::new(config, Arc::new(factory))
            .deliver("learner@example.com", "Welcome", "<p>Hi</p>")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.primary_attempts, 1);
        assert_eq!(
            sent.lock().unwrap()[0].from,
            "\"Acme, Inc.\" <support@your-domain.com>"
        );
    }

    #[tokio::test]
    async fn test_send_test_message() {
        let factory = ScriptedFactory::new(0, true);
        let sent = factory.sent.clone();

        let outcome = orchestrator(factory, 3)
            .send_test_message("admin@example.com")
            .await;

        assert!(outcome.success);
        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].subject, "LMS Email Configuration Test");
        assert!(
            sent[0]
                .html_body
                .as_deref()
                .unwrap()
                .contains("Test completed at:")
        );
    }

    #[tokio::test]
    async fn test_verify_reports_each_provider() {
        let orchestrator = orchestrator(ScriptedFactory::new(0, false), 3);
        let results = orchestrator.verify().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, Provider::Primary);
        assert!(matches!(results[0].1, Ok(true)));
        assert_eq!(results[1].0, Provider::Fallback);
        assert!(matches!(results[1].1, Ok(false)));
    }

    #[tokio::test]
    async fn test_verify_single_provider() {
        let factory = ScriptedFactory::new(0, false);
        let counters = factory.counters.clone();
        let orchestrator = orchestrator(factory, 3);

        assert!(matches!(
            orchestrator.verify_provider(Provider::Primary).await,
            Ok(true)
        ));
        assert_eq!(counters.primary_builds.load(Ordering::SeqCst), 1);
        assert_eq!(counters.fallback_builds.load(Ordering::SeqCst), 0);
        assert_eq!(counters.primary_sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = DeliveryOutcome {
            success: true,
            message_id: Some("fb-1".to_string()),
            used_fallback: true,
            error: None,
            fallback_error: None,
            primary_attempts: 3,
            fallback_attempted: true,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["messageId"], "fb-1");
        assert_eq!(json["usedFallback"], true);
        assert!(json.get("error").is_none());
    }
}
