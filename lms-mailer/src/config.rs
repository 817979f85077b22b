use crate::error::ConfigError;
use crate::transports::TlsConfig;
use lettre::Address;
use lettre::message::Mailbox;
use std::time::Duration;

const PRIMARY_PREFIX: &str = "EMAIL_";
const FALLBACK_PREFIX: &str = "FALLBACK_EMAIL_";

/// Delivery settings shared by every request.
///
/// Built once at start-up and handed to the [`DeliveryOrchestrator`](crate::DeliveryOrchestrator)
/// by value; nothing in the crate reads the environment after that.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub primary: SmtpConfig,
    pub fallback: SmtpConfig,
    /// Number of primary attempts before switching to the fallback. Always at least 1.
    pub max_retries: u32,
    /// Fixed pause between primary attempts.
    pub retry_delay_ms: u64,
    pub from_name: String,
    pub from_address: String,
    /// Base URL used for activation and password reset links.
    pub frontend_url: String,
    pub app_name: String,
}

/// Connection settings for one SMTP provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: TlsType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsType {
    None,
    StartTls,
    Tls,
}

impl From<TlsType> for TlsConfig {
    fn from(tls_type: TlsType) -> Self {
        match tls_type {
            TlsType::None => TlsConfig::None,
            TlsType::StartTls => TlsConfig::StartTls,
            TlsType::Tls => TlsConfig::Tls,
        }
    }
}

impl DeliveryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Unset keys fall back to defaults;
    /// set but malformed keys are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let primary = SmtpConfig::from_lookup(&lookup, PRIMARY_PREFIX, &defaults.primary.host)?;
        let fallback = SmtpConfig::from_lookup(&lookup, FALLBACK_PREFIX, &defaults.fallback.host)?;

        let max_retries = match lookup("EMAIL_MAX_RETRIES") {
            Some(raw) => parse_number::<u32>("EMAIL_MAX_RETRIES", &raw)?,
            None => defaults.max_retries,
        };
        if max_retries == 0 {
            return Err(ConfigError::Invalid {
                key: "EMAIL_MAX_RETRIES".to_string(),
                value: "0".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }

        let retry_delay_ms = match lookup("EMAIL_RETRY_DELAY") {
            Some(raw) => parse_number::<u64>("EMAIL_RETRY_DELAY", &raw)?,
            None => defaults.retry_delay_ms,
        };

        let frontend_url = lookup("FRONTEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.frontend_url);

        let config = Self {
            primary,
            fallback,
            max_retries,
            retry_delay_ms,
            from_name: lookup("EMAIL_FROM_NAME").unwrap_or(defaults.from_name),
            from_address: lookup("EMAIL_FROM").unwrap_or(defaults.from_address),
            frontend_url,
            app_name: lookup("APP_NAME").unwrap_or(defaults.app_name),
        };
        config.sender()?;

        Ok(config)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// The sender mailbox. Fails when `EMAIL_FROM` is not an address or `EMAIL_FROM_NAME`
    /// cannot appear in a header.
    pub fn sender(&self) -> Result<Mailbox, ConfigError> {
        let address = self
            .from_address
            .trim()
            .parse::<Address>()
            .map_err(|e| ConfigError::Invalid {
                key: "EMAIL_FROM".to_string(),
                value: self.from_address.clone(),
                reason: e.to_string(),
            })?;

        let name = self.from_name.trim();
        if name.chars().any(char::is_control) {
            return Err(ConfigError::Invalid {
                key: "EMAIL_FROM_NAME".to_string(),
                value: self.from_name.clone(),
                reason: "must not contain control characters".to_string(),
            });
        }

        let name = (!name.is_empty()).then(|| name.to_string());
        Ok(Mailbox::new(name, address))
    }

    /// Header form of [`sender`](Self::sender); the display name is quoted when it needs to be.
    pub fn get_from_address(&self) -> String {
        match self.sender() {
            Ok(mailbox) => mailbox.to_string(),
            // Rejected again by `Email::validate` before anything is sent
            Err(_) => self.from_address.clone(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            primary: SmtpConfig::new("smtp.mailgun.org"),
            fallback: SmtpConfig::new("smtp.sendgrid.net"),
            max_retries: 3,
            retry_delay_ms: 1000,
            from_name: "LMS Support".to_string(),
            from_address: "support@your-domain.com".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            app_name: "LMS".to_string(),
        }
    }
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            username: None,
            password: None,
            tls: TlsType::StartTls,
        }
    }

    fn from_lookup<F>(lookup: &F, prefix: &str, default_host: &str) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = |name: &str| format!("{prefix}{name}");

        let secure = match lookup(&key("SECURE")) {
            Some(raw) => parse_bool(&key("SECURE"), &raw)?,
            None => false,
        };

        let tls = match lookup(&key("TLS")) {
            Some(raw) => match raw.to_lowercase().as_str() {
                "none" => TlsType::None,
                "starttls" => TlsType::StartTls,
                "tls" => TlsType::Tls,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: key("TLS"),
                        value: raw,
                        reason: "expected one of none, starttls, tls".to_string(),
                    });
                }
            },
            None if secure => TlsType::Tls,
            None => TlsType::StartTls,
        };

        let port = match lookup(&key("PORT")) {
            Some(raw) => parse_number::<u16>(&key("PORT"), &raw)?,
            None if tls == TlsType::Tls => 465,
            None => 587,
        };

        Ok(Self {
            host: lookup(&key("HOST")).unwrap_or_else(|| default_host.to_string()),
            port,
            username: lookup(&key("USER")),
            password: lookup(&key("PASSWORD")),
            tls,
        })
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DeliveryConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.primary.host, "smtp.mailgun.org");
        assert_eq!(config.fallback.host, "smtp.sendgrid.net");
        assert_eq!(config.primary.port, 587);
        assert_eq!(config.primary.tls, TlsType::StartTls);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay(), Duration::from_millis(1000));
        assert_eq!(config.from_name, "LMS Support");
    }

    #[test]
    fn test_primary_and_fallback_are_independent() {
        let config = DeliveryConfig::from_lookup(lookup_from(&[
            ("EMAIL_HOST", "smtp.primary.test"),
            ("EMAIL_PORT", "2525"),
            ("EMAIL_USER", "primary-user"),
            ("EMAIL_PASSWORD", "primary-pass"),
            ("FALLBACK_EMAIL_HOST", "smtp.fallback.test"),
            ("FALLBACK_EMAIL_SECURE", "true"),
            ("FALLBACK_EMAIL_USER", "apikey"),
        ]))
        .unwrap();

        assert_eq!(config.primary.host, "smtp.primary.test");
        assert_eq!(config.primary.port, 2525);
        assert_eq!(config.primary.username.as_deref(), Some("primary-user"));
        assert_eq!(config.primary.password.as_deref(), Some("primary-pass"));

        assert_eq!(config.fallback.host, "smtp.fallback.test");
        assert_eq!(config.fallback.tls, TlsType::Tls);
        assert_eq!(config.fallback.port, 465);
        assert_eq!(config.fallback.username.as_deref(), Some("apikey"));
        assert_eq!(config.fallback.password, None);
    }

    #[test]
    fn test_tls_override_wins_over_secure_flag() {
        let config = DeliveryConfig::from_lookup(lookup_from(&[
            ("EMAIL_SECURE", "true"),
            ("EMAIL_TLS", "none"),
        ]))
        .unwrap();
        assert_eq!(config.primary.tls, TlsType::None);
    }

    #[test]
    fn test_zero_retries_rejected() {
        let err = DeliveryConfig::from_lookup(lookup_from(&[("EMAIL_MAX_RETRIES", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "EMAIL_MAX_RETRIES"));
    }

    #[test]
    fn test_malformed_values_rejected() {
        assert!(DeliveryConfig::from_lookup(lookup_from(&[("EMAIL_PORT", "smtp")])).is_err());
        assert!(DeliveryConfig::from_lookup(lookup_from(&[("EMAIL_RETRY_DELAY", "-5")])).is_err());
        assert!(
            DeliveryConfig::from_lookup(lookup_from(&[("FALLBACK_EMAIL_SECURE", "maybe")]))
                .is_err()
        );
        assert!(DeliveryConfig::from_lookup(lookup_from(&[("EMAIL_TLS", "ssl")])).is_err());
    }

    #[test]
    fn test_frontend_url_trailing_slash_trimmed() {
        let config =
            DeliveryConfig::from_lookup(lookup_from(&[("FRONTEND_URL", "https://lms.test/")]))
                .unwrap();
        assert_eq!(config.frontend_url, "https://lms.test");
    }

    #[test]
    fn test_get_from_address() {
        let mut config = DeliveryConfig::default();
        assert_eq!(config.get_from_address(), "LMS Support <support@your-domain.com>");

        config.from_name = String::new();
        assert_eq!(config.get_from_address(), "support@your-domain.com");
    }

    #[test]
    fn test_from_name_with_specials_is_quoted() {
        let config =
            DeliveryConfig::from_lookup(lookup_from(&[("EMAIL_FROM_NAME", "Acme, Inc.")]))
                .unwrap();

        let from = config.get_from_address();
        assert_eq!(from, "\"Acme, Inc.\" <support@your-domain.com>");

        let mailbox = crate::email::parse_mailbox(&from).unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Acme, Inc."));
    }

    #[test]
    fn test_malformed_sender_rejected() {
        let err = DeliveryConfig::from_lookup(lookup_from(&[("EMAIL_FROM", "support@@lms")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "EMAIL_FROM"));

        let err =
            DeliveryConfig::from_lookup(lookup_from(&[("EMAIL_FROM_NAME", "LMS\r\nBcc: x")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "EMAIL_FROM_NAME"));
    }
}
