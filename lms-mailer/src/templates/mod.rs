mod engine;
mod lms_templates;

pub use engine::{AskamaTemplateEngine, TemplateEngine, html_to_text};
pub use lms_templates::{
    ActivationTemplate, EnrollmentTemplate, GenericTemplate, PasswordResetTemplate,
    TemplateContext,
};

use crate::MailerError;
use crate::error::TemplateError;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The closed set of templates the platform sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Activation,
    PasswordReset,
    Enrollment,
    Generic,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::Activation,
        TemplateKind::PasswordReset,
        TemplateKind::Enrollment,
        TemplateKind::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Activation => "ACTIVATION",
            TemplateKind::PasswordReset => "PASSWORD_RESET",
            TemplateKind::Enrollment => "ENROLLMENT",
            TemplateKind::Generic => "GENERIC",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| TemplateError::UnknownKind(s.to_string()))
    }
}

/// Subject and HTML body produced by a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub data: HashMap<String, serde_json::Value>,
}

impl TemplateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Serialize>(mut self, key: &str, value: T) -> Result<Self, MailerError> {
        self.data
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Returns a non-empty field as text. Numbers are accepted and stringified so that
    /// `"orderNumber": 1042` and `"orderNumber": "1042"` behave the same.
    pub fn require(&self, key: &'static str) -> Result<String, TemplateError> {
        let value = match self.get(key) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        if value.is_empty() {
            Err(TemplateError::MissingField(key))
        } else {
            Ok(value)
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for TemplateData {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            data: map.into_iter().collect(),
        }
    }
}
