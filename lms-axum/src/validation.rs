use lms_mailer::parse_mailbox;
use regex::Regex;
use std::sync::LazyLock;

use crate::error::ApiError;

/// Practical subset of RFC 5322, compiled once.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

/// Returns the trimmed recipient, or a 400 with `missing` when it is absent.
pub fn require_email(value: Option<&str>, missing: &str) -> Result<String, ApiError> {
    let email = value.map(str::trim).unwrap_or_default();

    if email.is_empty() {
        return Err(ApiError::BadRequest(missing.to_string()));
    }

    if email.len() > 254 || !EMAIL_REGEX.is_match(email) || parse_mailbox(email).is_err() {
        return Err(ApiError::BadRequest(format!(
            "Invalid email address: {email}"
        )));
    }

    Ok(email.to_string())
}

/// Returns the value if present and not blank.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
