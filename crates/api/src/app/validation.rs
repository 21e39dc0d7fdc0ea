//! Field checks for request bodies.

use thiserror::Error;

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_EMAIL_LENGTH: usize = 255;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: &'static str,
}

impl ValidationError {
    fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

/// Non-empty and at most [`MAX_NAME_LENGTH`] characters.
pub fn validate_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new(field, "required field is empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::new(field, "field exceeds maximum length"));
    }
    Ok(())
}

/// A single `local@domain` address: no whitespace, non-empty local part, and a
/// domain with at least one inner dot.
pub fn validate_email(field: &'static str, email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::new(field, "required field is empty"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::new(field, "field exceeds maximum length"));
    }

    let invalid = || ValidationError::new(field, "invalid email format");
    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}
