//! Input DTOs with garde validation for the guest registration form.
//!
//! Validation failures are recoverable: the embedder surfaces them inline per
//! field and the visitor edits and resubmits.

use garde::Validate;
use serde::Deserialize;

use crate::error::Error;

const MAX_NAME_LENGTH: usize = 100;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

fn validate_name_chars(value: &str, _ctx: &()) -> garde::Result {
    if value.chars().any(|c| c.is_control()) {
        return Err(garde::Error::new("name contains invalid characters"));
    }
    Ok(())
}

/// Optional + followed by 7-15 digits; spaces, dashes, and parentheses are
/// ignored.
fn validate_phone(value: &str, _ctx: &()) -> garde::Result {
    let normalized: String = value
        .chars()
        .filter(|c| !matches!(*c, ' ' | '-' | '(' | ')'))
        .collect();
    if normalized.is_empty() {
        return Err(garde::Error::new("phone number cannot be empty"));
    }
    let digits = normalized.strip_prefix('+').unwrap_or(&normalized);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(garde::Error::new(
            "phone number can only contain digits (and optional leading +)",
        ));
    }
    if digits.len() < MIN_PHONE_DIGITS {
        return Err(garde::Error::new("phone number too short"));
    }
    if digits.len() > MAX_PHONE_DIGITS {
        return Err(garde::Error::new("phone number too long"));
    }
    Ok(())
}

/// Contact details submitted from the guest form.
#[derive(Debug, Clone, Deserialize, Validate)]
#[garde(context(()))]
pub struct ContactInput {
    #[garde(length(min = 1, max = MAX_NAME_LENGTH), custom(validate_name_chars))]
    pub name: String,
    #[garde(email)]
    pub email: String,
    #[garde(custom(validate_phone))]
    pub phone: String,
}

/// Helper trait to fold garde reports into the crate error type.
pub trait ValidateExt {
    fn validate_input(&self) -> crate::error::Result<()>;
}

impl<T: Validate<Context = ()>> ValidateExt for T {
    fn validate_input(&self) -> crate::error::Result<()> {
        self.validate().map_err(|e| Error::Validation(e.to_string()))
    }
}
