//! Field validation helpers shared by the domain types.

use tracing::error;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: String },

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: String, value: f64 },
}

/// Reject empty or whitespace-only strings.
///
/// # Errors
///
/// Returns `ValidationError::Empty` naming `field`.
pub fn check_non_empty(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        error!(field, "value must not be empty");
        return Err(ValidationError::Empty {
            field: field.to_owned(),
        });
    }
    Ok(())
}

/// Reject zero, negative and NaN values.
///
/// # Errors
///
/// Returns `ValidationError::NotPositive` naming `field`.
pub fn check_positive(value: f64, field: &str) -> Result<(), ValidationError> {
    if value.is_nan() || value <= 0.0 {
        error!(field, value, "value must be positive");
        return Err(ValidationError::NotPositive {
            field: field.to_owned(),
            value,
        });
    }
    Ok(())
}
