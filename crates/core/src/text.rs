//! Small helpers for validating free-text command fields.

use crate::error::{DomainError, DomainResult};

/// Trimmed, non-empty value or a validation error naming the field.
pub fn required(field: &str, value: &str) -> DomainResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Like [`required`] but also enforces a maximum length in characters.
pub fn required_max(field: &str, value: &str, max: usize) -> DomainResult<String> {
    let v = required(field, value)?;
    if v.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(v)
}

/// Blank strings collapse to `None`.
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("name", "  Acme  ").unwrap(), "Acme");
        assert!(required("name", "   ").is_err());
        assert!(required_max("code", "ABCDE", 4).is_err());
        assert_eq!(optional(Some("  ")), None);
        assert_eq!(optional(Some(" x ")), Some("x".to_string()));
    }
}
