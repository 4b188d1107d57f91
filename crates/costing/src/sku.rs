use ironbooks_core::{DomainError, DomainResult, text};

/// SKUs are up to 64 non-whitespace characters, compared case-sensitively.
pub fn normalize_sku(sku: &str) -> DomainResult<String> {
    let sku = text::required_max("sku", sku, 64)?;
    if sku.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("sku cannot contain whitespace"));
    }
    Ok(sku)
}
