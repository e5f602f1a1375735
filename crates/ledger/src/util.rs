//! Internal helpers for input validation.
//!
//! These utilities are **not** part of the public API. They centralize
//! normalization so every operation trims and checks input the same way.

use crate::{EngineError, ResultEngine};

pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidValue(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

pub(crate) fn require_positive(amount_minor: i64) -> ResultEngine<()> {
    if amount_minor <= 0 {
        return Err(EngineError::InvalidState(
            "amount_minor must be > 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_required() {
        assert_eq!(
            normalize_required_name("  Groceries ", "category").unwrap(),
            "Groceries"
        );
        assert!(matches!(
            normalize_required_name("   ", "category"),
            Err(EngineError::InvalidValue(_))
        ));
    }

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(normalize_optional_text(Some("  ")), None);
        assert_eq!(normalize_optional_text(None), None);
        assert_eq!(
            normalize_optional_text(Some(" rent ")),
            Some("rent".to_string())
        );
    }
}
