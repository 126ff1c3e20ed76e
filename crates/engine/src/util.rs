//! Internal helpers for input normalization.
//!
//! These utilities are **not** part of the public API. They centralize the
//! text rules so every write path stores names the same way.

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{EngineError, ResultEngine};

/// Trim and collapse inner whitespace; empty input is rejected.
pub(crate) fn normalize_required_text(value: &str, label: &str) -> ResultEngine<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(EngineError::Validation(format!("{label} must not be empty")));
    }
    Ok(collapsed)
}

/// Matching key for an account name.
///
/// Case, diacritics and punctuation are ignored, so "Nubank", "NUBANK" and
/// "nubank!" resolve to the same invoice.
pub(crate) fn account_key(value: &str) -> ResultEngine<String> {
    let mut out = String::new();
    let mut pending_space = false;
    for ch in value.nfkd().filter(|ch| !is_combining_mark(*ch)) {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    if out.is_empty() {
        return Err(EngineError::Validation(
            "account must not be empty".to_string(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_collapses_whitespace() {
        assert_eq!(
            normalize_required_text("  Groceries   at  market ", "description").unwrap(),
            "Groceries at market"
        );
        assert_eq!(
            normalize_required_text(" \t ", "description"),
            Err(EngineError::Validation(
                "description must not be empty".to_string()
            ))
        );
    }

    #[test]
    fn account_key_ignores_case_accents_and_punctuation() {
        assert_eq!(account_key("Crédito  Nubank").unwrap(), "credito nubank");
        assert_eq!(account_key("CREDITO-nubank!").unwrap(), "credito nubank");
        assert!(account_key("  --  ").is_err());
    }
}
