//! Text input limits shared by the request handlers.

use crate::error::LedgerError;

/// Trip, expense and activity names.
pub const MAX_NAME_LEN: usize = 200;

/// Settlement notes.
pub const MAX_NOTE_LEN: usize = 500;

/// User identifiers coming from the gateway.
pub const MAX_USER_ID_LEN: usize = 128;

pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), LedgerError> {
    if value.trim().is_empty() {
        return Err(LedgerError::validation(format!("{field} must not be empty")));
    }
    validate_length(value, field, max_len)
}

pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> Result<(), LedgerError> {
    match value {
        Some(v) => validate_length(v, field, max_len),
        None => Ok(()),
    }
}

fn validate_length(value: &str, field: &str, max_len: usize) -> Result<(), LedgerError> {
    let len = value.chars().count();
    if len > max_len {
        return Err(LedgerError::validation(format!(
            "{field} is too long ({len} chars, max {max_len})"
        )));
    }
    Ok(())
}
