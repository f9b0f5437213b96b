//! Field validation helpers for request drafts.

use chrono::NaiveDate;
use common::AggregateId;

use crate::{DomainError, Result};

pub fn required<T>(field: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| DomainError::InvalidInput(format!("{field} is required")))
}

/// Required, not blank, and `min..=max` characters long.
pub fn text(field: &str, value: Option<String>, min: usize, max: usize) -> Result<String> {
    let value = required(field, value)?;
    if value.trim().is_empty() {
        return Err(DomainError::InvalidInput(format!("{field} must not be blank")));
    }
    let len = value.chars().count();
    if len < min || len > max {
        return Err(DomainError::InvalidInput(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(value)
}

pub fn max_len(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(DomainError::InvalidInput(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn email(field: &str, value: Option<String>) -> Result<String> {
    let value = required(field, value)?;
    let well_formed = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(DomainError::InvalidInput(format!(
            "{field} must be a well-formed email address"
        )));
    }
    Ok(value)
}

pub fn id(field: &str, value: Option<String>) -> Result<AggregateId> {
    let value = required(field, value)?;
    value
        .parse()
        .map_err(|_| DomainError::InvalidInput(format!("{field} must be a UUID, got {value:?}")))
}

/// Parses a `YYYY-MM-DD` date.
pub fn date(field: &str, value: Option<String>) -> Result<NaiveDate> {
    let value = required(field, value)?;
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        DomainError::InvalidInput(format!("{field} must be a YYYY-MM-DD date, got {value:?}"))
    })
}

pub fn non_negative(field: &str, value: i64) -> Result<i64> {
    if value < 0 {
        return Err(DomainError::InvalidInput(format!(
            "{field} must not be negative"
        )));
    }
    Ok(value)
}
