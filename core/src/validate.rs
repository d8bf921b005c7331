//! Identifier handling and whole-form validation.
//!
//! Identifiers are never bound as parameters in SQLite, so every table,
//! column, and index name that reaches generated SQL goes through
//! [`quote_ident`]. Form submissions are checked as a unit by
//! [`decode_fields`], which collects every field-level failure instead of
//! stopping at the first one.
//!
//! # Examples
//!
//! ```
//! use litebrowse_core::*;
//!
//! let columns = vec![
//!     Column::new("age", DeclaredType::Integer),
//!     Column::new("active", DeclaredType::Bool).not_null(),
//! ];
//! let input = vec![
//!     ("age".to_string(), "41".to_string()),
//!     ("active".to_string(), "perhaps".to_string()),
//! ];
//! let errors = decode_fields(&columns, &input).unwrap_err();
//! assert_eq!(errors.len(), 1);
//! assert_eq!(errors.get("active"), Some(&DecodeError::NotBoolean));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::codec::{DecodeError, decode};
use crate::types::{Column, Value};

/// Quotes an identifier for inclusion in SQL, doubling embedded quotes.
///
/// # Examples
///
/// ```
/// use litebrowse_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns `true` if `name` is usable as an identifier.
///
/// Quoting makes almost anything legal, so this only rejects names that are
/// empty, whitespace-only, or contain NUL.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('\0')
}

/// Field-level decode failures keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    errors: BTreeMap<String, DecodeError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, error: DecodeError) {
        self.errors.insert(column.into(), error);
    }

    pub fn get(&self, column: &str) -> Option<&DecodeError> {
        self.errors.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DecodeError)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(column, err)| format!("{column}: {err}"))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Decodes submitted `(column, raw)` pairs against `columns`.
///
/// Names not present in `columns` are skipped. Either every recognized field
/// decodes and the typed values come back in input order, or nothing does and
/// all failures are reported together.
///
/// # Errors
///
/// Returns [`FieldErrors`] holding one entry per rejected field.
pub fn decode_fields<'c, I>(
    columns: I,
    input: &[(String, String)],
) -> Result<Vec<(String, Value)>, FieldErrors>
where
    I: IntoIterator<Item = &'c Column>,
{
    let by_name: BTreeMap<&str, &Column> = columns.into_iter().map(|c| (c.name.as_str(), c)).collect();

    let mut values = Vec::with_capacity(input.len());
    let mut errors = FieldErrors::new();
    for (name, raw) in input {
        let Some(column) = by_name.get(name.as_str()) else {
            continue;
        };
        match decode(&column.declared_type, column.nullable, raw) {
            Ok(value) => values.push((column.name.clone(), value)),
            Err(err) => errors.insert(name.clone(), err),
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeclaredType;

    fn pair(column: &str, raw: &str) -> (String, String) {
        (column.to_string(), raw.to_string())
    }

    #[test]
    fn test_identifier_checks() {
        assert!(is_valid_identifier("users"));
        assert!(is_valid_identifier("with space"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("   "));
        assert!(!is_valid_identifier("a\0b"));
    }

    #[test]
    fn test_decode_fields_skips_unknown_columns() {
        let columns = vec![Column::new("name", DeclaredType::Text)];
        let values = decode_fields(&columns, &[pair("name", "bob"), pair("bogus", "x")]).unwrap();
        assert_eq!(values, vec![("name".to_string(), Value::Text("bob".into()))]);
    }

    #[test]
    fn test_decode_fields_reports_all_failures() {
        let columns = vec![
            Column::new("a", DeclaredType::Integer),
            Column::new("b", DeclaredType::Blob),
            Column::new("c", DeclaredType::Text).not_null(),
        ];
        let errors = decode_fields(
            &columns,
            &[pair("a", "x"), pair("b", "!!"), pair("c", "null")],
        )
        .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.get("a"), Some(&DecodeError::NotAnInteger));
        assert_eq!(errors.get("b"), Some(&DecodeError::InvalidBase64));
        assert_eq!(errors.get("c"), Some(&DecodeError::NotNullable));
        assert!(errors.to_string().starts_with("a: Value is not a number."));
    }
}
