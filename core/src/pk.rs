//! Reversible primary-key tokens for navigation links.
//!
//! A row is addressed by a single string token. Single-column keys use the
//! value's text; composite keys join their field values with [`DELIMITER`]
//! in declaration order. When a key cannot be encoded without ambiguity the
//! encoder yields [`PkToken::Unencodable`] instead of a lossy token, and the
//! decoder refuses that sentinel outright.
//!
//! # Examples
//!
//! ```
//! use litebrowse_core::pk::{self, PkToken};
//! use litebrowse_core::{PrimaryKey, Row, Value};
//!
//! let key = PrimaryKey::Composite(vec!["a".into(), "b".into()]);
//! let row: Row = [
//!     ("a".to_string(), Value::Text("x".into())),
//!     ("b".to_string(), Value::Text("y".into())),
//! ]
//! .into_iter()
//! .collect();
//!
//! let token = pk::encode(&row, &key);
//! assert_eq!(token, PkToken::Key("x:::y".into()));
//!
//! let predicate = pk::decode(&key, token.as_str()).unwrap();
//! assert_eq!(predicate.to_sql().0, r#""a" = ?1 AND "b" = ?2"#);
//! ```

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::{PrimaryKey, Row};
use crate::validate::quote_ident;

/// Separator between composite key fields.
pub const DELIMITER: &str = ":::";

/// Token emitted when a key cannot be encoded safely.
pub const UNENCODABLE: &str = "__uneditable__";

/// Errors raised while turning a token back into a key predicate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The token is the unencodable sentinel.
    #[error("could not encode primary key for this row")]
    Unencodable,
    /// A composite token split into the wrong number of fields.
    #[error("primary key token has {found} field(s), expected {expected}")]
    FieldCount { expected: usize, found: usize },
}

/// Result of encoding a row's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum PkToken {
    Key(String),
    Unencodable,
}

impl PkToken {
    /// Token text, with the unencodable case rendered as [`UNENCODABLE`].
    pub fn as_str(&self) -> &str {
        match self {
            Self::Key(key) => key,
            Self::Unencodable => UNENCODABLE,
        }
    }

    pub fn is_encodable(&self) -> bool {
        matches!(self, Self::Key(_))
    }
}

impl fmt::Display for PkToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PkToken> for String {
    fn from(token: PkToken) -> Self {
        token.as_str().to_string()
    }
}

/// Encodes the primary key of `row`.
///
/// Missing, null, or binary key fields and composite fields containing the
/// delimiter all yield [`PkToken::Unencodable`].
pub fn encode(row: &Row, key: &PrimaryKey) -> PkToken {
    match key {
        PrimaryKey::Single(column) => match row.get(column).and_then(|v| v.key_text()) {
            Some(text) if text != UNENCODABLE => PkToken::Key(text),
            _ => PkToken::Unencodable,
        },
        PrimaryKey::Composite(columns) => {
            let mut parts = Vec::with_capacity(columns.len());
            for column in columns {
                match row.get(column).and_then(|v| v.key_text()) {
                    Some(text) if !text.contains(DELIMITER) => parts.push(text),
                    _ => return PkToken::Unencodable,
                }
            }
            PkToken::Key(parts.join(DELIMITER))
        }
    }
}

/// Decodes a token into an equality predicate over the key columns.
///
/// # Errors
///
/// Returns [`KeyError::Unencodable`] for the sentinel token and
/// [`KeyError::FieldCount`] when a composite token does not split into one
/// part per key column.
pub fn decode(key: &PrimaryKey, token: &str) -> Result<KeyPredicate, KeyError> {
    if token == UNENCODABLE {
        return Err(KeyError::Unencodable);
    }
    match key {
        PrimaryKey::Single(column) => Ok(KeyPredicate {
            terms: vec![(column.clone(), token.to_string())],
        }),
        PrimaryKey::Composite(columns) => {
            let parts: Vec<&str> = token.split(DELIMITER).collect();
            if parts.len() != columns.len() {
                return Err(KeyError::FieldCount {
                    expected: columns.len(),
                    found: parts.len(),
                });
            }
            let terms = columns
                .iter()
                .zip(parts)
                .map(|(column, part)| (column.clone(), part.to_string()))
                .collect();
            Ok(KeyPredicate { terms })
        }
    }
}

/// Human-readable form of a token: the token itself for single keys, a
/// parenthesized tuple for composite keys.
pub fn display_key(key: &PrimaryKey, token: &str) -> String {
    match key {
        PrimaryKey::Single(_) => token.to_string(),
        PrimaryKey::Composite(_) => {
            let parts: Vec<String> = token.split(DELIMITER).map(|p| format!("'{p}'")).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// Conjunction of `column = value` terms selecting one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPredicate {
    terms: Vec<(String, String)>,
}

impl KeyPredicate {
    /// Key columns paired with the text decoded for each, in key order.
    pub fn terms(&self) -> &[(String, String)] {
        &self.terms
    }

    /// Renders the predicate as SQL with numbered placeholders.
    ///
    /// Returns the SQL fragment and the text to bind to `?1`, `?2`, ….
    pub fn to_sql(&self) -> (String, Vec<&str>) {
        self.to_sql_from(1)
    }

    /// Like [`to_sql`](Self::to_sql) but numbering placeholders from `first`.
    pub fn to_sql_from(&self, first: usize) -> (String, Vec<&str>) {
        let clauses: Vec<String> = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), first + i))
            .collect();
        let values = self.terms.iter().map(|(_, value)| value.as_str()).collect();
        (clauses.join(" AND "), values)
    }
}
