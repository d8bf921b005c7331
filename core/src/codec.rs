//! Conversion between untyped form text and typed column values.
//!
//! [`decode`] turns what a user typed into a [`Value`] appropriate for the
//! column's declared type, reporting a specific [`DecodeError`] for every
//! rejection. [`render_for_display`] and [`render_for_input`] go the other
//! way, for summary listings and for pre-filling edit forms respectively.
//!
//! # Decoding rules
//!
//! 1. `null` (any case, surrounding whitespace ignored) is the null value,
//!    rejected for `NOT NULL` columns.
//! 2. Integer columns require all-digit text.
//! 3. Real and exact-numeric columns require text that parses as a number.
//! 4. Boolean columns accept `1`, `0`, `true`, `false`, `t`, `f`.
//! 5. Blob columns require standard base64.
//! 6. Everything else is text; `JSON` columns must additionally hold valid
//!    JSON.
//!
//! # Examples
//!
//! ```
//! use litebrowse_core::{DeclaredType, Value, decode};
//!
//! assert_eq!(decode(&DeclaredType::Bool, false, "T"), Ok(Value::Bool(true)));
//! assert!(decode(&DeclaredType::Bool, false, "maybe").is_err());
//! assert_eq!(decode(&DeclaredType::Integer, true, "NULL"), Ok(Value::Null));
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use thiserror::Error;

use crate::types::{DeclaredType, TypeFamily, Value};

/// Longest base64 rendering of a binary value in summary listings.
pub const MAX_BLOB_DISPLAY: usize = 1024;

/// Reasons a raw input string is rejected for a column.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum DecodeError {
    #[error("Column does not allow NULL values.")]
    NotNullable,
    #[error("Value is not a number.")]
    NotAnInteger,
    #[error("Value is not a numeric/real.")]
    NotANumber,
    #[error("Value must be 1, 0, true, false, t or f.")]
    NotBoolean,
    #[error("Value must be base64-encoded binary data.")]
    InvalidBase64,
    /// The value has the right shape but the storage format refuses it.
    #[error("{0}")]
    AdapterRejected(String),
}

/// Decodes raw form text into a value for a column of `declared` type.
///
/// # Errors
///
/// Returns the [`DecodeError`] describing the first rule the input breaks.
pub fn decode(declared: &DeclaredType, nullable: bool, raw: &str) -> Result<Value, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return if nullable {
            Ok(Value::Null)
        } else {
            Err(DecodeError::NotNullable)
        };
    }

    match declared.family() {
        TypeFamily::Integer => {
            if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
                return Err(DecodeError::NotAnInteger);
            }
            raw.parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| DecodeError::AdapterRejected(format!("integer out of range: {raw}")))
        }
        TypeFamily::Real => trimmed
            .parse::<f64>()
            .map(Value::Real)
            .map_err(|_| DecodeError::NotANumber),
        TypeFamily::Numeric => match trimmed.parse::<f64>() {
            Ok(_) => Ok(Value::Text(trimmed.to_string())),
            Err(_) => Err(DecodeError::NotANumber),
        },
        TypeFamily::Bool => parse_bool(raw).map(Value::Bool),
        TypeFamily::Blob => BASE64
            .decode(raw)
            .map(Value::Blob)
            .map_err(|_| DecodeError::InvalidBase64),
        TypeFamily::Text | TypeFamily::Untyped => {
            if *declared == DeclaredType::Json {
                serde_json::from_str::<serde_json::Value>(raw)
                    .map_err(|e| DecodeError::AdapterRejected(format!("invalid JSON: {e}")))?;
            }
            Ok(Value::Text(raw.to_string()))
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool, DecodeError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(DecodeError::NotBoolean),
    }
}

/// A value prepared for a summary listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayValue {
    Null,
    Plain { text: String },
    /// Long text: a prefix for the listing plus the full value on demand.
    Truncated { summary: String, full: String },
}

impl DisplayValue {
    /// The text shown in the listing.
    pub fn summary(&self) -> &str {
        match self {
            Self::Null => "NULL",
            Self::Plain { text } => text,
            Self::Truncated { summary, .. } => summary,
        }
    }
}

/// Renders a stored value for a summary listing.
///
/// Numbers pass through unformatted. Binary data renders as base64, capped
/// at [`MAX_BLOB_DISPLAY`] characters. Text longer than `max_len` characters
/// is truncated, keeping the full value alongside.
///
/// # Examples
///
/// ```
/// use litebrowse_core::{DeclaredType, DisplayValue, Value, render_for_display};
///
/// let shown = render_for_display(&Value::Blob(b"abc".to_vec()), &DeclaredType::Blob, 50);
/// assert_eq!(shown.summary(), "YWJj");
///
/// let long = Value::Text("x".repeat(60));
/// let shown = render_for_display(&long, &DeclaredType::Text, 50);
/// assert!(matches!(shown, DisplayValue::Truncated { .. }));
/// ```
pub fn render_for_display(value: &Value, declared: &DeclaredType, max_len: usize) -> DisplayValue {
    let text = match value {
        Value::Null => return DisplayValue::Null,
        Value::Integer(_) | Value::Real(_) => {
            return DisplayValue::Plain {
                text: value.to_string(),
            };
        }
        Value::Bool(b) if declared.family() == TypeFamily::Bool => {
            return DisplayValue::Plain {
                text: b.to_string(),
            };
        }
        Value::Blob(bytes) => {
            let mut encoded = BASE64.encode(bytes);
            encoded.truncate(MAX_BLOB_DISPLAY);
            encoded
        }
        other => other.to_string(),
    };

    if text.chars().count() > max_len {
        DisplayValue::Truncated {
            summary: text.chars().take(max_len).collect(),
            full: text,
        }
    } else {
        DisplayValue::Plain { text }
    }
}

/// Renders a stored value as text that [`decode`] maps back to the same value.
///
/// Null becomes the literal `null`; binary data becomes full base64.
pub fn render_for_input(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_literal_case_insensitive_and_trimmed() {
        assert_eq!(decode(&DeclaredType::Text, true, "  NuLl "), Ok(Value::Null));
        assert_eq!(
            decode(&DeclaredType::Text, false, "null"),
            Err(DecodeError::NotNullable)
        );
    }

    #[test]
    fn test_integer_requires_digits() {
        assert_eq!(decode(&DeclaredType::Integer, false, "42"), Ok(Value::Integer(42)));
        assert_eq!(
            decode(&DeclaredType::Integer, false, "4.2"),
            Err(DecodeError::NotAnInteger)
        );
        assert_eq!(
            decode(&DeclaredType::Integer, false, ""),
            Err(DecodeError::NotAnInteger)
        );
        assert_eq!(
            decode(&DeclaredType::parse("BIGINT"), false, "abc"),
            Err(DecodeError::NotAnInteger)
        );
    }

    #[test]
    fn test_integer_overflow_is_adapter_rejection() {
        let err = decode(&DeclaredType::Integer, false, "99999999999999999999").unwrap_err();
        assert!(matches!(err, DecodeError::AdapterRejected(_)));
    }

    #[test]
    fn test_real_and_decimal() {
        assert_eq!(decode(&DeclaredType::Real, false, " 1.5 "), Ok(Value::Real(1.5)));
        assert_eq!(
            decode(&DeclaredType::Real, false, "one"),
            Err(DecodeError::NotANumber)
        );
        assert_eq!(
            decode(&DeclaredType::Decimal, false, "10.25"),
            Ok(Value::Text("10.25".into()))
        );
        assert_eq!(
            decode(&DeclaredType::Decimal, false, "ten"),
            Err(DecodeError::NotANumber)
        );
    }

    #[test]
    fn test_bool_tokens() {
        for raw in ["1", "T", "true", "TRUE"] {
            assert_eq!(decode(&DeclaredType::Bool, false, raw), Ok(Value::Bool(true)));
        }
        for raw in ["0", "f", "False"] {
            assert_eq!(decode(&DeclaredType::Bool, false, raw), Ok(Value::Bool(false)));
        }
        assert_eq!(
            decode(&DeclaredType::Bool, false, "maybe"),
            Err(DecodeError::NotBoolean)
        );
    }

    #[test]
    fn test_blob_base64() {
        assert_eq!(
            decode(&DeclaredType::Blob, false, "YWJj"),
            Ok(Value::Blob(b"abc".to_vec()))
        );
        assert_eq!(
            decode(&DeclaredType::Blob, false, "not-base64!!"),
            Err(DecodeError::InvalidBase64)
        );
    }

    #[test]
    fn test_json_column_validated() {
        assert_eq!(
            decode(&DeclaredType::Json, false, r#"{"a":1}"#),
            Ok(Value::Text(r#"{"a":1}"#.into()))
        );
        let err = decode(&DeclaredType::Json, false, "{oops").unwrap_err();
        assert!(matches!(err, DecodeError::AdapterRejected(_)));
    }

    #[test]
    fn test_text_and_untyped_pass_through() {
        assert_eq!(
            decode(&DeclaredType::Date, false, "2024-01-31"),
            Ok(Value::Text("2024-01-31".into()))
        );
        assert_eq!(
            decode(&DeclaredType::parse(""), false, " spaced "),
            Ok(Value::Text(" spaced ".into()))
        );
    }

    #[test]
    fn test_decode_never_panics_on_odd_input() {
        let inputs = ["", " ", "\u{0}", "–", "9".repeat(400).as_str(), "=="]
            .map(|s| s.to_string());
        for declared in DeclaredType::VOCABULARY.iter() {
            for nullable in [true, false] {
                for raw in &inputs {
                    let _ = decode(declared, nullable, raw);
                }
            }
        }
    }

    #[test]
    fn test_display_numbers_pass_through() {
        let shown = render_for_display(&Value::Real(2.5), &DeclaredType::Real, 1);
        assert_eq!(shown, DisplayValue::Plain { text: "2.5".into() });
    }

    #[test]
    fn test_display_truncates_long_text() {
        let value = Value::Text("abcdefghij".into());
        let shown = render_for_display(&value, &DeclaredType::Text, 4);
        assert_eq!(
            shown,
            DisplayValue::Truncated {
                summary: "abcd".into(),
                full: "abcdefghij".into(),
            }
        );
    }

    #[test]
    fn test_display_caps_blob_encoding() {
        let value = Value::Blob(vec![0u8; 4096]);
        let shown = render_for_display(&value, &DeclaredType::Blob, usize::MAX);
        assert_eq!(shown.summary().len(), MAX_BLOB_DISPLAY);
    }

    #[test]
    fn test_input_rendering_round_trips() {
        let cases = [
            (DeclaredType::Integer, Value::Integer(12)),
            (DeclaredType::Blob, Value::Blob(vec![0, 159, 146, 150])),
            (DeclaredType::Bool, Value::Bool(true)),
            (DeclaredType::Text, Value::Null),
        ];
        for (declared, value) in cases {
            let text = render_for_input(&value);
            assert_eq!(decode(&declared, true, &text), Ok(value));
        }
    }
}
