//! Error types for database administration operations.
//!
//! Every failure maps onto one of four [`ErrorKind`]s so a caller can tell
//! bad input apart from a missing entity, a name collision, or the engine
//! refusing a statement.

use std::fmt;

use litebrowse_core::{FieldErrors, KeyError};
use serde::Serialize;
use thiserror::Error;

/// Kind of entity a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Table,
    View,
    Column,
    Index,
    Trigger,
    Row,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Column => "column",
            Self::Index => "index",
            Self::Trigger => "trigger",
            Self::Row => "row",
        };
        f.write_str(name)
    }
}

/// Broad classification of an [`AdminError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing input; nothing was executed.
    Validation,
    /// A named entity or row does not exist; nothing was executed.
    NotFound,
    /// The engine rejected the statement; any transaction was rolled back.
    Execution,
    /// The request collides with existing state; nothing was executed.
    Conflict,
}

/// Errors that can occur during administration operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// SQLite rejected a query, DDL, or DML statement.
    #[error("execution failed: {0}")]
    Execution(#[from] rusqlite::Error),

    /// One or more submitted values failed validation.
    #[error("{message}{}", fields_suffix(.fields))]
    Validation { message: String, fields: FieldErrors },

    /// A required input was empty or absent.
    #[error("missing required input: {0}")]
    MissingInput(String),

    /// Input was present but unusable (e.g. a type outside the vocabulary).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A table, column, index, trigger, or row does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: EntityKind, name: String },

    /// The target name is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A primary-key token could not be decoded.
    #[error("invalid primary key: {0}")]
    Key(#[from] KeyError),

    /// Configuration file could not be parsed or written.
    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON import or export failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV import or export failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AdminError {
    pub(crate) fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>, fields: FieldErrors) -> Self {
        Self::Validation {
            message: message.into(),
            fields,
        }
    }

    /// Classifies the error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Execution(_) | Self::Io(_) => ErrorKind::Execution,
            Self::Validation { .. }
            | Self::MissingInput(_)
            | Self::InvalidInput(_)
            | Self::Key(_)
            | Self::Config(_)
            | Self::Json(_)
            | Self::Csv(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
        }
    }
}

fn fields_suffix(fields: &FieldErrors) -> String {
    if fields.is_empty() {
        String::new()
    } else {
        format!(" ({fields})")
    }
}

/// Convenience alias for results with [`AdminError`].
pub type Result<T> = std::result::Result<T, AdminError>;
