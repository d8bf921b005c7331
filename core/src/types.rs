//! Metadata and value types for modeling a SQLite database.
//!
//! This module defines the plain data records handed between the catalog
//! reader, the row access layer, and whatever renders the results. None of
//! these types know about a live connection; they are loaded explicitly and
//! passed around by value or behind an `Arc`.

use std::collections::BTreeSet;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Declared column type.
///
/// The named variants form the fixed vocabulary accepted when adding a
/// column. Anything else read back from the catalog is kept verbatim as
/// [`DeclaredType::Native`] and classified by SQLite's affinity rules.
///
/// # Examples
///
/// ```
/// use litebrowse_core::{DeclaredType, TypeFamily};
///
/// assert_eq!(DeclaredType::parse("integer"), DeclaredType::Integer);
/// assert_eq!(DeclaredType::parse("BIGINT").family(), TypeFamily::Integer);
/// assert_eq!(DeclaredType::parse("VARCHAR(64)").family(), TypeFamily::Text);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclaredType {
    Text,
    Integer,
    Real,
    Blob,
    Json,
    Bool,
    DateTime,
    Date,
    Decimal,
    Time,
    Varchar,
    /// Engine-native type string outside the fixed vocabulary.
    Native(String),
}

impl DeclaredType {
    /// The fixed vocabulary, in the order it is offered to users.
    pub const VOCABULARY: [DeclaredType; 11] = [
        DeclaredType::Text,
        DeclaredType::Integer,
        DeclaredType::Real,
        DeclaredType::Blob,
        DeclaredType::Json,
        DeclaredType::Bool,
        DeclaredType::DateTime,
        DeclaredType::Date,
        DeclaredType::Decimal,
        DeclaredType::Time,
        DeclaredType::Varchar,
    ];

    /// Parses a declared type as stored in the catalog.
    ///
    /// Matching is case-insensitive. Type names carrying a size suffix such
    /// as `VARCHAR(255)` are kept as [`Native`](Self::Native) so the suffix
    /// survives; their family still follows affinity rules.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "TEXT" => Self::Text,
            "INTEGER" => Self::Integer,
            "REAL" => Self::Real,
            "BLOB" => Self::Blob,
            "JSON" => Self::Json,
            "BOOL" | "BOOLEAN" => Self::Bool,
            "DATETIME" => Self::DateTime,
            "DATE" => Self::Date,
            "DECIMAL" => Self::Decimal,
            "TIME" => Self::Time,
            "VARCHAR" => Self::Varchar,
            _ => Self::Native(trimmed.to_string()),
        }
    }

    /// Parses a type name strictly against the fixed vocabulary.
    ///
    /// Returns `None` for anything outside [`VOCABULARY`](Self::VOCABULARY).
    pub fn from_vocabulary(raw: &str) -> Option<Self> {
        match Self::parse(raw) {
            Self::Native(_) => None,
            known => Some(known),
        }
    }

    /// Returns the SQL spelling of the type.
    pub fn as_sql(&self) -> &str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Blob => "BLOB",
            Self::Json => "JSON",
            Self::Bool => "BOOL",
            Self::DateTime => "DATETIME",
            Self::Date => "DATE",
            Self::Decimal => "DECIMAL",
            Self::Time => "TIME",
            Self::Varchar => "VARCHAR",
            Self::Native(raw) => raw,
        }
    }

    /// Classifies the type for validation and formatting.
    pub fn family(&self) -> TypeFamily {
        match self {
            Self::Text | Self::Json | Self::DateTime | Self::Date | Self::Time | Self::Varchar => {
                TypeFamily::Text
            }
            Self::Integer => TypeFamily::Integer,
            Self::Real => TypeFamily::Real,
            Self::Decimal => TypeFamily::Numeric,
            Self::Bool => TypeFamily::Bool,
            Self::Blob => TypeFamily::Blob,
            Self::Native(raw) => native_family(raw),
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

// Affinity rules from the SQLite documentation, with date/time names kept
// as text since they are stored as ISO strings.
fn native_family(raw: &str) -> TypeFamily {
    let upper = raw.to_ascii_uppercase();
    if upper.is_empty() {
        TypeFamily::Untyped
    } else if upper.contains("INT") {
        TypeFamily::Integer
    } else if upper.contains("BOOL") {
        TypeFamily::Bool
    } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
        TypeFamily::Text
    } else if upper.contains("BLOB") {
        TypeFamily::Blob
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        TypeFamily::Real
    } else if upper.starts_with("NUMERIC") || upper.starts_with("DECIMAL") {
        TypeFamily::Numeric
    } else {
        TypeFamily::Text
    }
}

/// Validation class of a column, derived from its [`DeclaredType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeFamily {
    Text,
    Integer,
    Real,
    /// Exact numerics (`DECIMAL`, `NUMERIC`), validated as numbers but kept as text.
    Numeric,
    Bool,
    Blob,
    /// No declared type at all.
    Untyped,
}

impl TypeFamily {
    /// Whether column sums are meaningful for this family.
    pub fn is_summable(self) -> bool {
        matches!(self, Self::Integer | Self::Real)
    }
}

/// A column of a table or view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,
    /// Declared type as read from the catalog.
    pub declared_type: DeclaredType,
    /// Whether `NULL` is accepted.
    pub nullable: bool,
    /// Default value expression, if any.
    pub default_value: Option<String>,
    /// 1-based position within the primary key, if part of it.
    pub primary_key_position: Option<usize>,
    /// Whether the column is an auto-generated rowid alias.
    pub auto_increment: bool,
}

impl Column {
    /// Creates a nullable column with no default.
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            nullable: true,
            default_value: None,
            primary_key_position: None,
            auto_increment: false,
        }
    }

    /// Marks the column as `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Shorthand for `self.declared_type.family()`.
    pub fn family(&self) -> TypeFamily {
        self.declared_type.family()
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key_position.is_some()
    }
}

/// Foreign-key constraint from one column to a column of another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Column on the owning table.
    pub column: String,
    /// Referenced (parent) table.
    pub dest_table: String,
    /// Referenced column on the parent table.
    pub dest_column: String,
}

/// An index as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name, unique within the database.
    pub name: String,
    /// Table the index belongs to.
    pub table: String,
    /// Defining SQL; `None` for indexes created implicitly by constraints.
    pub sql: Option<String>,
    pub unique: bool,
    /// Indexed columns in key order, `None` when they could not be resolved.
    pub columns: Option<Vec<String>>,
}

impl Index {
    /// Returns `true` if `column` is one of the indexed columns.
    pub fn covers(&self, column: &str) -> bool {
        self.columns
            .as_ref()
            .is_some_and(|cols| cols.iter().any(|c| c == column))
    }
}

/// A trigger and its defining SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    /// Table or view the trigger is attached to.
    pub table: String,
    pub sql: String,
}

/// Data operation a view can accept through `INSTEAD OF` triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewOperation {
    Insert,
    Update,
    Delete,
}

impl ViewOperation {
    /// Parses an operation keyword, ignoring case.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A view, its defining SQL, and the operations its triggers support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    pub name: String,
    pub sql: String,
    pub operations: BTreeSet<ViewOperation>,
}

/// Primary key of a table: one column or several in declaration order.
///
/// # Examples
///
/// ```
/// use litebrowse_core::PrimaryKey;
///
/// let pk = PrimaryKey::from_columns(vec!["a".into(), "b".into()]).unwrap();
/// assert!(pk.is_composite());
/// assert_eq!(pk.columns(), ["a", "b"]);
/// assert!(PrimaryKey::from_columns(Vec::new()).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    /// Builds a key from ordered column names; `None` when empty.
    pub fn from_columns(mut columns: Vec<String>) -> Option<Self> {
        match columns.len() {
            0 => None,
            1 => columns.pop().map(Self::Single),
            _ => Some(Self::Composite(columns)),
        }
    }

    pub fn columns(&self) -> &[String] {
        match self {
            Self::Single(column) => std::slice::from_ref(column),
            Self::Composite(columns) => columns,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }
}

/// Everything the admin layer knows about one table or view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub is_view: bool,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<Index>,
    pub triggers: Vec<Trigger>,
    pub primary_key: Option<PrimaryKey>,
}

impl TableMetadata {
    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Looks up the foreign key declared on `column`.
    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// A typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Text form used inside primary-key tokens.
    ///
    /// Null and binary values have no stable text form and return `None`.
    pub fn key_text(&self) -> Option<String> {
        match self {
            Self::Null | Self::Blob(_) => None,
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
            Self::Blob(bytes) => f.write_str(&BASE64.encode(bytes)),
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Real(r) => serializer.serialize_f64(*r),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Blob(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

/// A row as an ordered mapping from column name to [`Value`].
///
/// Serializes as a JSON object whose keys keep column order.
///
/// # Examples
///
/// ```
/// use litebrowse_core::{Row, Value};
///
/// let row: Row = [("id".to_string(), Value::Integer(1))].into_iter().collect();
/// assert_eq!(row.get("id"), Some(&Value::Integer(1)));
/// assert_eq!(row.get("missing"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field; later lookups return the first field with a name.
    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.fields.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<(String, Value)> {
        self.fields
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vocabulary_case_insensitive() {
        assert_eq!(DeclaredType::parse("text"), DeclaredType::Text);
        assert_eq!(DeclaredType::parse(" Bool "), DeclaredType::Bool);
        assert_eq!(DeclaredType::parse("BOOLEAN"), DeclaredType::Bool);
        assert_eq!(DeclaredType::parse("datetime"), DeclaredType::DateTime);
    }

    #[test]
    fn test_parse_native_keeps_raw_text() {
        assert_eq!(
            DeclaredType::parse("VARCHAR(255)"),
            DeclaredType::Native("VARCHAR(255)".into())
        );
        assert_eq!(DeclaredType::parse("VARCHAR(255)").as_sql(), "VARCHAR(255)");
    }

    #[test]
    fn test_from_vocabulary_rejects_native() {
        assert_eq!(DeclaredType::from_vocabulary("json"), Some(DeclaredType::Json));
        assert_eq!(DeclaredType::from_vocabulary("UUID"), None);
    }

    #[test]
    fn test_native_affinity_families() {
        assert_eq!(DeclaredType::parse("BIGINT").family(), TypeFamily::Integer);
        assert_eq!(DeclaredType::parse("DOUBLE").family(), TypeFamily::Real);
        assert_eq!(DeclaredType::parse("NUMERIC(10,2)").family(), TypeFamily::Numeric);
        assert_eq!(DeclaredType::parse("CHARACTER(20)").family(), TypeFamily::Text);
        assert_eq!(DeclaredType::parse("TIMESTAMP").family(), TypeFamily::Text);
        assert_eq!(DeclaredType::parse("").family(), TypeFamily::Untyped);
    }

    #[test]
    fn test_primary_key_from_columns() {
        assert_eq!(
            PrimaryKey::from_columns(vec!["id".into()]),
            Some(PrimaryKey::Single("id".into()))
        );
        let composite = PrimaryKey::from_columns(vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(composite.columns(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let mut row = Row::new();
        row.push("zeta", Value::Integer(1));
        row.push("alpha", Value::Blob(b"abc".to_vec()));
        row.push("mid", Value::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"zeta":1,"alpha":"YWJj","mid":null}"#);
    }

    #[test]
    fn test_key_text() {
        assert_eq!(Value::Integer(7).key_text().as_deref(), Some("7"));
        assert_eq!(Value::Bool(true).key_text().as_deref(), Some("1"));
        assert_eq!(Value::Null.key_text(), None);
        assert_eq!(Value::Blob(vec![1]).key_text(), None);
    }

    #[test]
    fn test_view_operation_keyword() {
        assert_eq!(ViewOperation::from_keyword("INSERT"), Some(ViewOperation::Insert));
        assert_eq!(ViewOperation::from_keyword("upsert"), None);
    }
}
