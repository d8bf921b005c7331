//! Conversion between [`litebrowse_core::Value`] and SQLite values.
//!
//! Reading goes through [`ValueRef`] so text and blobs are copied once.
//! Booleans have no storage class of their own and are written as `0`/`1`;
//! on the way back they are restored from the column's declared type.

use litebrowse_core::{
    Column, KeyPredicate, PkToken, PrimaryKey, Row, TableMetadata, TypeFamily, Value, pk,
};
use rusqlite::types::{Value as SqlValue, ValueRef};

/// Converts a typed value into a bindable SQLite value.
pub(crate) fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    }
}

/// Converts a raw SQLite value, without regard to the column type.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// Converts a raw SQLite value read from `column`.
pub(crate) fn from_column(column: Option<&Column>, value: ValueRef<'_>) -> Value {
    match (column.map(Column::family), value) {
        (Some(TypeFamily::Bool), ValueRef::Integer(i @ (0 | 1))) => Value::Bool(i == 1),
        (_, other) => from_sql(other),
    }
}

/// Reads every column of a result row into a [`Row`], typing values by the
/// matching column of `meta` where one exists.
pub(crate) fn read_row(
    row: &rusqlite::Row<'_>,
    names: &[String],
    meta: Option<&TableMetadata>,
) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (i, name) in names.iter().enumerate() {
        let column = meta.and_then(|m| m.column(name));
        out.push(name.clone(), from_column(column, row.get_ref(i)?));
    }
    Ok(out)
}

/// Binds key text with the storage class its column would give it.
///
/// SQLite only applies affinity to the column side of a comparison, so a
/// key column without a declared type needs the text pre-converted when it
/// is the canonical form of a number.
pub(crate) fn key_param(column: Option<&Column>, text: &str) -> SqlValue {
    let family = column.map(Column::family).unwrap_or(TypeFamily::Untyped);
    match family {
        TypeFamily::Integer | TypeFamily::Bool => text
            .parse::<i64>()
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(text.to_string())),
        TypeFamily::Real | TypeFamily::Numeric => text
            .parse::<f64>()
            .map(SqlValue::Real)
            .unwrap_or_else(|_| SqlValue::Text(text.to_string())),
        TypeFamily::Untyped => match (text.parse::<i64>(), text.parse::<f64>()) {
            (Ok(i), _) if i.to_string() == text => SqlValue::Integer(i),
            (_, Ok(r)) if r.to_string() == text => SqlValue::Real(r),
            _ => SqlValue::Text(text.to_string()),
        },
        TypeFamily::Text | TypeFamily::Blob => SqlValue::Text(text.to_string()),
    }
}

/// Whether the key text of a stored `value` binds back to an equal value.
///
/// Text such as `'5'` in an untyped column would be bound as the integer
/// `5` and miss its own row, so it cannot address the row by token.
pub(crate) fn key_round_trips(column: Option<&Column>, value: &Value) -> bool {
    match value {
        Value::Text(text) => matches!(key_param(column, text), SqlValue::Text(_)),
        _ => true,
    }
}

/// Encodes the key token of a row read from `meta`'s table.
pub(crate) fn row_token(meta: &TableMetadata, key: &PrimaryKey, row: &Row) -> PkToken {
    let ambiguous = key.columns().iter().any(|name| {
        row.get(name)
            .is_some_and(|value| !key_round_trips(meta.column(name), value))
    });
    if ambiguous {
        return PkToken::Unencodable;
    }
    pk::encode(row, key)
}

/// Bind values for a key predicate, typed per key column.
pub(crate) fn key_params(meta: &TableMetadata, predicate: &KeyPredicate) -> Vec<SqlValue> {
    predicate
        .terms()
        .iter()
        .map(|(column, text)| key_param(meta.column(column), text))
        .collect()
}

/// Renders a value as a SQL literal, for DDL where parameters are not allowed.
pub(crate) fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) if r.is_finite() => format!("{r:?}"),
        Value::Real(_) => "NULL".to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::Bool(b) => i64::from(*b).to_string(),
    }
}
