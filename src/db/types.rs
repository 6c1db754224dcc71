//! MySQL column decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies the column type name
//! 2. A per-category decoder extracts the value as JSON
//!
//! Values that cannot be decoded become `null` and are logged, so one odd
//! column never makes a whole inventory fail.

use crate::db::Record;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};
use tracing::warn;

/// Logical category for MySQL column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    DateTime,
    Date,
    Time,
}

/// Classify a MySQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal before anything matching "numeric"
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if (lower.contains("int") && !lower.contains("point")) || lower == "year" {
        return TypeCategory::Integer;
    }

    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bit" {
        return TypeCategory::Binary;
    }

    match lower.as_str() {
        "datetime" | "timestamp" => TypeCategory::DateTime,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        // varchar, char, text, enum, set and everything unknown
        _ => TypeCategory::Text,
    }
}

/// DECIMAL kept as its exact textual representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Binary data as UTF-8 text when valid, otherwise base64.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

/// Conversion of a result row into an inventory record.
pub trait RowToRecord {
    fn to_record(&self) -> Record;
}

impl RowToRecord for MySqlRow {
    fn to_record(&self) -> Record {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let value = decode_column(self, idx, categorize_type(type_name));
                (col.name().to_string(), value)
            })
            .collect()
    }
}

fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary_col(row, idx),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::DateTime => decode_datetime(row, idx),
        TypeCategory::Date => decode_date(row, idx),
        TypeCategory::Time => decode_time(row, idx),
        TypeCategory::Text => decode_text(row, idx),
    }
}

fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.0),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            warn!(column = idx, error = %e, "Failed to decode DECIMAL");
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Null;
    }
    if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    warn!(column = idx, "Failed to decode integer column");
    JsonValue::Null
}

fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary_col(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| decode_binary_value(&v))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
    row.try_get::<Option<serde_json::Value>, _>(idx)
        .ok()
        .flatten()
        .unwrap_or(JsonValue::Null)
}

fn decode_datetime(row: &MySqlRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    // TIMESTAMP columns decode as UTC
    if let Ok(Some(v)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    decode_text(row, idx)
}

fn decode_date(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.format("%Y-%m-%d").to_string()),
        Ok(None) => JsonValue::Null,
        Err(_) => decode_text(row, idx),
    }
}

fn decode_time(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.format("%H:%M:%S").to_string()),
        Ok(None) => JsonValue::Null,
        Err(_) => decode_text(row, idx),
    }
}

fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v),
        Ok(None) => JsonValue::Null,
        // ENUM/SET and some collations only decode as raw bytes
        Err(_) => decode_binary_col(row, idx),
    }
}
