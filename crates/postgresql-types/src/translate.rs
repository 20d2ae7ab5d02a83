//! Document → sink value translation.
//!
//! Maps a document's fields onto a target [`ColumnSchema`]. Fields without a
//! matching column are dropped (internal bookkeeping fields, fields the table
//! does not declare); this is policy, not an error. Coercion is minimal:
//! only `timestamp` columns are rewritten, everything else passes through and
//! the sink enforces the final type.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use sync_core::{ColumnSchema, ColumnType, Document, RawValue};

/// Columns stripped before every insert and update by default.
pub const DEFAULT_IGNORED_COLUMNS: &[&str] = &["__v"];

/// Value written for timestamps that cannot be parsed.
pub const TIMESTAMP_SENTINEL: &str = "infinity";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A (column, coerced value) pair ready for statement construction.
///
/// `column` always names a column of the schema it was translated against.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkValue {
    pub column: String,
    pub value: RawValue,
}

impl SinkValue {
    pub fn new(column: impl Into<String>, value: impl Into<RawValue>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// How timestamp columns are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampStyle {
    /// Date and time of day both in UTC
    #[default]
    Utc,
    /// UTC calendar date with the local wall-clock time of day
    LegacyLocal,
}

/// Translates documents against a column schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueTranslator {
    style: TimestampStyle,
}

impl ValueTranslator {
    pub fn new(style: TimestampStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> TimestampStyle {
        self.style
    }

    /// Translate every field of `fields` that has a column in `schema`.
    ///
    /// Output order follows the input document. Exactly one value is produced
    /// per matched field.
    pub fn translate(&self, fields: &Document, schema: &ColumnSchema) -> Vec<SinkValue> {
        let mut values = Vec::with_capacity(fields.len());
        for (key, raw) in fields.iter() {
            let Some(column) = schema.get(key) else {
                tracing::trace!("Dropping field '{}' without a matching column", key);
                continue;
            };
            values.push(SinkValue {
                column: column.name.clone(),
                value: self.coerce(column.column_type, raw),
            });
        }
        values
    }

    fn coerce(&self, column_type: ColumnType, raw: &RawValue) -> RawValue {
        match column_type {
            ColumnType::Timestamp => self.coerce_timestamp(raw),
            ColumnType::Text | ColumnType::Number | ColumnType::Boolean | ColumnType::Json => {
                raw.clone()
            }
        }
    }

    fn coerce_timestamp(&self, raw: &RawValue) -> RawValue {
        if raw.is_null() {
            return RawValue::Null;
        }
        match parse_timestamp(raw) {
            Some(ts) => RawValue::String(format_timestamp(ts, self.style)),
            None => {
                tracing::debug!("Unparseable timestamp {}, writing '{}'", raw, TIMESTAMP_SENTINEL);
                RawValue::String(TIMESTAMP_SENTINEL.to_string())
            }
        }
    }
}

/// Translate with the default (UTC) timestamp style.
pub fn translate(fields: &Document, schema: &ColumnSchema) -> Vec<SinkValue> {
    ValueTranslator::default().translate(fields, schema)
}

/// Remove values whose column is in `columns_to_ignore`.
pub fn drop_columns<S: AsRef<str>>(values: &mut Vec<SinkValue>, columns_to_ignore: &[S]) {
    values.retain(|v| !columns_to_ignore.iter().any(|c| c.as_ref() == v.column));
}

/// Interpret a raw value as a point in time.
///
/// Numbers are epoch milliseconds. Strings may be RFC 3339, `YYYY-MM-DD HH:MM:SS`
/// (read as UTC), or a bare `YYYY-MM-DD`.
pub fn parse_timestamp(raw: &RawValue) -> Option<DateTime<Utc>> {
    match raw {
        RawValue::Timestamp(ts) => Some(*ts),
        RawValue::Int(ms) => DateTime::from_timestamp_millis(*ms),
        RawValue::Float(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
        RawValue::String(s) => parse_timestamp_str(s),
        RawValue::Float(_)
        | RawValue::Null
        | RawValue::Bool(_)
        | RawValue::Document(_)
        | RawValue::Array(_) => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Render a timestamp as `YYYY-MM-DD HH:MM:SS`.
pub fn format_timestamp(ts: DateTime<Utc>, style: TimestampStyle) -> String {
    match style {
        TimestampStyle::Utc => ts.format(TIMESTAMP_FORMAT).to_string(),
        TimestampStyle::LegacyLocal => format!(
            "{} {}",
            ts.format("%Y-%m-%d"),
            ts.with_timezone(&Local).format("%H:%M:%S")
        ),
    }
}
