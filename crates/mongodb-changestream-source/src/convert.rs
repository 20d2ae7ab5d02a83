//! BSON to raw value conversion.

use crate::error::SourceError;
use base64::{engine::general_purpose, Engine as _};
use mongodb::bson::{self, Bson};
use sync_core::{Document, RawValue};

/// Convert a BSON value into a [`RawValue`].
///
/// Identifiers and other string-like BSON types become strings; integer
/// widths are widened to i64; dates and oplog timestamps become UTC
/// timestamps. Key order of nested documents is kept.
pub fn bson_to_raw_value(value: Bson) -> Result<RawValue, SourceError> {
    match value {
        Bson::Double(f) => Ok(RawValue::Float(f)),
        Bson::String(s) => Ok(RawValue::String(s)),
        Bson::Array(items) => items
            .into_iter()
            .map(bson_to_raw_value)
            .collect::<Result<Vec<_>, _>>()
            .map(RawValue::Array),
        Bson::Document(doc) => bson_to_document(doc).map(RawValue::Document),
        Bson::Boolean(b) => Ok(RawValue::Bool(b)),
        Bson::Null | Bson::Undefined => Ok(RawValue::Null),
        Bson::RegularExpression(regex) => Ok(RawValue::String(format!(
            "/{}/{}",
            regex.pattern, regex.options
        ))),
        Bson::JavaScriptCode(code) => Ok(RawValue::String(code)),
        Bson::JavaScriptCodeWithScope(code_with_scope) => {
            let scope = bson_to_document(code_with_scope.scope)?;
            Ok(RawValue::Document(
                Document::new()
                    .with("$code", code_with_scope.code)
                    .with("$scope", scope),
            ))
        }
        Bson::Int32(i) => Ok(RawValue::Int(i as i64)),
        Bson::Int64(i) => Ok(RawValue::Int(i)),
        Bson::Timestamp(ts) => timestamp_to_chrono(ts)
            .map(RawValue::Timestamp)
            .ok_or_else(|| {
                SourceError::Conversion(format!("timestamp out of range: {}", ts.time))
            }),
        Bson::Binary(binary) => Ok(RawValue::String(
            general_purpose::STANDARD.encode(&binary.bytes),
        )),
        Bson::ObjectId(oid) => Ok(RawValue::String(oid.to_hex())),
        Bson::DateTime(dt) => Ok(RawValue::Timestamp(dt.to_chrono())),
        Bson::Symbol(s) => Ok(RawValue::String(s)),
        Bson::Decimal128(d) => {
            let decimal_str = d.to_string();
            match decimal_str.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(RawValue::Float(f)),
                _ => Ok(RawValue::String(decimal_str)),
            }
        }
        Bson::MaxKey => Ok(RawValue::Document(Document::new().with("$maxKey", 1))),
        Bson::MinKey => Ok(RawValue::Document(Document::new().with("$minKey", 1))),
        Bson::DbPointer(_) => Err(SourceError::Conversion(
            "DBPointer values are not supported".to_string(),
        )),
    }
}

/// Convert a BSON document field by field, keeping key order.
pub fn bson_to_document(doc: bson::Document) -> Result<Document, SourceError> {
    doc.into_iter()
        .map(|(key, value)| -> Result<(String, RawValue), SourceError> {
            Ok((key, bson_to_raw_value(value)?))
        })
        .collect()
}

/// Oplog timestamps carry whole seconds; the increment is not a time unit.
pub(crate) fn timestamp_to_chrono(ts: bson::Timestamp) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp(ts.time as i64, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};

    #[test]
    fn test_object_id_becomes_hex_string() {
        let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        assert_eq!(
            bson_to_raw_value(Bson::ObjectId(oid)).unwrap(),
            RawValue::String("65a1b2c3d4e5f60718293a4b".to_string())
        );
    }

    #[test]
    fn test_integers_are_widened() {
        assert_eq!(bson_to_raw_value(Bson::Int32(7)).unwrap(), RawValue::Int(7));
        assert_eq!(bson_to_raw_value(Bson::Int64(-3)).unwrap(), RawValue::Int(-3));
    }

    #[test]
    fn test_datetime_becomes_timestamp() {
        let dt = bson::DateTime::from_millis(1_704_067_200_000);
        let RawValue::Timestamp(ts) = bson_to_raw_value(Bson::DateTime(dt)).unwrap() else {
            panic!("expected timestamp");
        };
        assert_eq!(ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_document_keeps_key_order() {
        let converted = bson_to_document(doc! {
            "z": 1,
            "a": { "nested": [true, null] },
            "m": "text",
        })
        .unwrap();

        assert_eq!(converted.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(
            converted.get("a"),
            Some(&RawValue::Document(Document::new().with(
                "nested",
                RawValue::Array(vec![RawValue::Bool(true), RawValue::Null])
            )))
        );
    }

    #[test]
    fn test_undefined_is_null() {
        assert_eq!(bson_to_raw_value(Bson::Undefined).unwrap(), RawValue::Null);
    }
}
