//! Turns store records into plain JSON for responses.
//!
//! A record goes through three steps:
//!
//! 1. `normalize`: a document becomes a mapping, with its `_id` surfaced as
//!    `id` (the document's own keys still win on conflict).
//! 2. `serialize`: the mapping becomes compact JSON text. BSON values that JSON
//!    has no native form for are coerced: datetimes to RFC 3339 strings, binary
//!    to UTF-8 text (or base64 when not valid UTF-8), object ids to hex. Any
//!    other BSON type is reduced to the `fields` subset of its extended-JSON
//!    mapping, or to `{}` when no fields were requested.
//! 3. The text is parsed again, `exclude` keys are dropped, then everything
//!    outside a non-empty `fields` list is dropped.
//!
//! Exclusion always wins: a key listed in both `fields` and `exclude` is absent
//! from the output.

use base64::Engine;
use mongodb::bson::{Bson, Document};
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("invalid JSON text: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot normalize {0} into a mapping")]
    NotNormalizable(&'static str),

    #[error("cannot filter keys of a non-mapping value")]
    NotAMapping,

    #[error("binary record is not UTF-8 text: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Output of a sanitize call. `original` carries the serialized text when the
/// request asked for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sanitized {
    pub value: Value,
    pub original: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SanitizeRequest {
    fields: Vec<String>,
    exclude: Vec<String>,
    keep_original: bool,
}

impl SanitizeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys to keep. Empty means no restriction.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude<I, S>(mut self, exclude: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = exclude.into_iter().map(Into::into).collect();
        self
    }

    /// Also return the serialized text alongside the sanitized value.
    pub fn keep_original(mut self) -> Self {
        self.keep_original = true;
        self
    }

    /// Returns `Ok(None)` for empty input (null, false, zero, empty string,
    /// binary, document or array).
    pub fn apply(&self, record: &Bson) -> Result<Option<Sanitized>, SanitizeError> {
        if is_empty(record) {
            return Ok(None);
        }

        let serialized = match record {
            Bson::String(text) => text.clone(),
            Bson::Binary(bin) => String::from_utf8(bin.bytes.clone())?,
            Bson::Int32(n) => n.to_string(),
            Bson::Int64(n) => n.to_string(),
            other => serialize(&normalize(other)?, &self.fields)?,
        };

        let mut sanitized: Value = serde_json::from_str(&serialized)?;

        if !self.exclude.is_empty() {
            let map = sanitized.as_object_mut().ok_or(SanitizeError::NotAMapping)?;
            for key in &self.exclude {
                map.remove(key);
            }
        }

        if !self.fields.is_empty() {
            let map = sanitized.as_object_mut().ok_or(SanitizeError::NotAMapping)?;
            map.retain(|key, _| self.fields.iter().any(|f| f == key));
        }

        Ok(Some(Sanitized {
            value: sanitized,
            original: self.keep_original.then_some(serialized),
        }))
    }
}

/// Shorthand for the common call: filter a record and return just the value.
pub fn sanitize(
    record: &Bson,
    fields: &[&str],
    exclude: &[&str],
) -> Result<Option<Value>, SanitizeError> {
    let sanitized = SanitizeRequest::new()
        .fields(fields.iter().copied())
        .exclude(exclude.iter().copied())
        .apply(record)?;
    Ok(sanitized.map(|s| s.value))
}

fn is_empty(record: &Bson) -> bool {
    match record {
        Bson::Null | Bson::Undefined => true,
        Bson::Boolean(b) => !b,
        Bson::Int32(n) => *n == 0,
        Bson::Int64(n) => *n == 0,
        Bson::Double(n) => *n == 0.0,
        Bson::String(s) => s.is_empty(),
        Bson::Binary(bin) => bin.bytes.is_empty(),
        Bson::Document(doc) => doc.is_empty(),
        Bson::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Mapping form of a record. Scalars without keys normalize to an empty mapping.
pub fn normalize(record: &Bson) -> Result<Document, SanitizeError> {
    match record {
        Bson::Document(doc) => {
            let mut out = Document::new();
            if let Some(id) = doc.get("_id") {
                out.insert("id", id.clone());
            }
            for (key, value) in doc {
                out.insert(key.clone(), value.clone());
            }
            Ok(out)
        }
        Bson::Array(_) => Err(SanitizeError::NotNormalizable("an array")),
        _ => Ok(Document::new()),
    }
}

/// Compact JSON text for a normalized record.
pub fn serialize(doc: &Document, fields: &[String]) -> Result<String, SanitizeError> {
    let value = document_to_json(doc, fields);
    Ok(serde_json::to_string(&value)?)
}

fn document_to_json(doc: &Document, fields: &[String]) -> Value {
    let map: Map<String, Value> = doc
        .iter()
        .map(|(key, value)| (key.clone(), to_json(value, fields)))
        .collect();
    Value::Object(map)
}

fn to_json(value: &Bson, fields: &[String]) -> Value {
    match value {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(n) => Value::from(*n),
        Bson::Int64(n) => Value::from(*n),
        Bson::Double(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(|v| to_json(v, fields)).collect()),
        Bson::Document(doc) => document_to_json(doc, fields),
        // An empty coercion (empty binary) falls through to the object fallback.
        other => match coerce(other) {
            Some(text) if !text.is_empty() => Value::String(text),
            _ => fallback_object(other, fields),
        },
    }
}

/// String form for the BSON types that have one. `None` means the value needs
/// the generic object fallback.
fn coerce(value: &Bson) -> Option<String> {
    match value {
        Bson::DateTime(dt) => Some(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        Bson::Binary(bin) => Some(match std::str::from_utf8(&bin.bytes) {
            Ok(text) => text.to_string(),
            Err(_) => base64::engine::general_purpose::STANDARD.encode(&bin.bytes),
        }),
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        _ => None,
    }
}

fn fallback_object(value: &Bson, fields: &[String]) -> Value {
    if fields.is_empty() {
        return Value::Object(Map::new());
    }
    match value.clone().into_relaxed_extjson() {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| fields.iter().any(|f| f == key))
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId, spec::BinarySubtype, Binary, DateTime, Timestamp};
    use serde_json::json;

    fn binary(bytes: &[u8]) -> Bson {
        Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes: bytes.to_vec() })
    }

    #[test]
    fn test_empty_inputs_are_noops() {
        for record in [
            Bson::Null,
            Bson::Boolean(false),
            Bson::Int32(0),
            Bson::Double(0.0),
            Bson::String(String::new()),
            Bson::Document(Document::new()),
            Bson::Array(vec![]),
            binary(b""),
        ] {
            assert!(sanitize(&record, &[], &["password"]).unwrap().is_none(), "{:?}", record);
        }
    }

    #[test]
    fn test_exclude_removes_keys() {
        let record = Bson::Document(doc! { "cpf": "123", "password": "hash", "name": "Ana" });
        let out = sanitize(&record, &[], &["password", "missing"]).unwrap().unwrap();
        assert_eq!(out, json!({ "cpf": "123", "name": "Ana" }));
    }

    #[test]
    fn test_fields_restrict_keys() {
        let record = Bson::Document(doc! { "cpf": "123", "password": "hash", "name": "Ana" });
        let out = sanitize(&record, &["cpf", "name", "absent"], &[]).unwrap().unwrap();
        let keys: Vec<&String> = out.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| ["cpf", "name"].contains(&k.as_str())));
    }

    #[test]
    fn test_exclude_wins_over_fields() {
        let record = Bson::Document(doc! { "cpf": "123", "password": "hash" });
        let out = sanitize(&record, &["cpf", "password"], &["password"]).unwrap().unwrap();
        assert_eq!(out, json!({ "cpf": "123" }));
    }

    #[test]
    fn test_document_id_surfaces_as_id() {
        let oid = ObjectId::new();
        let record = Bson::Document(doc! { "_id": oid, "cpf": "123" });
        let out = sanitize(&record, &[], &[]).unwrap().unwrap();
        assert_eq!(out["id"], json!(oid.to_hex()));
        assert_eq!(out["_id"], json!(oid.to_hex()));
    }

    #[test]
    fn test_record_id_field_overrides_derived_id() {
        let record = Bson::Document(doc! { "_id": ObjectId::new(), "id": "mine" });
        let out = sanitize(&record, &[], &[]).unwrap().unwrap();
        assert_eq!(out["id"], json!("mine"));
    }

    #[test]
    fn test_datetime_becomes_rfc3339() {
        let when = DateTime::from_millis(1_700_000_000_000);
        let record = Bson::Document(doc! { "created_at": when });
        let out = sanitize(&record, &[], &[]).unwrap().unwrap();
        let text = out["created_at"].as_str().unwrap();
        assert!(text.starts_with("2023-11-14T22:13:20"), "got {}", text);
    }

    #[test]
    fn test_binary_utf8_and_base64() {
        let record = Bson::Document(doc! {
            "text": binary(b"hello"),
            "raw": binary(&[0xff, 0xfe, 0x00]),
        });
        let out = sanitize(&record, &[], &[]).unwrap().unwrap();
        assert_eq!(out["text"], json!("hello"));
        assert_eq!(out["raw"], json!("//4A"));
    }

    #[test]
    fn test_nested_values_are_coerced() {
        let oid = ObjectId::new();
        let record = Bson::Document(doc! { "refs": [oid], "meta": { "owner": oid } });
        let out = sanitize(&record, &[], &[]).unwrap().unwrap();
        assert_eq!(out["refs"], json!([oid.to_hex()]));
        assert_eq!(out["meta"]["owner"], json!(oid.to_hex()));
    }

    #[test]
    fn test_unrecognized_value_without_fields_is_empty_mapping() {
        let record = Bson::Document(doc! { "ts": Timestamp { time: 1, increment: 2 }, "cpf": "1" });
        let out = sanitize(&record, &[], &[]).unwrap().unwrap();
        assert_eq!(out["ts"], json!({}));
    }

    #[test]
    fn test_unrecognized_value_reduced_to_fields() {
        let record = Bson::Document(doc! { "ts": Timestamp { time: 1, increment: 2 } });
        let out = SanitizeRequest::new()
            .fields(["ts", "$timestamp"])
            .apply(&record)
            .unwrap()
            .unwrap();
        assert_eq!(out.value["ts"], json!({ "$timestamp": { "t": 1, "i": 2 } }));
    }

    #[test]
    fn test_keep_original_returns_serialized_text() {
        let record = Bson::Document(doc! { "cpf": "123", "password": "hash" });
        let out = SanitizeRequest::new()
            .exclude(["password"])
            .keep_original()
            .apply(&record)
            .unwrap()
            .unwrap();
        assert_eq!(out.value, json!({ "cpf": "123" }));
        assert_eq!(out.original.as_deref(), Some(r#"{"cpf":"123","password":"hash"}"#));
    }

    #[test]
    fn test_primitive_text_is_parsed_as_json() {
        let out = sanitize(&Bson::String(r#"{"a":1,"b":2}"#.to_string()), &[], &["b"])
            .unwrap()
            .unwrap();
        assert_eq!(out, json!({ "a": 1 }));

        let out = sanitize(&Bson::Int64(42), &[], &[]).unwrap().unwrap();
        assert_eq!(out, json!(42));
    }

    #[test]
    fn test_failures_are_errors_not_values() {
        assert!(matches!(
            sanitize(&Bson::String("not json".to_string()), &[], &[]),
            Err(SanitizeError::Json(_))
        ));
        assert!(matches!(
            sanitize(&Bson::Int32(7), &[], &["x"]),
            Err(SanitizeError::NotAMapping)
        ));
        assert!(matches!(
            sanitize(&Bson::Array(vec![Bson::Int32(1)]), &[], &[]),
            Err(SanitizeError::NotNormalizable(_))
        ));
    }

    #[test]
    fn test_binary_record_must_be_utf8() {
        let record = binary(&[0x22, 0xff, 0x22]);
        assert!(matches!(
            SanitizeRequest::new().keep_original().apply(&record),
            Err(SanitizeError::InvalidUtf8(_))
        ));

        let out = SanitizeRequest::new()
            .keep_original()
            .apply(&binary(br#"{"a":1}"#))
            .unwrap()
            .unwrap();
        assert_eq!(out.value, json!({ "a": 1 }));
        assert_eq!(out.original.as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_scalar_records_normalize_to_empty_mapping() {
        let out = sanitize(&Bson::Double(1.5), &[], &[]).unwrap().unwrap();
        assert_eq!(out, json!({}));
    }

    #[test]
    fn test_non_finite_double_serializes_as_null() {
        let record = Bson::Document(doc! { "score": f64::NAN });
        let out = sanitize(&record, &[], &[]).unwrap().unwrap();
        assert_eq!(out["score"], Value::Null);
    }
}
