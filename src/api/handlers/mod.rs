use axum::Json;
use serde_json::{json, Value};

pub mod auth;
pub mod health;
pub mod person;

/// `{"message": ...}` envelope; `content` is attached only when it is present
/// and not empty.
pub fn build_response(message: &str, content: Option<Value>) -> Json<Value> {
    let mut body = json!({ "message": message });
    if let Some(content) = content.filter(has_content) {
        body["content"] = content;
    }
    Json(body)
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
