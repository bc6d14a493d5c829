//! Status records returned by built-in flows
//!
//! A record is a JSON object with a `status` of `success`, `error` or
//! `async` plus a human-readable `message`; flows add their own fields.

use serde_json::{Value, json};

pub const SUCCESS: &str = "success";
pub const ERROR: &str = "error";
pub const ASYNC: &str = "async";

pub fn success(message: impl Into<String>) -> Value {
    record(SUCCESS, message.into())
}

pub fn failure(message: impl Into<String>) -> Value {
    record(ERROR, message.into())
}

/// Work continues in the background
pub fn pending(message: impl Into<String>) -> Value {
    record(ASYNC, message.into())
}

fn record(status: &str, message: String) -> Value {
    json!({ "status": status, "message": message })
}

/// Add the fields of `extra` (an object) to `record`
pub fn with_fields(mut record: Value, extra: Value) -> Value {
    if let (Value::Object(target), Value::Object(fields)) = (&mut record, extra) {
        target.extend(fields);
    }
    record
}

pub fn status_of(record: &Value) -> Option<&str> {
    record.get("status").and_then(Value::as_str)
}

pub fn is_success(record: &Value) -> bool {
    status_of(record) == Some(SUCCESS)
}
