//! Response envelopes for the pair-list protocol.

use serde_json::{json, Value};

/// `[["status","ok"], ...payload]`. The payload must itself be a pair list
/// (possibly empty); anything else is wrapped under a `"result"` key.
pub fn envelope_ok(payload: Value) -> Value {
    let mut entries = vec![json!(["status", "ok"])];
    match payload {
        Value::Array(items)
            if items.iter().all(|item| {
                matches!(item, Value::Array(pair) if pair.len() == 2 && pair[0].is_string())
            }) =>
        {
            entries.extend(items);
        }
        Value::Null => {}
        other => entries.push(json!(["result", other])),
    }
    Value::Array(entries)
}

/// `[["status","error"],["error","..."]]`
pub fn envelope_error(message: impl std::fmt::Display) -> Value {
    json!([["status", "error"], ["error", message.to_string()]])
}
