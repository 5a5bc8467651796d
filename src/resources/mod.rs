//! Resource CRUD handlers, one module per vendor resource type.
//!
//! Each module declares the resource's schema, the serde DTOs matching
//! the vendor's JSON shapes, and the [`crate::provider::Resource`]
//! implementation translating declarative state into REST calls.

pub mod domain_record;
pub mod private_network;
pub mod private_network_subnet;
pub mod user;
pub mod vrack_attachment;

use serde_json::Value;

use crate::error::ProviderError;

/// Read a required, non-empty string attribute from JSON state.
pub(crate) fn required_str<'a>(state: &'a Value, key: &str) -> Result<&'a str, ProviderError> {
    match state.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ProviderError::Validation(format!(
            "missing required attribute '{key}'"
        ))),
    }
}

/// Read an optional string attribute, empty when absent.
pub(crate) fn opt_str<'a>(state: &'a Value, key: &str) -> &'a str {
    state.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Read an optional bool attribute, false when absent.
pub(crate) fn opt_bool(state: &Value, key: &str) -> bool {
    state.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Read an optional integer attribute.
pub(crate) fn opt_i64(state: &Value, key: &str) -> Option<i64> {
    state.get(key).and_then(Value::as_i64)
}

/// The persisted identifier of the resource under operation.
pub(crate) fn id_str(state: &Value) -> Result<&str, ProviderError> {
    match state.get("id").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ProviderError::Validation(
            "resource has no persisted identifier".to_string(),
        )),
    }
}

/// Set an attribute on JSON state.
pub(crate) fn set_attr(state: &mut Value, key: &str, value: Value) {
    if let Some(obj) = state.as_object_mut() {
        obj.insert(key.to_string(), value);
    }
}
