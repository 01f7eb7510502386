//! JSON codec for the host boundary
//!
//! Decode failures on ingress drop the command (no reliable `id` exists to
//! correlate an error); encode failures on egress drop the one result. Both are
//! logged by the caller and never stop the loops.

use serde_json::Value;

use crate::error::{DispatchError, Result};
use crate::execution::command::{Command, CommandResult, Payload};

/// Decode one inbound command
pub fn decode_command(text: &str) -> Result<Command> {
    serde_json::from_value(parse_object(text)?).map_err(|e| DispatchError::Decode(e.to_string()))
}

/// Encode one outbound result
pub fn encode_result(result: &CommandResult) -> Result<String> {
    serde_json::to_string(result).map_err(|e| DispatchError::Encode {
        id: result.id.clone(),
        reason: e.to_string(),
    })
}

/// Decode a result previously produced by [`encode_result`]
pub fn decode_result(text: &str) -> Result<CommandResult> {
    serde_json::from_value(parse_object(text)?).map_err(|e| DispatchError::Decode(e.to_string()))
}

// Envelopes are objects only; serde's derived visitors would also take arrays.
fn parse_object(text: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(DispatchError::Decode(format!(
            "expected a JSON object, found {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(DispatchError::Decode(e.to_string())),
    }
}

/// Decode raw bytes into the generic payload shape
///
/// Empty input decodes as an empty payload; anything other than a JSON object fails.
pub fn decode_payload(bytes: &[u8]) -> Result<Payload> {
    if bytes.is_empty() {
        return Ok(Payload::new());
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Payload::new()),
        Ok(other) => Err(DispatchError::Decode(format!(
            "expected a JSON object, found {}",
            json_type_name(&other)
        ))),
        Err(e) => Err(DispatchError::Decode(e.to_string())),
    }
}

/// Encode a payload into handler input bytes
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| DispatchError::Decode(e.to_string()))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
