//! Decoder for the workflow's double-encoded response.
//!
//! The workflow answers `{"output": "<json text>"}`: the `output` field is a
//! string that must itself be parsed as JSON. This module is the only place
//! that knows about the double encoding; everything downstream sees a typed
//! [`ClassifierOutput`].

use serde::Deserialize;
use serde_json::Value;

use super::errors::ClassifierError;
use super::types::{CategoryAssignment, ClassifierOutput, RawIntentEntry};

#[derive(Debug, Deserialize)]
struct WorkflowEnvelope {
    #[serde(default)]
    output: Option<Value>,
}

/// Decode a workflow response body into the flat or two-level result shape.
pub fn decode_workflow_output(body: &str) -> Result<ClassifierOutput, ClassifierError> {
    let envelope: WorkflowEnvelope =
        serde_json::from_str(body).map_err(|e| ClassifierError::Malformed {
            reason: format!("response body is not JSON: {e}"),
        })?;

    let output = envelope.output.ok_or_else(|| ClassifierError::Malformed {
        reason: "response has no `output` field".into(),
    })?;

    // The contract is a JSON string; an already-decoded array is accepted too.
    let inner = match output {
        Value::String(text) => {
            serde_json::from_str::<Value>(text.trim()).map_err(|e| ClassifierError::Malformed {
                reason: format!("`output` is not valid JSON: {e}"),
            })?
        }
        other => other,
    };

    decode_result_value(inner)
}

/// Interpret an already-parsed result array.
pub fn decode_result_value(value: Value) -> Result<ClassifierOutput, ClassifierError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(ClassifierError::Malformed {
                reason: format!("expected a JSON array of categories, got {}", type_name(&other)),
            })
        }
    };

    let is_two_level = items
        .iter()
        .any(|item| item.get("intent_level1").is_some() || item.get("subcategories").is_some());

    if is_two_level {
        // Unusable entries decode to an empty default and are dropped by
        // validation, so one bad entry never discards its siblings.
        let entries = items
            .into_iter()
            .map(|item| serde_json::from_value::<RawIntentEntry>(item).unwrap_or_default())
            .collect();
        return Ok(ClassifierOutput::Intent(entries));
    }

    let assignments = items
        .into_iter()
        .map(serde_json::from_value::<CategoryAssignment>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ClassifierError::Malformed {
            reason: format!("invalid category assignment: {e}"),
        })?;

    Ok(ClassifierOutput::Flat(assignments))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
