// Validation of propagation request payloads

use crate::error::{Error, Result};
use crate::types::PropagationCommand;
use serde_json::Value;

/// Parse a raw request body into a command.
pub fn parse_propagation_request(body: &[u8]) -> Result<PropagationCommand> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidPayload(format!("Invalid JSON: {}", e)))?;
    validate_propagation_request(&value)
}

/// Validate an already-parsed payload.
///
/// `session_id` is required. `start_frame_index` defaults to 0 and
/// `quick_test_mode` to false when absent or null; unknown fields are ignored.
pub fn validate_propagation_request(value: &Value) -> Result<PropagationCommand> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::InvalidPayload("Invalid JSON: expected an object".to_string()))?;

    let session_id = match object.get("session_id") {
        Some(Value::String(id)) => id.clone(),
        _ => return Err(Error::MissingField("session_id".to_string())),
    };

    let start_frame_index = match object.get("start_frame_index") {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_u64().ok_or_else(|| {
            Error::InvalidPayload(format!(
                "start_frame_index must be a non-negative integer, got {}",
                v
            ))
        })?,
    };

    let quick_test_mode = match object.get("quick_test_mode") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(v) => {
            return Err(Error::InvalidPayload(format!(
                "quick_test_mode must be a boolean, got {}",
                v
            )))
        }
    };

    Ok(PropagationCommand {
        session_id,
        start_frame_index,
        quick_test_mode,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let command = validate_propagation_request(&json!({"session_id": "abc"})).unwrap();
        assert_eq!(command.session_id, "abc");
        assert_eq!(command.start_frame_index, 0);
        assert!(!command.quick_test_mode);
    }

    #[test]
    fn test_all_fields() {
        let command = validate_propagation_request(&json!({
            "session_id": "s1",
            "start_frame_index": 5,
            "quick_test_mode": true,
            "unrelated": [1, 2, 3]
        }))
        .unwrap();
        assert_eq!(command, PropagationCommand::new("s1").with_start_frame_index(5).with_quick_test_mode(true));
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let command = validate_propagation_request(&json!({
            "session_id": "s1",
            "start_frame_index": null,
            "quick_test_mode": null
        }))
        .unwrap();
        assert_eq!(command.start_frame_index, 0);
        assert!(!command.quick_test_mode);
    }

    #[test]
    fn test_missing_session_id() {
        assert!(matches!(
            validate_propagation_request(&json!({})),
            Err(Error::MissingField(f)) if f == "session_id"
        ));
        assert!(matches!(
            validate_propagation_request(&json!({"session_id": null})),
            Err(Error::MissingField(_))
        ));
        assert!(matches!(
            validate_propagation_request(&json!({"session_id": 42})),
            Err(Error::MissingField(_))
        ));
    }

    #[test]
    fn test_non_object_payloads() {
        for value in [json!([1, 2]), json!("session"), json!(null), json!(3)] {
            assert!(matches!(
                validate_propagation_request(&value),
                Err(Error::InvalidPayload(_))
            ));
        }
    }

    #[test]
    fn test_unparseable_body() {
        assert!(matches!(
            parse_propagation_request(b"not json"),
            Err(Error::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_propagation_request(b""),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_wrongly_typed_optional_fields() {
        for body in [
            json!({"session_id": "s", "start_frame_index": -1}),
            json!({"session_id": "s", "start_frame_index": 1.5}),
            json!({"session_id": "s", "start_frame_index": "3"}),
            json!({"session_id": "s", "quick_test_mode": "yes"}),
        ] {
            assert!(matches!(
                validate_propagation_request(&body),
                Err(Error::InvalidPayload(_))
            ));
        }
    }

    #[test]
    fn test_parse_from_bytes() {
        let command = parse_propagation_request(br#"{"session_id":"s1","start_frame_index":5}"#).unwrap();
        assert_eq!(command.start_frame_index, 5);
    }
}
