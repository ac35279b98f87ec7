//! Event payload validation (§7 `Validation` kind), grounded in
//! `original_source/shared/validation.py`'s per-event-name schema check.
//! A malformed payload is a poison-redelivery risk rather than a transient
//! one, so callers match on `PipelineError::Validation` and ack instead of
//! retrying it forever.

use serde::de::DeserializeOwned;

use crate::error::PipelineError;

/// Deserializes `payload` as `T`, naming the event and carrying the raw
/// payload along on failure so a log line has enough to diagnose the
/// producer without a second round trip.
pub fn parse_event<T: DeserializeOwned>(
    event_name: &str,
    payload: serde_json::Value,
) -> Result<T, PipelineError> {
    let value = payload.to_string();
    serde_json::from_value(payload).map_err(|err| PipelineError::Validation {
        message: err.to_string(),
        field: event_name.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Example {
        n: u32,
    }

    #[test]
    fn malformed_payload_is_a_validation_error() {
        let err = parse_event::<Example>("test_event", serde_json::json!({"n": "not a number"}))
            .unwrap_err();
        match err {
            PipelineError::Validation { field, value, .. } => {
                assert_eq!(field, "test_event");
                assert!(value.contains("not a number"));
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn well_formed_payload_parses() {
        let parsed: Example = parse_event("test_event", serde_json::json!({"n": 5})).unwrap();
        assert_eq!(parsed.n, 5);
    }
}
