use serde::Deserialize;

use crate::alert_error;
use crate::error::{AlertResult, ErrorKind};

/// Payload of a subscription-update notification.
///
/// Carries the ids of every subscription whose recomputation inputs changed.
/// A single notification may cover many subscriptions at once.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePayload {
    pub ids: Vec<i64>,
}

/// Payload of a condition on/off change notification.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionChangePayload {
    pub id: i64,
    pub is_on: bool,
}

impl UpdatePayload {
    pub fn from_json(payload: &str) -> AlertResult<Self> {
        serde_json::from_str(payload).map_err(|err| {
            alert_error!(
                ErrorKind::DeserializationError,
                "Failed to parse subscription update payload",
                source: err
            )
        })
    }
}

impl ConditionChangePayload {
    pub fn from_json(payload: &str) -> AlertResult<Self> {
        serde_json::from_str(payload).map_err(|err| {
            alert_error!(
                ErrorKind::DeserializationError,
                "Failed to parse condition change payload",
                source: err
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_update_payload() {
        let payload = UpdatePayload::from_json(r#"{"ids": [5, 7, 9]}"#).unwrap();
        assert_eq!(payload.ids, vec![5, 7, 9]);
    }

    #[test]
    fn parses_condition_change_payload() {
        let payload = ConditionChangePayload::from_json(r#"{"id": 3, "is_on": false}"#).unwrap();
        assert_eq!(payload.id, 3);
        assert!(!payload.is_on);
    }

    #[test]
    fn malformed_payload_is_a_deserialization_error() {
        let err = UpdatePayload::from_json("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);

        let err = ConditionChangePayload::from_json(r#"{"id": "three"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }
}
