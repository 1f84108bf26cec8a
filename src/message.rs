use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// The unit of work crossing the broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedMessage {
    pub device_id: String,
    pub contact: String,
    pub platform_name: String,
    pub text: String,
    pub username: String,
}

impl QueuedMessage {
    /// All five fields non-empty; `platform_name`/`username` dot-free (routing-key integrity).
    pub fn validate(&self) -> Result<(), DispatchError> {
        for (field, value) in [
            ("device_id", &self.device_id),
            ("contact", &self.contact),
            ("platform_name", &self.platform_name),
            ("text", &self.text),
            ("username", &self.username),
        ] {
            if value.trim().is_empty() {
                return Err(DispatchError::InvalidMessage(format!(
                    "field '{}' must not be empty",
                    field
                )));
            }
        }
        if self.platform_name.contains('.') {
            return Err(DispatchError::InvalidMessage(
                "platform_name must not contain '.'".to_string(),
            ));
        }
        if self.username.contains('.') {
            return Err(DispatchError::InvalidMessage(
                "username must not contain '.'".to_string(),
            ));
        }
        Ok(())
    }

    /// Routing key `message.<platform>.<username>`.
    pub fn routing_key(&self) -> String {
        routing_key(&self.platform_name, &self.username)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, DispatchError> {
        serde_json::to_vec(self).map_err(DispatchError::Encode)
    }

    pub fn from_json(body: &[u8]) -> Result<Self, DispatchError> {
        serde_json::from_slice(body).map_err(DispatchError::Decode)
    }
}

pub fn routing_key(platform_name: &str, username: &str) -> String {
    format!("message.{}.{}", platform_name, username)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueuedMessage {
        QueuedMessage {
            device_id: "42".into(),
            contact: "+1".into(),
            platform_name: "wa".into(),
            text: "hi".into(),
            username: "u1".into(),
        }
    }

    #[test]
    fn validates_non_empty_fields() {
        let mut msg = sample();
        msg.contact = "  ".into();
        assert!(msg.validate().is_err());
    }

    #[test]
    fn rejects_dotted_platform_or_username() {
        let mut msg = sample();
        msg.platform_name = "wa.business".into();
        assert!(msg.validate().is_err());

        let mut msg = sample();
        msg.username = "tenant.one".into();
        assert!(msg.validate().is_err());
    }

    #[test]
    fn routing_key_is_dotted_triple() {
        let msg = sample();
        assert_eq!(msg.routing_key(), "message.wa.u1");
    }

    #[test]
    fn json_round_trip_is_semantically_equal() {
        let msg = sample();
        let encoded = msg.to_json().unwrap();
        let decoded = QueuedMessage::from_json(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }
}
