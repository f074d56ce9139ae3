//! Wire schema for messages consumed from the account register topic.
//!
//! Producers emit JSON objects of the form
//! `{"event_type": "create", "user_uuid": "..."}`.

use serde::{Deserialize, Serialize};

use crate::codec::{decode_payload, CodecError};

/// Lifecycle event emitted by the account service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

impl EventType {
    /// Returns the wire name of this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A single account lifecycle message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub event_type: EventType,
    pub user_uuid: String,
}

impl AccountEvent {
    /// Parses an event from a raw message body.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Deserialization`] if the body is not JSON or
    /// does not match the event schema.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Self::from_value(decode_payload(bytes)?)
    }

    /// Converts an already-parsed JSON value into an event.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Deserialization`] if the value does not match
    /// the event schema.
    pub fn from_value(value: serde_json::Value) -> Result<Self, CodecError> {
        let preview = value.to_string();
        serde_json::from_value(value).map_err(|e| CodecError::Deserialization {
            data: preview,
            reason: e.to_string(),
        })
    }
}
