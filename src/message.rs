//! Event messages carried in log record values.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happened to an object
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectEventType {
    Create,
    Update,
    Delete,
}

/// Change notification for an object identified by `id`
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ObjectEvent {
    #[serde(rename = "type")]
    pub kind: ObjectEventType,
    pub id: i64,
}

/// Free-form content such as a chat message
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ContentEvent {
    #[serde(rename = "type")]
    pub kind: i32,
    pub attributes: BTreeMap<String, String>,
}

/// A message delivered to channel subscribers
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventMessage {
    Object(ObjectEvent),
    Content(ContentEvent),
}

impl EventMessage {
    /// Create an object event
    pub fn object(kind: ObjectEventType, id: i64) -> Self {
        Self::Object(ObjectEvent { kind, id })
    }

    /// Create a content event from key/value attributes
    pub fn content<K, V>(kind: i32, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Content(ContentEvent {
            kind,
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        })
    }

    /// Serialize into a record value
    pub fn encode(&self) -> Result<Bytes> {
        bincode::serialize(self)
            .map(Bytes::from)
            .map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Deserialize a record value
    pub fn decode(payload: &[u8]) -> Result<Self> {
        bincode::deserialize(payload).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}
