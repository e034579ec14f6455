//! Tagged payload codec for checkpoint state and metadata
//!
//! Every stored blob travels with a type tag so structured values and raw
//! bytes both survive a round trip unchanged.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Tag for JSON-encoded payloads
pub const TAG_JSON: &str = "json";
/// Tag for raw byte payloads
pub const TAG_BYTES: &str = "bytes";
/// Legacy alias for raw bytes, accepted on read only
pub const TAG_BYTEARRAY: &str = "bytearray";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unknown serialization type: {0}")]
    UnknownTag(String),
    #[error("Malformed {tag} payload: {source}")]
    Malformed {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A serialized value as it is written to and read from storage
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Encode any serializable value as a JSON payload
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Payload::Json)
    }

    /// Decode a JSON payload into a concrete type
    pub fn to_deserializable<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        match self {
            Payload::Json(value) => {
                serde_json::from_value(value.clone()).map_err(|source| DecodeError::Malformed {
                    tag: TAG_JSON.to_string(),
                    source,
                })
            }
            Payload::Bytes(bytes) => {
                serde_json::from_slice(bytes).map_err(|source| DecodeError::Malformed {
                    tag: TAG_BYTES.to_string(),
                    source,
                })
            }
        }
    }

    /// Split into the `(tag, bytes)` pair stored in the database
    pub fn dumps(&self) -> (&'static str, Vec<u8>) {
        match self {
            // Serializing a Value into a Vec cannot fail
            Payload::Json(value) => (TAG_JSON, serde_json::to_vec(value).unwrap_or_default()),
            Payload::Bytes(bytes) => (TAG_BYTES, bytes.clone()),
        }
    }

    /// Rebuild a payload from a stored `(tag, bytes)` pair
    pub fn loads(tag: &str, bytes: &[u8]) -> Result<Self, DecodeError> {
        match tag {
            TAG_JSON => serde_json::from_slice(bytes)
                .map(Payload::Json)
                .map_err(|source| DecodeError::Malformed {
                    tag: tag.to_string(),
                    source,
                }),
            TAG_BYTES | TAG_BYTEARRAY => Ok(Payload::Bytes(bytes.to_vec())),
            other => Err(DecodeError::UnknownTag(other.to_string())),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}
