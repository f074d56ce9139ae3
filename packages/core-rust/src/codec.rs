//! Payload encoding for broker messages and cached values.
//!
//! Two concerns live here:
//!
//! - **Broker payloads** ([`Payload`], [`encode_payload`], [`decode_payload`]):
//!   text and raw bytes pass through untouched, structured values are encoded
//!   as compact JSON. Inbound payloads are always parsed as JSON.
//! - **Cache serializers** ([`Codec`], [`JsonCodec`], [`MsgPackCodec`]):
//!   the pluggable serializer used by the memoizing executor to turn typed
//!   results into opaque byte blobs and back.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maximum number of bytes of an offending payload kept in a [`CodecError`].
const PREVIEW_LIMIT: usize = 128;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Payload encode/decode failures.
///
/// Both variants carry a lossy, truncated preview of the offending data so
/// the error can be logged without dumping arbitrarily large payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("error while serialization: {reason} (data: {data})")]
    Serialization { data: String, reason: String },
    #[error("error while deserialization: {reason} (data: {data})")]
    Deserialization { data: String, reason: String },
}

impl CodecError {
    fn serialization(data: impl std::fmt::Debug, reason: impl ToString) -> Self {
        Self::Serialization {
            data: truncate(format!("{data:?}")),
            reason: reason.to_string(),
        }
    }

    fn deserialization(data: &[u8], reason: impl ToString) -> Self {
        Self::Deserialization {
            data: truncate(String::from_utf8_lossy(data).into_owned()),
            reason: reason.to_string(),
        }
    }
}

fn truncate(mut preview: String) -> String {
    if preview.len() > PREVIEW_LIMIT {
        let mut cut = PREVIEW_LIMIT;
        while !preview.is_char_boundary(cut) {
            cut -= 1;
        }
        preview.truncate(cut);
        preview.push_str("...");
    }
    preview
}

// ---------------------------------------------------------------------------
// Broker payloads
// ---------------------------------------------------------------------------

/// An outbound message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes, published as-is.
    Bytes(Vec<u8>),
    /// UTF-8 text, published as its bytes.
    Text(String),
    /// Composite value, published as compact JSON.
    Structured(serde_json::Value),
}

impl Payload {
    /// Builds a structured payload from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] if `value` cannot be represented
    /// as JSON (e.g. a map with non-string keys).
    pub fn structured<T: Serialize + std::fmt::Debug>(value: &T) -> Result<Self, CodecError> {
        serde_json::to_value(value)
            .map(Self::Structured)
            .map_err(|e| CodecError::serialization(value, e))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Structured(value)
    }
}

/// Encodes an outbound payload into the bytes handed to the broker.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if a structured value fails to encode.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, CodecError> {
    match payload {
        Payload::Bytes(bytes) => Ok(bytes.clone()),
        Payload::Text(text) => Ok(text.as_bytes().to_vec()),
        Payload::Structured(value) => {
            serde_json::to_vec(value).map_err(|e| CodecError::serialization(value, e))
        }
    }
}

/// Parses an inbound message body as JSON.
///
/// # Errors
///
/// Returns [`CodecError::Deserialization`] if `bytes` is not valid JSON.
pub fn decode_payload(bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::deserialization(bytes, e))
}

// ---------------------------------------------------------------------------
// Cache serializers
// ---------------------------------------------------------------------------

/// Pluggable value serializer for cached results.
pub trait Codec: Send + Sync + 'static {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    /// Serialize a value into an opaque byte blob.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] when the value cannot be encoded.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a blob previously produced by [`Codec::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Deserialization`] when the blob does not decode
    /// into `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Whether `bytes` is this codec's encoding of an absent value (`None`,
    /// unit).
    fn is_null(&self, bytes: &[u8]) -> bool;
}

/// JSON serializer. The default for cached values.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::serialization("<value>", e))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::deserialization(bytes, e))
    }

    fn is_null(&self, bytes: &[u8]) -> bool {
        bytes.trim_ascii() == b"null"
    }
}

/// `MsgPack` serializer (named fields), for compact cache entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::serialization("<value>", e))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::deserialization(bytes, e))
    }

    fn is_null(&self, bytes: &[u8]) -> bool {
        // 0xc0 is the msgpack nil marker.
        bytes == [0xc0]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
