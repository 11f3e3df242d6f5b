//! General object serializer.
//!
//! Record bodies go through bincode unless the record type supplies its
//! own codec. The contract is simple: `from_bytes(to_bytes(x)) == x`
//! field-for-field for every serde-representable shape.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Codec failures: serialization, deserialization and framing.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Value could not be serialized
    #[error("serialize error: {0}")]
    Serialize(String),

    /// Bytes could not be deserialized into the target shape
    #[error("deserialize error: {0}")]
    Deserialize(String),

    /// Input ended before a frame was complete
    #[error("input truncated")]
    Truncated,

    /// Structurally invalid input
    #[error("malformed input: {0}")]
    Malformed(&'static str),
}

/// Serialize a value with the default object serializer.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(value).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Deserialize a value with the default object serializer.
pub fn from_bytes<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(data).map_err(|e| CodecError::Deserialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Player {
        name: String,
        level: i64,
        tags: Vec<String>,
    }

    #[test]
    fn test_roundtrip() {
        let p = Player {
            name: "jack".into(),
            level: 20,
            tags: vec!["a".into(), "b".into()],
        };
        let bytes = to_bytes(&p).unwrap();
        let back: Player = from_bytes(&bytes).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_deserialize_garbage_fails() {
        let result: Result<Player, _> = from_bytes(&[0xff, 0x01]);
        assert!(matches!(result, Err(CodecError::Deserialize(_))));
    }
}
