//! Value serialization capability.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheError;

/// Converts values to and from bytes. `CacheEngine` is generic over this capability; the
/// default is [`JsonSerializer`].
pub trait Serializer: Send + Sync + 'static {
    /// Encode a value. Returns `InvalidArgument` if the value cannot be round-tripped.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError>;

    /// Decode bytes back into a value. Returns `ReadFailure` on malformed bytes; callers
    /// never see this directly.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError>;
}

/// `serde_json`-backed `Serializer`, the default for `CacheEngine`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value)
            .map_err(|e| CacheError::invalid_argument(format!("value is not serializable: {e}")))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CacheError::read_failure(format!("value failed to deserialize: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
        count: u32,
    }

    #[test]
    fn json_serializer_round_trips() {
        let codec = JsonSerializer;
        let widget = Widget { name: "bolt".into(), count: 12 };
        let bytes = codec.serialize(&widget).unwrap();
        let back: Widget = codec.deserialize(&bytes).unwrap();
        assert_eq!(widget, back);
    }

    #[test]
    fn json_serializer_rejects_garbage_on_decode() {
        let codec = JsonSerializer;
        let err = codec.deserialize::<Widget>(b"not json").unwrap_err();
        assert!(err.is_read_failure());
    }
}
