//! The value codec pipeline: serialize, optionally compress, tag with an
//! anti-tamper hash.

pub mod compressor;
pub mod serializer;
pub mod tamper;

pub use compressor::{Compressor, NoopCompressor, ZstdCompressor};
pub use serializer::{JsonSerializer, Serializer};
pub use tamper::RowFields;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CacheError;

/// The on-disk encoding of a value: whether the payload is compressed and the payload
/// bytes themselves. The anti-tamper hash is computed
/// separately, over row identity and shape fields the codec does not have access to
/// — see [`tamper`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    /// True if `payload` went through the compressor.
    pub compressed: bool,
    /// Serialized, possibly compressed, bytes.
    pub payload: Vec<u8>,
}

/// Combines a [`Serializer`] and a [`Compressor`] into the encode/decode pipeline.
/// Compression only runs when the serialized payload is at least
/// `min_value_length_for_compression` bytes. The anti-tamper hash is the caller's
/// responsibility (it needs row identity fields the codec never sees) — compute it with
/// [`tamper::compute`] over the returned payload's length.
pub struct ValueCodec<S, C> {
    serializer: S,
    compressor: C,
    min_value_length_for_compression: usize,
}

impl<S: Serializer, C: Compressor> ValueCodec<S, C> {
    /// Build a codec from its parts and the configured compression threshold.
    pub fn new(serializer: S, compressor: C, min_value_length_for_compression: usize) -> Self {
        Self { serializer, compressor, min_value_length_for_compression }
    }

    /// Encode a value: serialize, compress if large enough.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<EncodedValue, CacheError> {
        let serialized = self.serializer.serialize(value)?;
        let (compressed, payload) = if serialized.len() >= self.min_value_length_for_compression {
            (true, self.compressor.compress(&serialized)?)
        } else {
            (false, serialized)
        };
        Ok(EncodedValue { compressed, payload })
    }

    /// Decode a value: decompress if needed, deserialize. Callers must verify the
    /// anti-tamper hash themselves before calling this.
    ///
    /// Returns `ReadFailure` on decode error. Callers never see this directly — the
    /// engine absorbs it into an absent `CacheRead`.
    pub fn decode<T: DeserializeOwned>(&self, encoded: &EncodedValue) -> Result<T, CacheError> {
        let serialized = if encoded.compressed {
            self.compressor.decompress(&encoded.payload)?
        } else {
            encoded.payload.clone()
        };
        self.serializer.deserialize(&serialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
    }

    fn codec(threshold: usize) -> ValueCodec<JsonSerializer, ZstdCompressor> {
        ValueCodec::new(JsonSerializer, ZstdCompressor::new(), threshold)
    }

    #[test]
    fn small_values_are_not_compressed() {
        let codec = codec(4096);
        let encoded = codec.encode(&Widget { name: "x".into() }).unwrap();
        assert!(!encoded.compressed);
    }

    #[test]
    fn large_values_are_compressed() {
        let codec = codec(16);
        let encoded = codec.encode(&Widget { name: "x".repeat(200) }).unwrap();
        assert!(encoded.compressed);
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let codec = codec(16);
        let widget = Widget { name: "y".repeat(200) };
        let encoded = codec.encode(&widget).unwrap();
        let decoded: Widget = codec.decode(&encoded).unwrap();
        assert_eq!(widget, decoded);
    }

    #[test]
    fn tampered_payload_fails_to_decode() {
        let codec = codec(4096);
        let mut encoded = codec.encode(&Widget { name: "z".into() }).unwrap();
        encoded.payload[0] ^= 0xFF;
        let err = codec.decode::<Widget>(&encoded).unwrap_err();
        assert!(err.is_read_failure());
    }
}
