//! Value compression capability, gated by
//! `Settings.min_value_length_for_compression`.

use crate::error::CacheError;

/// Compresses and decompresses already-serialized bytes. `CacheEngine` calls this only
/// when the serialized payload meets the configured size threshold.
pub trait Compressor: Send + Sync + 'static {
    /// Compress `bytes`.
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CacheError>;

    /// Decompress `bytes` produced by a matching `compress` call.
    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CacheError>;
}

/// `zstd`-backed `Compressor`, the default for `CacheEngine`.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Build a compressor at `zstd`'s default level.
    pub fn new() -> Self {
        Self { level: zstd::DEFAULT_COMPRESSION_LEVEL }
    }

    /// Build a compressor at an explicit level.
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZstdCompressor {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
        zstd::stream::encode_all(bytes, self.level)
            .map_err(|e| CacheError::write_failure(format!("compression failed: {e}")))
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
        zstd::stream::decode_all(bytes)
            .map_err(|e| CacheError::read_failure(format!("decompression failed: {e}")))
    }
}

/// No-op `Compressor`, useful when callers want the codec pipeline without the
/// compression stage (e.g. values that are already compressed).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
        Ok(bytes.to_vec())
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CacheError> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_compressor_round_trips() {
        let compressor = ZstdCompressor::new();
        let payload = b"hello hello hello hello hello".repeat(50);
        let compressed = compressor.compress(&payload).unwrap();
        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn noop_compressor_is_identity() {
        let compressor = NoopCompressor;
        let payload = b"unchanged".to_vec();
        let compressed = compressor.compress(&payload).unwrap();
        assert_eq!(compressed, payload);
        assert_eq!(compressor.decompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn zstd_decompress_rejects_garbage() {
        let compressor = ZstdCompressor::new();
        assert!(compressor.decompress(b"not zstd").is_err());
    }
}
