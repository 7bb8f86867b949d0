//! Error taxonomy for cache operations.
//!
//! Every fallible operation in this crate returns a [`CacheError`] drawn from one of six
//! kinds. The kind determines disposition, not the call site: `InvalidArgument` and
//! `ContractViolation` are raised immediately, `WriteFailure`/`Cancelled`/`Capacity` are
//! raised once any retry budget is exhausted, and `ReadFailure` is never raised at all —
//! reads absorb it into an absent `CacheResult` and record it as the engine's last error.

use thiserror::Error;

/// Result alias for fallible cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// The six-kind error taxonomy.
///
/// See the module documentation for how each kind is surfaced to callers.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Malformed or out-of-contract input: null partition/key, too many parent keys, a
    /// null entry in the parent list, a value the serializer cannot round-trip, or
    /// conflicting distributed-cache expiration options.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation was invoked outside the contract the engine was constructed under,
    /// e.g. `Peek` on a factory that declares peek unsupported, or any call after the
    /// engine has been shut down.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// A write could not be durably committed: storage error, codec failure on encode,
    /// or the write-conflict retry budget was exhausted.
    #[error("write failed: {0}")]
    WriteFailure(String),

    /// A read failed due to a storage error or a decode failure (tamper-hash mismatch,
    /// deserialization error). Never raised directly — callers see an absent
    /// `CacheResult` instead; this variant is only recorded as the engine's last error.
    #[error("read failed: {0}")]
    ReadFailure(String),

    /// A cancellation signal was observed before the operation completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The encoded value exceeds `Settings.max_value_size`.
    #[error("value of {size} bytes exceeds MaxValueSize ({limit} bytes)")]
    Capacity {
        /// Encoded size that was rejected.
        size: usize,
        /// The configured ceiling.
        limit: usize,
    },
}

impl CacheError {
    /// Construct an [`CacheError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Construct a [`CacheError::ContractViolation`].
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation(message.into())
    }

    /// Construct a [`CacheError::WriteFailure`].
    pub fn write_failure(message: impl Into<String>) -> Self {
        Self::WriteFailure(message.into())
    }

    /// Construct a [`CacheError::ReadFailure`].
    pub fn read_failure(message: impl Into<String>) -> Self {
        Self::ReadFailure(message.into())
    }

    /// Construct a [`CacheError::Capacity`].
    pub fn capacity(size: usize, limit: usize) -> Self {
        Self::Capacity { size, limit }
    }

    /// Construct a [`CacheError::Cancelled`].
    pub fn cancelled() -> Self {
        Self::Cancelled
    }

    /// True for the kind reads absorb instead of raising.
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::ReadFailure(_))
    }

    /// True for the kind that is retried before being surfaced.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WriteFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_argument_message_round_trips() {
        let err = CacheError::invalid_argument("partition must not be empty");
        assert!(err.to_string().contains("partition must not be empty"));
    }

    #[test]
    fn capacity_error_reports_both_sizes() {
        let err = CacheError::capacity(9_000_000, 8 * 1024 * 1024);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("9000000"));
    }

    #[test]
    fn read_failure_is_absorbed_not_retried() {
        let err = CacheError::read_failure("tamper hash mismatch");
        assert!(err.is_read_failure());
        assert!(!err.is_retryable());
    }

    #[test]
    fn write_failure_is_retryable() {
        assert!(CacheError::write_failure("conflict").is_retryable());
    }
}
