//! Anti-tamper integrity hash appended to every encoded value.
//!
//! This is an integrity check, not a security boundary: it catches bytes corrupted in
//! storage or edited out-of-band, it is not a defense against a motivated attacker with
//! write access to the database file. Uses `DefaultHasher` rather than a dedicated
//! fast-hash crate — this is a consistency check within one process's lifetime, not a
//! hash meant to be portable or collision-resistant across versions.

use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// The row fields the hash is computed over: `(partition, key, utc_creation, interval,
/// payload_len)` — identity and shape, not payload content. This catches a row whose
/// identity or timing fields were edited out-of-band independently of its value bytes;
/// it is not a checksum of the payload itself.
///
/// `utc_expiry` is deliberately left out: a sliding or static entry has its expiry moved
/// forward on every successful read, so hashing it would make the stored hash go stale
/// the moment a read extends the deadline, and every following read would fail
/// verification against a value nothing actually tampered with.
pub struct RowFields<'a> {
    /// Partition coordinate.
    pub partition: &'a str,
    /// Key coordinate.
    pub key: &'a str,
    /// Creation instant.
    pub utc_creation: DateTime<Utc>,
    /// Sliding/static interval, zero for timed entries.
    pub interval: Duration,
    /// Length of the stored (post-compression) payload.
    pub payload_len: usize,
}

/// Compute the 64-bit integrity hash for a row's identity and shape fields.
pub fn compute(fields: &RowFields<'_>) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    fields.partition.hash(&mut hasher);
    fields.key.hash(&mut hasher);
    fields.utc_creation.timestamp().hash(&mut hasher);
    fields.interval.as_secs().hash(&mut hasher);
    fields.payload_len.hash(&mut hasher);
    hasher.finish()
}

/// Check `fields` against a previously computed hash.
pub fn verify(fields: &RowFields<'_>, expected: u64) -> bool {
    compute(fields) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(key: &str, payload_len: usize) -> RowFields<'_> {
        RowFields {
            partition: "p",
            key,
            utc_creation: Utc::now(),
            interval: Duration::from_secs(0),
            payload_len,
        }
    }

    #[test]
    fn compute_is_deterministic_within_a_process() {
        assert_eq!(compute(&fields("k", 10)), compute(&fields("k", 10)));
    }

    #[test]
    fn verify_detects_identity_or_shape_tampering() {
        let original = fields("k", 10);
        let hash = compute(&original);
        assert!(verify(&original, hash));
        assert!(!verify(&fields("k2", 10), hash));
        assert!(!verify(&fields("k", 11), hash));
    }

    #[test]
    fn verify_survives_an_expiry_extension() {
        let creation = Utc::now();
        let fields_at_write = RowFields {
            partition: "p",
            key: "k",
            utc_creation: creation,
            interval: Duration::from_secs(60),
            payload_len: 10,
        };
        let hash = compute(&fields_at_write);

        // a later read extends utc_expiry but leaves creation/interval/payload unchanged
        let fields_after_extension = RowFields {
            partition: "p",
            key: "k",
            utc_creation: creation,
            interval: Duration::from_secs(60),
            payload_len: 10,
        };
        assert!(verify(&fields_after_extension, hash));
    }
}
