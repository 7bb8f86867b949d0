//! The in-database item model and the read-side present/absent sum type.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::CacheError;

/// Reserved partition the distributed-cache adapter maps its flat namespace into.
pub const DISTRIBUTED_CACHE_PARTITION: &str = "__distributedCache__";

/// The three lifetime policies. `Static` is a distinct variant only at this API
/// boundary — structurally it is stored and extended exactly like `Sliding` with
/// `interval = Settings.static_interval` (Open Question 1, resolved in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeKind {
    /// `interval = 0`; `utc_expiry` is fixed, reads never extend it.
    Timed,
    /// `interval > 0`; a successful read extends `utc_expiry := now + interval`.
    Sliding,
    /// Sliding with `interval = Settings.static_interval`.
    Static,
}

/// How a caller specifies an entry's lifetime at `Add` time.
#[derive(Debug, Clone)]
pub enum Expiration {
    /// A fixed deadline; produces a `Timed` entry with `interval = 0`.
    Timed {
        /// Absolute deadline. Must be `>= now`.
        utc_expiry: DateTime<Utc>,
    },
    /// A sliding window; produces a `Sliding` entry.
    Sliding {
        /// Extension applied on every successful read.
        interval: Duration,
    },
    /// `Sliding` with `interval = Settings.static_interval`.
    Static,
}

/// `CacheReadMode` toggles whether expired-but-not-yet-purged rows are visible to
/// `Count`/`Clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheReadMode {
    /// Only rows with `utc_expiry >= now` are visible.
    ConsiderExpiryDate,
    /// All rows are visible, including expired ones awaiting purge.
    IgnoreExpiryDate,
}

/// Parent keys recorded against an entry, bounded by `Settings.max_parent_key_count_per_item`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentKeys(Vec<String>);

impl ParentKeys {
    /// Empty parent-key set.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Validate and wrap a caller-supplied parent-key list.
    pub fn validate(keys: Vec<String>, max_count: usize) -> Result<Self, CacheError> {
        if keys.len() > max_count {
            return Err(CacheError::invalid_argument(format!(
                "{} parent keys exceeds MaxParentKeyCountPerItem ({max_count})",
                keys.len()
            )));
        }
        for k in &keys {
            if k.is_empty() {
                return Err(CacheError::invalid_argument(
                    "parent key list must not contain an empty key",
                ));
            }
        }
        Ok(Self(keys))
    }

    /// Borrow the underlying keys.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// True if no parent keys are recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A present/absent sum returned by `Get`/`Peek` — the crate's `CacheResult` in the
/// glossary sense (named `CacheRead` here to avoid colliding with
/// [`crate::error::CacheResult`], the fallible-operation `Result` alias).
#[derive(Debug, Clone)]
pub enum CacheRead<T> {
    /// The entry was live and decoded successfully.
    Present(T),
    /// The entry did not exist, was expired, or failed to decode. Decode and
    /// read-storage failures are absorbed here, never raised.
    Absent,
}

impl<T> CacheRead<T> {
    /// True if this is `Present`.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// True if this is `Absent`.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Convert to `Option<T>`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

/// A decoded cache entry, returned by `GetItems`/`PeekItems` as a snapshot
/// projection. Parent keys are a defensive copy: the snapshot must not change underneath
/// a caller if the underlying entry is later mutated.
#[derive(Debug, Clone)]
pub struct CacheItem<T> {
    /// Partition coordinate.
    pub partition: String,
    /// Key coordinate.
    pub key: String,
    /// Decoded value.
    pub value: T,
    /// Creation instant; preserved across upserts.
    pub utc_creation: DateTime<Utc>,
    /// Absolute expiry deadline.
    pub utc_expiry: DateTime<Utc>,
    /// `0` for timed entries; `> 0` for sliding/static.
    pub interval: Duration,
    /// Defensive copy of the entry's parent keys.
    pub parent_keys: Vec<String>,
}

impl<T> CacheItem<T> {
    /// The structural lifetime kind inferred from `interval`.
    pub fn structural_kind(&self) -> LifetimeKind {
        if self.interval.is_zero() {
            LifetimeKind::Timed
        } else {
            LifetimeKind::Sliding
        }
    }

    /// True iff `now <= utc_expiry`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now <= self.utc_expiry
    }
}

/// Validate a partition or key coordinate: non-empty.
pub fn validate_coordinate(value: &str, field: &str) -> Result<(), CacheError> {
    if value.is_empty() {
        return Err(CacheError::invalid_argument(format!("{field} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_keys_reject_too_many() {
        let keys = vec!["a".into(), "b".into(), "c".into()];
        let err = ParentKeys::validate(keys, 2).unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument(_)));
    }

    #[test]
    fn parent_keys_reject_empty_entry() {
        let keys = vec!["a".into(), String::new()];
        let err = ParentKeys::validate(keys, 5).unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument(_)));
    }

    #[test]
    fn parent_keys_accept_within_bound() {
        let keys = vec!["a".into(), "b".into()];
        let parsed = ParentKeys::validate(keys.clone(), 5).unwrap();
        assert_eq!(parsed.as_slice(), &keys[..]);
    }

    #[test]
    fn cache_read_converts_to_option() {
        assert_eq!(CacheRead::Present(7).into_option(), Some(7));
        assert_eq!(CacheRead::<i32>::Absent.into_option(), None);
    }

    #[test]
    fn structural_kind_is_timed_only_when_interval_is_zero() {
        let base = CacheItem {
            partition: "p".into(),
            key: "k".into(),
            value: (),
            utc_creation: Utc::now(),
            utc_expiry: Utc::now(),
            interval: Duration::from_secs(0),
            parent_keys: vec![],
        };
        assert_eq!(base.structural_kind(), LifetimeKind::Timed);
        let sliding = CacheItem { interval: Duration::from_secs(60), ..base };
        assert_eq!(sliding.structural_kind(), LifetimeKind::Sliding);
    }

    #[test]
    fn coordinate_validation_rejects_empty() {
        assert!(validate_coordinate("", "partition").is_err());
        assert!(validate_coordinate("p", "partition").is_ok());
    }
}
