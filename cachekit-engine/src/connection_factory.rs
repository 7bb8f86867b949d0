//! The dialect boundary: a narrow, storage-agnostic surface `CacheEngine`
//! consumes for every database interaction. An implementation owns connection pooling,
//! schema creation, and the SQL/command text for each operation; the engine only knows
//! this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::CacheError;
use crate::item::CacheReadMode;

/// The row shape persisted at rest: one row per `(partition, key)`, with a
/// fixed-width parent-key column set bounded by `Settings.max_parent_key_count_per_item`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    /// Partition coordinate.
    pub partition: String,
    /// Key coordinate.
    pub key: String,
    /// Creation instant, preserved across upserts.
    pub utc_creation: DateTime<Utc>,
    /// Current (possibly just-extended) expiry deadline.
    pub utc_expiry: DateTime<Utc>,
    /// Sliding/static interval; zero for timed entries.
    pub interval: Duration,
    /// Encoded value bytes (post-codec).
    pub value_bytes: Vec<u8>,
    /// Whether `value_bytes` is compressor-wrapped.
    pub compressed: bool,
    /// Opaque decoder hint; empty when the default serializer is used.
    pub value_kind: String,
    /// Parent keys recorded against this entry, in the same partition.
    pub parent_keys: Vec<String>,
    /// Anti-tamper integrity hash.
    pub tamper_hash: u64,
}

/// Supplies connections and dialect-specific command execution for every operation
/// `CacheEngine` performs: upsert, select-live, peek, delete, cascade, purge, clear,
/// count, contains, plus schema bootstrap.
///
/// Implementations must tolerate concurrent schema presence (`IF NOT EXISTS` semantics)
/// and wrap every multi-statement operation in a transaction at READ COMMITTED or
/// stronger isolation.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create the `entries` table and its indexes if they do not already exist.
    async fn ensure_schema(&self) -> Result<(), CacheError>;

    /// Insert or fully replace the row at `(row.partition, row.key)`. Must be
    /// atomic: an existing row with the same coordinates is replaced wholesale,
    /// including its parent-key set.
    async fn upsert(&self, row: &StoredRow) -> Result<(), CacheError>;

    /// Read the live row at `(partition, key)`, atomically extending `utc_expiry` to
    /// `now + interval` when `interval > 0`. Returns `Ok(None)` if the
    /// row is absent or expired.
    async fn select_live(
        &self,
        partition: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredRow>, CacheError>;

    /// Read the live row at `(partition, key)` without extending its expiry.
    async fn peek(
        &self,
        partition: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredRow>, CacheError>;

    /// Existence-and-liveness check without decoding or extending.
    async fn contains(
        &self,
        partition: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CacheError>;

    /// Delete the row at `(partition, key)`. Returns `true` if a row was removed.
    /// Idempotent: deleting an absent key returns `false`, not an error.
    async fn delete(&self, partition: &str, key: &str) -> Result<bool, CacheError>;

    /// Delete every row in `partition` whose parent-key columns name `key`, transitively
    ///. Returns the number of rows removed. Must be computed and applied in the
    /// same transaction as the triggering `delete`/`purge` via a recursive query over the
    /// parent-key columns.
    async fn cascade_dependents(&self, partition: &str, key: &str) -> Result<u64, CacheError>;

    /// Delete the row at `(partition, key)` and cascade to its transitive dependents, in a
    /// single transaction. Returns `(row_was_present, dependents_removed)`; when the row
    /// was absent, `dependents_removed` is always `0` and no cascade runs. This is the
    /// atomic counterpart to calling `delete` then `cascade_dependents` separately — a
    /// caller that needs crash-safety between the two must use this instead.
    async fn remove_cascading(&self, partition: &str, key: &str) -> Result<(bool, u64), CacheError>;

    /// Delete every row with `utc_expiry < now`, across all partitions. Runs on
    /// the background maintenance worker, never inline with a caller's operation.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CacheError>;

    /// Remove rows in `partition` (or every partition if `None`) per `mode`.
    /// `IgnoreExpiryDate` truncates the scope unconditionally; `ConsiderExpiryDate`
    /// deletes only expired rows in the scope. Returns the number of rows deleted.
    async fn clear(
        &self,
        partition: Option<&str>,
        mode: CacheReadMode,
        now: DateTime<Utc>,
    ) -> Result<u64, CacheError>;

    /// Count rows in `partition` (or every partition if `None`) visible under `mode`.
    async fn count(
        &self,
        partition: Option<&str>,
        mode: CacheReadMode,
        now: DateTime<Utc>,
    ) -> Result<u64, CacheError>;

    /// Snapshot every live row in `partition` (or every partition if `None`), for
    /// `GetItems`/`PeekItems`. Does not extend sliding expiry.
    async fn list_live(
        &self,
        partition: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredRow>, CacheError>;

    /// Estimate the on-disk footprint of the store.
    async fn size_in_bytes(&self) -> Result<u64, CacheError>;
}
