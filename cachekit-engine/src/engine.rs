//! `CacheEngine`: the public contract, generic over a [`ConnectionFactory`], a
//! [`Serializer`], and a [`Compressor`] — one concrete type parameterized over its
//! storage, encoding, and compression collaborators, rather than a trait object per
//! dialect.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec::{Compressor, JsonSerializer, Serializer as CacheSerializer, ValueCodec, ZstdCompressor};
use crate::codec::tamper::{self, RowFields};
use crate::connection_factory::{ConnectionFactory, StoredRow};
use crate::error::{CacheError, CacheResult};
use crate::item::{
    validate_coordinate, CacheItem, CacheRead, CacheReadMode, Expiration, ParentKeys,
};
use crate::maintenance::{self, MaintenanceHandle};
use crate::random::{Random, ThreadRandom};
use crate::settings::{Settings, SettingsHandle};

/// Number of times a write retries on conflict before surfacing the error.
const DEFAULT_WRITE_RETRY_BUDGET: u32 = 3;

/// The public contract: `Add`/`Get`/`Peek`/`Contains`/`Remove`/`Count`/`Clear`/
/// `GetItems`/`PeekItems`/`GetOrAdd`/`GetCacheSizeInBytes` and their maintenance
/// plumbing. Construct with [`CacheEngine::new`] or [`CacheEngine::with_capabilities`].
pub struct CacheEngine<F, S = JsonSerializer, C = ZstdCompressor> {
    factory: Arc<F>,
    codec: ValueCodec<S, C>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn Random>,
    settings: SettingsHandle,
    maintenance: MaintenanceHandle,
    last_error: Arc<parking_lot::Mutex<Option<CacheError>>>,
    shutdown: watch::Sender<bool>,
}

impl<F: ConnectionFactory> CacheEngine<F, JsonSerializer, ZstdCompressor> {
    /// Build an engine with the default capability set: `JsonSerializer`,
    /// `ZstdCompressor`, the system clock, and `rand`-backed randomness.
    pub async fn new(factory: F, settings: Settings) -> CacheResult<Self> {
        Self::with_capabilities(
            factory,
            JsonSerializer,
            ZstdCompressor::new(),
            Arc::new(SystemClock),
            Arc::new(ThreadRandom),
            settings,
        )
        .await
    }
}

impl<F: ConnectionFactory, S: CacheSerializer, C: Compressor> CacheEngine<F, S, C> {
    /// Build an engine from explicit capabilities, spawning its background maintenance
    /// worker.
    pub async fn with_capabilities(
        factory: F,
        serializer: S,
        compressor: C,
        clock: Arc<dyn Clock>,
        random: Arc<dyn Random>,
        settings: Settings,
    ) -> CacheResult<Self> {
        let factory = Arc::new(factory);
        factory.ensure_schema().await?;

        let codec = ValueCodec::new(serializer, compressor, settings.min_value_length_for_compression);
        let settings = SettingsHandle::new(settings);
        let maintenance_handle = maintenance::handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(maintenance::run(
            Arc::clone(&factory),
            Arc::clone(&clock),
            maintenance_handle.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            factory,
            codec,
            clock,
            random,
            settings,
            maintenance: maintenance_handle,
            last_error: Arc::new(parking_lot::Mutex::new(None)),
            shutdown: shutdown_tx,
        })
    }

    /// Stop the background maintenance worker. Pending operations on `self` still work;
    /// only the purge cycle stops.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// A handle to the engine's observable settings.
    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// The error from the most recent absorbed read failure, if any.
    pub fn last_error(&self) -> Option<CacheError> {
        self.last_error.lock().clone()
    }

    fn record_last_error(&self, err: CacheError) {
        warn!(error = %err, "absorbing read failure");
        *self.last_error.lock() = Some(err);
    }

    /// Resolve an optional partition against `Settings.default_partition`,
    /// used by callers that allow the caller to omit a partition.
    pub fn resolve_partition<'a>(&self, partition: Option<&'a str>, settings: &'a Settings) -> String {
        partition.map(str::to_string).unwrap_or_else(|| settings.default_partition.clone())
    }

    /// Insert or fully replace the entry at `(partition, key)`.
    #[instrument(skip(self, value, cancel), fields(partition = %partition, key = %key))]
    pub async fn add<T: Serialize + Sync>(
        &self,
        partition: &str,
        key: &str,
        value: &T,
        expiration: Expiration,
        parent_keys: Vec<String>,
        cancel: &CancellationToken,
    ) -> CacheResult<()> {
        validate_coordinate(partition, "partition")?;
        validate_coordinate(key, "key")?;
        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }

        let settings = self.settings.get();
        let parent_keys = ParentKeys::validate(parent_keys, settings.max_parent_key_count_per_item)?;

        let now = self.clock.now();
        let (utc_expiry, interval) = resolve_expiration(expiration, now, settings.static_interval)?;
        if utc_expiry < now {
            return Err(CacheError::invalid_argument("expiration must not be in the past"));
        }

        for parent in parent_keys.as_slice() {
            if !self.factory.contains(partition, parent, now).await? {
                return Err(CacheError::invalid_argument(format!(
                    "parent key '{parent}' does not name a live entry in partition '{partition}'"
                )));
            }
        }

        let encoded = self.codec.encode(value)?;
        if encoded.payload.len() > settings.max_value_size {
            return Err(CacheError::capacity(encoded.payload.len(), settings.max_value_size));
        }

        let tamper_hash = tamper::compute(&RowFields {
            partition,
            key,
            utc_creation: now,
            interval,
            payload_len: encoded.payload.len(),
        });

        let row = StoredRow {
            partition: partition.to_string(),
            key: key.to_string(),
            utc_creation: now,
            utc_expiry,
            interval,
            value_bytes: encoded.payload,
            compressed: encoded.compressed,
            value_kind: String::new(),
            parent_keys: parent_keys.as_slice().to_vec(),
            tamper_hash,
        };

        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }

        self.with_write_retry(cancel, || self.factory.upsert(&row)).await?;
        self.maintenance.record_operation(&self.settings, self.random.as_ref());
        trace!("add committed");
        Ok(())
    }

    /// Read the live entry, extending its expiry if sliding/static.
    #[instrument(skip(self, cancel), fields(partition = %partition, key = %key))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        partition: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> CacheResult<CacheRead<T>> {
        validate_coordinate(partition, "partition")?;
        validate_coordinate(key, "key")?;
        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }

        let now = self.clock.now();
        let row = match self.factory.select_live(partition, key, now).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!("cache miss");
                return Ok(CacheRead::Absent);
            }
            Err(err) => {
                self.record_last_error(err);
                return Ok(CacheRead::Absent);
            }
        };

        self.maintenance.record_operation(&self.settings, self.random.as_ref());
        match self.decode_row::<T>(&row) {
            Ok(value) => {
                debug!("cache hit");
                Ok(CacheRead::Present(value))
            }
            Err(err) => {
                self.record_last_error(err);
                Ok(CacheRead::Absent)
            }
        }
    }

    /// Read the live entry without extending sliding expiry.
    #[instrument(skip(self, cancel), fields(partition = %partition, key = %key))]
    pub async fn peek<T: DeserializeOwned>(
        &self,
        partition: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> CacheResult<CacheRead<T>> {
        validate_coordinate(partition, "partition")?;
        validate_coordinate(key, "key")?;
        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }

        let now = self.clock.now();
        let row = match self.factory.peek(partition, key, now).await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(CacheRead::Absent),
            Err(err) => {
                self.record_last_error(err);
                return Ok(CacheRead::Absent);
            }
        };

        match self.decode_row::<T>(&row) {
            Ok(value) => Ok(CacheRead::Present(value)),
            Err(err) => {
                self.record_last_error(err);
                Ok(CacheRead::Absent)
            }
        }
    }

    /// Existence-and-liveness check.
    pub async fn contains(
        &self,
        partition: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> CacheResult<bool> {
        validate_coordinate(partition, "partition")?;
        validate_coordinate(key, "key")?;
        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }
        let now = self.clock.now();
        self.factory.contains(partition, key, now).await
    }

    /// Delete the entry and cascade to its dependents. Idempotent: removing an absent key
    /// is a no-op, not an error. The delete and the cascade run in the same transaction,
    /// so a crash or a concurrent writer can never observe the primary row gone with its
    /// dependents still live.
    #[instrument(skip(self, cancel), fields(partition = %partition, key = %key))]
    pub async fn remove(
        &self,
        partition: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> CacheResult<()> {
        validate_coordinate(partition, "partition")?;
        validate_coordinate(key, "key")?;
        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }

        let (removed, cascaded) =
            self.with_write_retry(cancel, || self.factory.remove_cascading(partition, key)).await?;
        if removed {
            if cascaded > 0 {
                debug!(cascaded, "removed dependent entries");
            }
            self.maintenance.record_operation(&self.settings, self.random.as_ref());
        }
        Ok(())
    }

    /// Count live entries in `partition` (or every partition if `None`).
    pub async fn count(
        &self,
        partition: Option<&str>,
        mode: CacheReadMode,
        cancel: &CancellationToken,
    ) -> CacheResult<u64> {
        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }
        let now = self.clock.now();
        self.factory.count(partition, mode, now).await
    }

    /// Remove rows in scope per `mode`; returns the number deleted.
    #[instrument(skip(self, cancel))]
    pub async fn clear(
        &self,
        partition: Option<&str>,
        mode: CacheReadMode,
        cancel: &CancellationToken,
    ) -> CacheResult<u64> {
        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }
        let now = self.clock.now();
        let removed = self.with_write_retry(cancel, || self.factory.clear(partition, mode, now)).await?;
        Ok(removed)
    }

    /// Snapshot of every live entry in scope, decoded. Entries that fail
    /// to decode are silently dropped from the snapshot, matching the absorbed-read-
    /// failure rule applied to single-key reads.
    pub async fn get_items<T: DeserializeOwned>(
        &self,
        partition: Option<&str>,
        cancel: &CancellationToken,
    ) -> CacheResult<Vec<CacheItem<T>>> {
        self.list_items(partition, cancel).await
    }

    /// Like [`CacheEngine::get_items`]; kept as a distinct name to mirror `PeekItems`,
    /// since neither variant extends sliding expiry for a whole-scope scan.
    pub async fn peek_items<T: DeserializeOwned>(
        &self,
        partition: Option<&str>,
        cancel: &CancellationToken,
    ) -> CacheResult<Vec<CacheItem<T>>> {
        self.list_items(partition, cancel).await
    }

    async fn list_items<T: DeserializeOwned>(
        &self,
        partition: Option<&str>,
        cancel: &CancellationToken,
    ) -> CacheResult<Vec<CacheItem<T>>> {
        if cancel.is_cancelled() {
            return Err(CacheError::cancelled());
        }
        let now = self.clock.now();
        let rows = self.factory.list_live(partition, now).await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            match self.decode_row::<T>(&row) {
                Ok(value) => items.push(CacheItem {
                    partition: row.partition,
                    key: row.key,
                    value,
                    utc_creation: row.utc_creation,
                    utc_expiry: row.utc_expiry,
                    interval: row.interval,
                    parent_keys: row.parent_keys,
                }),
                Err(err) => self.record_last_error(err),
            }
        }
        Ok(items)
    }

    /// Return the live value if present; otherwise compute it with `value_getter`, Add
    /// it, and return it. Not atomic across engine instances sharing a
    /// database: two concurrent misses may both invoke `value_getter`; the later `Add`
    /// wins the upsert.
    pub async fn get_or_add<T, Fut>(
        &self,
        partition: &str,
        key: &str,
        expiration: Expiration,
        parent_keys: Vec<String>,
        value_getter: impl FnOnce() -> Fut,
        cancel: &CancellationToken,
    ) -> CacheResult<T>
    where
        T: Serialize + DeserializeOwned + Sync,
        Fut: Future<Output = T>,
    {
        if let CacheRead::Present(value) = self.get::<T>(partition, key, cancel).await? {
            return Ok(value);
        }
        let value = value_getter().await;
        self.add(partition, key, &value, expiration, parent_keys, cancel).await?;
        Ok(value)
    }

    /// Estimate of the store's on-disk footprint.
    pub async fn get_cache_size_in_bytes(&self) -> CacheResult<u64> {
        self.factory.size_in_bytes().await
    }

    fn decode_row<T: DeserializeOwned>(&self, row: &StoredRow) -> Result<T, CacheError> {
        let fields = RowFields {
            partition: &row.partition,
            key: &row.key,
            utc_creation: row.utc_creation,
            interval: row.interval,
            payload_len: row.value_bytes.len(),
        };
        if !tamper::verify(&fields, row.tamper_hash) {
            return Err(CacheError::read_failure("anti-tamper hash mismatch"));
        }
        self.codec.decode(&crate::codec::EncodedValue {
            compressed: row.compressed,
            payload: row.value_bytes.clone(),
        })
    }

    /// Retry a write a bounded number of times with jittered backoff on conflict.
    async fn with_write_retry<T, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: impl FnMut() -> Fut,
    ) -> CacheResult<T>
    where
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(CacheError::cancelled());
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < DEFAULT_WRITE_RETRY_BUDGET => {
                    attempt += 1;
                    let backoff = jittered_backoff(attempt, self.random.as_ref());
                    warn!(attempt, ?backoff, error = %err, "retrying write after conflict");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(CacheError::cancelled()),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn jittered_backoff(attempt: u32, random: &dyn Random) -> Duration {
    let base_ms = 10u64.saturating_mul(1u64 << attempt.min(6));
    let jitter_ms = random.int_inclusive(base_ms as u32) as u64;
    Duration::from_millis(base_ms + jitter_ms)
}

fn resolve_expiration(
    expiration: Expiration,
    now: DateTime<Utc>,
    static_interval: Duration,
) -> Result<(DateTime<Utc>, Duration), CacheError> {
    match expiration {
        Expiration::Timed { utc_expiry } => Ok((utc_expiry, Duration::from_secs(0))),
        Expiration::Sliding { interval } => {
            if interval.is_zero() {
                return Err(CacheError::invalid_argument("sliding interval must be greater than zero"));
            }
            let delta = chrono::Duration::from_std(interval)
                .map_err(|e| CacheError::invalid_argument(format!("interval out of range: {e}")))?;
            Ok((now + delta, interval))
        }
        Expiration::Static => {
            let delta = chrono::Duration::from_std(static_interval)
                .map_err(|e| CacheError::invalid_argument(format!("interval out of range: {e}")))?;
            Ok((now + delta, static_interval))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_timed_expiration_keeps_zero_interval() {
        let now = Utc::now();
        let deadline = now + chrono::Duration::seconds(60);
        let (expiry, interval) = resolve_expiration(Expiration::Timed { utc_expiry: deadline }, now, Duration::from_secs(1)).unwrap();
        assert_eq!(expiry, deadline);
        assert!(interval.is_zero());
    }

    #[test]
    fn resolve_sliding_expiration_rejects_zero_interval() {
        let now = Utc::now();
        let err = resolve_expiration(Expiration::Sliding { interval: Duration::from_secs(0) }, now, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument(_)));
    }

    #[test]
    fn resolve_static_expiration_uses_configured_interval() {
        let now = Utc::now();
        let static_interval = Duration::from_secs(3600);
        let (expiry, interval) = resolve_expiration(Expiration::Static, now, static_interval).unwrap();
        assert_eq!(interval, static_interval);
        assert_eq!(expiry, now + chrono::Duration::seconds(3600));
    }

    #[test]
    fn jittered_backoff_grows_with_attempt_and_stays_bounded() {
        let random = crate::random::FixedRandom(0);
        let first = jittered_backoff(1, &random);
        let third = jittered_backoff(3, &random);
        assert!(third > first);
    }
}
