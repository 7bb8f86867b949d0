//! Typed, mutable configuration with change notifications.

use std::time::Duration;
use tokio::sync::watch;

/// Typed configuration for a [`CacheEngine`][crate::engine::CacheEngine].
///
/// Settings are mutated in place through
/// [`SettingsHandle::update`]; each mutation fires a change notification on the
/// handle's `watch` channel so subscribers (logging, prepared-statement invalidation)
/// can react without polling.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Partition used when the caller does not name one.
    pub default_partition: String,
    /// Interval used by a `static` Add.
    pub static_interval: Duration,
    /// Values shorter than this are stored uncompressed.
    pub min_value_length_for_compression: usize,
    /// Cap on parent keys per entry, enforced at Add.
    pub max_parent_key_count_per_item: usize,
    /// Purge cadence: hard trigger after this many operations.
    pub operation_count_before_soft_cleanup: u64,
    /// Probabilistic trigger: 1-in-N chance of a purge per operation.
    pub chances_of_auto_cleanup: u32,
    /// Default expiration for the distributed-cache adapter when the caller sets
    /// neither a sliding nor an absolute expiration.
    pub default_distributed_cache_absolute_expiration: Duration,
    /// Ceiling on encoded value size, enforced at Add.
    pub max_value_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_partition: "__default__".to_string(),
            static_interval: Duration::from_secs(30 * 24 * 3600),
            min_value_length_for_compression: 4096,
            max_parent_key_count_per_item: 5,
            operation_count_before_soft_cleanup: 1000,
            chances_of_auto_cleanup: 10,
            default_distributed_cache_absolute_expiration: Duration::from_secs(20 * 60),
            max_value_size: 8 * 1024 * 1024,
        }
    }
}

impl Settings {
    /// Start from defaults; use the builder methods to override individual fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `default_partition`.
    pub fn default_partition(mut self, partition: impl Into<String>) -> Self {
        self.default_partition = partition.into();
        self
    }

    /// Override `static_interval`.
    pub fn static_interval(mut self, interval: Duration) -> Self {
        self.static_interval = interval;
        self
    }

    /// Override `min_value_length_for_compression`.
    pub fn min_value_length_for_compression(mut self, bytes: usize) -> Self {
        self.min_value_length_for_compression = bytes;
        self
    }

    /// Override `max_parent_key_count_per_item`.
    pub fn max_parent_key_count_per_item(mut self, count: usize) -> Self {
        self.max_parent_key_count_per_item = count;
        self
    }

    /// Override `operation_count_before_soft_cleanup`.
    pub fn operation_count_before_soft_cleanup(mut self, count: u64) -> Self {
        self.operation_count_before_soft_cleanup = count;
        self
    }

    /// Override `chances_of_auto_cleanup`.
    pub fn chances_of_auto_cleanup(mut self, chances: u32) -> Self {
        self.chances_of_auto_cleanup = chances;
        self
    }

    /// Override `default_distributed_cache_absolute_expiration`.
    pub fn default_distributed_cache_absolute_expiration(mut self, duration: Duration) -> Self {
        self.default_distributed_cache_absolute_expiration = duration;
        self
    }

    /// Override `max_value_size`.
    pub fn max_value_size(mut self, bytes: usize) -> Self {
        self.max_value_size = bytes;
        self
    }

    /// Load overrides from the environment: `MaxCacheSize` for `max_value_size`, plus one
    /// `CACHEKIT_<FIELD>` variable per other setting (upper snake case). Connection-level
    /// configuration such as the database file path belongs to the storage backend's own
    /// config type, not here. Unset keys keep their current value.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(max_size) = std::env::var("MaxCacheSize") {
            if let Ok(bytes) = max_size.parse() {
                self.max_value_size = bytes;
            }
        }
        if let Ok(interval) = std::env::var("CACHEKIT_STATIC_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse() {
                self.static_interval = Duration::from_secs(secs);
            }
        }
        self
    }
}

/// A shared, observable [`Settings`] instance.
///
/// Mutation goes through `update`, which swaps the value behind the watch channel's
/// sender and notifies every receiver.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<Settings>,
}

impl SettingsHandle {
    /// Wrap a `Settings` value for sharing and observation.
    pub fn new(settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(settings);
        Self { tx }
    }

    /// Current snapshot of the settings.
    pub fn get(&self) -> Settings {
        self.tx.borrow().clone()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Apply a mutation and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        self.tx.send_modify(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let settings = Settings::default();
        assert_eq!(settings.default_partition, "__default__");
        assert_eq!(settings.static_interval, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(settings.min_value_length_for_compression, 4096);
        assert_eq!(settings.max_parent_key_count_per_item, 5);
        assert_eq!(settings.operation_count_before_soft_cleanup, 1000);
        assert_eq!(settings.chances_of_auto_cleanup, 10);
        assert_eq!(
            settings.default_distributed_cache_absolute_expiration,
            Duration::from_secs(20 * 60)
        );
        assert_eq!(settings.max_value_size, 8 * 1024 * 1024);
    }

    #[test]
    fn builder_overrides_apply() {
        let settings = Settings::new()
            .default_partition("tenant-a")
            .max_parent_key_count_per_item(2);
        assert_eq!(settings.default_partition, "tenant-a");
        assert_eq!(settings.max_parent_key_count_per_item, 2);
    }

    #[test]
    fn handle_notifies_subscribers_on_update() {
        let handle = SettingsHandle::new(Settings::default());
        let rx = handle.subscribe();
        handle.update(|s| s.max_value_size = 1024);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow().max_value_size, 1024);
    }
}
