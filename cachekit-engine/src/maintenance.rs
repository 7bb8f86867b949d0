//! Background purge scheduling: a per-instance operation counter with a hard
//! threshold and a probabilistic soft trigger, serviced by a single long-lived worker
//! task so purges never block a caller's operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::connection_factory::ConnectionFactory;
use crate::random::Random;
use crate::settings::SettingsHandle;

/// Shared counter plus wakeup signal the worker listens on. Cloned into every
/// `CacheEngine` operation; `record_operation` is the only hot-path cost.
#[derive(Clone)]
pub struct MaintenanceHandle {
    counter: Arc<AtomicU64>,
    notify: Arc<Notify>,
}

impl MaintenanceHandle {
    fn new() -> Self {
        Self { counter: Arc::new(AtomicU64::new(0)), notify: Arc::new(Notify::new()) }
    }

    /// Called once per write and once per sliding-extending read. Rolls the hard
    /// and soft triggers and wakes the worker if either fires; multiple concurrent
    /// triggers coalesce into the worker's next wakeup, they do not queue up.
    pub fn record_operation(&self, settings: &SettingsHandle, random: &dyn Random) {
        let settings = settings.get();
        let count = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let hard = count >= settings.operation_count_before_soft_cleanup;
        let soft = random.int_inclusive(settings.chances_of_auto_cleanup) == 0;
        if hard {
            self.counter.store(0, Ordering::Relaxed);
        }
        if hard || soft {
            self.notify.notify_one();
        }
    }
}

/// Runs until `shutdown` fires, purging expired rows each time it is woken by
/// [`MaintenanceHandle::record_operation`]. One of these runs per `CacheEngine` instance.
pub async fn run<F: ConnectionFactory>(
    factory: Arc<F>,
    clock: Arc<dyn Clock>,
    handle: MaintenanceHandle,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = handle.notify.notified() => {
                let now = clock.now();
                match factory.purge_expired(now).await {
                    Ok(removed) => {
                        if removed > 0 {
                            info!(removed, "purge cycle removed expired rows");
                        } else {
                            debug!("purge cycle found nothing to remove");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "purge cycle failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Build a fresh handle and the shutdown channel its worker listens on.
pub fn handle() -> MaintenanceHandle {
    MaintenanceHandle::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::FixedRandom;
    use crate::settings::Settings;

    #[test]
    fn hard_threshold_resets_counter_and_notifies() {
        let handle = MaintenanceHandle::new();
        let settings = SettingsHandle::new(
            Settings::new().operation_count_before_soft_cleanup(2).chances_of_auto_cleanup(1000),
        );
        let random = FixedRandom(1); // never fires the soft trigger
        handle.record_operation(&settings, &random);
        assert_eq!(handle.counter.load(Ordering::Relaxed), 1);
        handle.record_operation(&settings, &random);
        assert_eq!(handle.counter.load(Ordering::Relaxed), 0, "hard trigger resets the counter");
    }

    #[test]
    fn soft_trigger_does_not_reset_counter() {
        let handle = MaintenanceHandle::new();
        let settings = SettingsHandle::new(
            Settings::new().operation_count_before_soft_cleanup(1000).chances_of_auto_cleanup(10),
        );
        let random = FixedRandom(0); // always fires the soft trigger
        handle.record_operation(&settings, &random);
        assert_eq!(handle.counter.load(Ordering::Relaxed), 1, "soft trigger leaves the counter alone");
    }
}
