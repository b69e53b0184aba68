use model::HealthStatus;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use transport::Backend;

use crate::cache::{CacheKey, CacheStore, CachedValue};
use crate::config::HealthConfig;
use crate::metrics::{Metrics, TimedOperation};
use crate::retry::RetryPolicy;
use crate::task::TaskHandle;

struct Prober {
    backend: Arc<dyn Backend>,
    metrics: Arc<Metrics>,
    policy: RetryPolicy,
    status: watch::Sender<HealthStatus>,
}

impl Prober {
    async fn probe(&self) -> HealthStatus {
        let timer = TimedOperation::start();
        let result = self
            .policy
            .retry("health_probe", move || async move {
                let attempt = self.backend.health().await;
                self.metrics.record_request(attempt.is_ok());
                attempt
            })
            .await;
        self.metrics.record_probe(timer.elapsed());

        let status = match result {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    attempts = self.policy.max_attempts(),
                    error = %e,
                    "Health probe failed, reporting backend unavailable"
                );
                HealthStatus::unavailable()
            }
        };
        self.publish(status);
        status
    }

    fn publish(&self, status: HealthStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            info!(
                mongodb = %status.mongodb,
                ollama = %status.ollama,
                chromadb = %status.chromadb,
                overall = %status.status,
                "Health status changed"
            );
            *current = status;
            true
        });
    }
}

/// Polls the backend health endpoint and caches the result.
///
/// Never fails: transport errors are retried a fixed number of times and
/// then absorbed into `HealthStatus::unavailable()`.
pub struct HealthMonitor {
    prober: Arc<Prober>,
    cache: Arc<CacheStore>,
    config: HealthConfig,
    poller: Mutex<Option<TaskHandle>>,
}

impl HealthMonitor {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<CacheStore>,
        metrics: Arc<Metrics>,
        config: HealthConfig,
    ) -> Self {
        let (status, _) = watch::channel(HealthStatus::default());
        let policy = RetryPolicy::fixed(config.max_attempts, config.retry_delay());
        Self {
            prober: Arc::new(Prober {
                backend,
                metrics,
                policy,
                status,
            }),
            cache,
            config,
            poller: Mutex::new(None),
        }
    }

    /// One probe cycle, bypassing the cache.
    pub async fn probe(&self) -> HealthStatus {
        self.prober.probe().await
    }

    /// Probes and stores the result under the `health` key.
    pub async fn refresh(&self) -> HealthStatus {
        let status = self.probe().await;
        self.cache.write(
            CacheKey::Health,
            CachedValue::Health(status),
            self.config.stale_after(),
        );
        status
    }

    /// Cached health. Reads within the stale window reuse the last probe.
    pub async fn current(&self) -> HealthStatus {
        let prober = Arc::clone(&self.prober);
        let fetched = self
            .cache
            .fetch(CacheKey::Health, self.config.stale_after(), move || async move {
                Ok(CachedValue::Health(prober.probe().await))
            })
            .await;

        fetched
            .ok()
            .and_then(CachedValue::into_health)
            .unwrap_or_else(HealthStatus::unavailable)
    }

    /// Last published status; all fields `unknown` until the first probe.
    pub fn latest(&self) -> HealthStatus {
        *self.prober.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.prober.status.subscribe()
    }

    /// Starts polling every `poll_interval`, beginning immediately.
    /// Restarting replaces the previous poller.
    pub fn start(&self) {
        let prober = Arc::clone(&self.prober);
        let handle = self.cache.refetch_every(
            CacheKey::Health,
            self.config.poll_interval(),
            self.config.stale_after(),
            move || {
                let prober = Arc::clone(&prober);
                async move { Ok(CachedValue::Health(prober.probe().await)) }
            },
        );
        debug!(
            interval_secs = self.config.poll_interval_secs,
            "Health polling started"
        );
        *self.lock_poller() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(mut handle) = self.lock_poller().take() {
            handle.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_poller()
            .as_ref()
            .is_some_and(TaskHandle::is_running)
    }

    fn lock_poller(&self) -> std::sync::MutexGuard<'_, Option<TaskHandle>> {
        self.poller.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
