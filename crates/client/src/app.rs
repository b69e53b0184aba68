use anyhow::{Context, Result};
use model::{Document, HealthStatus, QueryResponse};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use transport::{ApiClient, Backend, TransportError};

use crate::cache::{CacheKey, CacheStore, CachedValue};
use crate::config::ClientConfig;
use crate::health::HealthMonitor;
use crate::lifecycle::QueryLifecycle;
use crate::metrics::Metrics;
use crate::query::QueryController;
use crate::upload::UploadController;

/// The client context. Owns the cache, the controllers and the health
/// poller; everything is created here and torn down by `shutdown` or drop.
pub struct App {
    config: ClientConfig,
    backend: Arc<dyn Backend>,
    metrics: Arc<Metrics>,
    cache: Arc<CacheStore>,
    health: HealthMonitor,
    uploads: UploadController,
    queries: QueryController,
}

impl App {
    /// Builds an HTTP-backed context from `config`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = ApiClient::builder(&config.api.base_url)
            .api_prefix(&config.api.api_prefix)
            .health_path(&config.api.health_path)
            .request_timeout(config.api.request_timeout())
            .health_timeout(config.api.health_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        info!(base_url = %client.base_url(), "Research client configured");
        Ok(Self::with_backend(config, Arc::new(client)))
    }

    pub fn with_backend(config: ClientConfig, backend: Arc<dyn Backend>) -> Self {
        let metrics = Metrics::new();
        let cache = CacheStore::new(config.cache.max_entries, Arc::clone(&metrics));

        let health = HealthMonitor::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            config.health.clone(),
        );
        let uploads = UploadController::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            config.cache.documents_stale_after(),
        );
        let queries = QueryController::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            config.progress.tick(),
            config.cache.query_stale_after(),
        );

        Self {
            config,
            backend,
            metrics,
            cache,
            health,
            uploads,
            queries,
        }
    }

    /// Starts background health polling.
    pub fn start(&self) {
        self.health.start();
    }

    pub fn shutdown(&self) {
        self.health.stop();
        self.cache.clear();
        info!("Research client shut down");
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn uploads(&self) -> &UploadController {
        &self.uploads
    }

    pub fn queries(&self) -> &QueryController {
        &self.queries
    }

    pub fn lifecycle(&self) -> QueryLifecycle {
        QueryLifecycle::new(&self.queries, &self.health)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub async fn current_health(&self) -> HealthStatus {
        self.health.current().await
    }

    /// Document listing, stale-while-revalidate.
    pub async fn documents(&self) -> Result<Arc<Vec<Document>>, TransportError> {
        let value = self
            .cached(
                CacheKey::Documents,
                self.config.cache.documents_stale_after(),
                |backend| async move {
                    backend
                        .list_documents()
                        .await
                        .map(|docs| CachedValue::Documents(Arc::new(docs)))
                },
            )
            .await?;
        value.into_documents().ok_or_else(|| mismatched("documents"))
    }

    pub async fn document(&self, id: &str) -> Result<Arc<Document>, TransportError> {
        let owned = id.to_string();
        let value = self
            .cached(
                CacheKey::Document(owned.clone()),
                self.config.cache.documents_stale_after(),
                move |backend| async move {
                    backend
                        .get_document(&owned)
                        .await
                        .map(|doc| CachedValue::Document(Arc::new(doc)))
                },
            )
            .await?;
        value.into_document().ok_or_else(|| mismatched("document"))
    }

    /// A stored query response, shaped for presentation.
    pub async fn query(&self, id: &str) -> Result<Arc<QueryResponse>, TransportError> {
        let owned = id.to_string();
        let value = self
            .cached(
                CacheKey::Query(owned.clone()),
                self.config.cache.query_stale_after(),
                move |backend| async move {
                    backend
                        .get_query(&owned)
                        .await
                        .map(|resp| CachedValue::Query(Arc::new(resp.into_shaped())))
                },
            )
            .await?;
        value.into_query().ok_or_else(|| mismatched("query"))
    }

    async fn cached<F, Fut>(
        &self,
        key: CacheKey,
        stale_after: Duration,
        fetch: F,
    ) -> Result<CachedValue, TransportError>
    where
        F: FnOnce(Arc<dyn Backend>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<CachedValue, TransportError>> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let metrics = Arc::clone(&self.metrics);
        self.cache
            .fetch(key, stale_after, move || async move {
                let result = fetch(backend).await;
                metrics.record_request(result.is_ok());
                result
            })
            .await
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.health.stop();
    }
}

fn mismatched(expected: &str) -> TransportError {
    TransportError::Decode(format!("cache entry is not a {expected}"))
}
