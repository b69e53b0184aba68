use model::QueryResponse;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use transport::Backend;

use crate::cache::{CacheKey, CacheStore, CachedValue};
use crate::error::{ClassifiedError, MutationError, classify_query_error};
use crate::metrics::Metrics;
use crate::mutation::{Mutation, MutationState};

/// Query mutation controller.
///
/// At most one query is in flight per controller; a submission while one is
/// pending is refused with `AlreadyPending` instead of being queued. While
/// pending, `subscribe_elapsed` yields whole seconds since submission.
pub struct QueryController {
    backend: Arc<dyn Backend>,
    cache: Arc<CacheStore>,
    metrics: Arc<Metrics>,
    mutation: Arc<Mutation<QueryResponse>>,
    current: watch::Sender<Option<Arc<QueryResponse>>>,
    draft: Mutex<String>,
    query_stale_after: Duration,
}

impl QueryController {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<CacheStore>,
        metrics: Arc<Metrics>,
        tick: Duration,
        query_stale_after: Duration,
    ) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            backend,
            cache,
            metrics,
            mutation: Mutation::new("query", Some(tick)),
            current,
            draft: Mutex::new(String::new()),
            query_stale_after,
        }
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        *self.lock_draft() = text.into();
    }

    pub fn draft(&self) -> String {
        self.lock_draft().clone()
    }

    fn lock_draft(&self) -> std::sync::MutexGuard<'_, String> {
        self.draft.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn submit_draft(&self) -> Result<Arc<QueryResponse>, ClassifiedError> {
        let text = self.draft();
        self.submit(&text).await
    }

    /// Submits `text` to the backend. Blank text is rejected without a
    /// network call.
    pub async fn submit(&self, text: &str) -> Result<Arc<QueryResponse>, ClassifiedError> {
        if text.trim().is_empty() {
            let classified = classify_query_error(&MutationError::EmptyQuery);
            self.mutation.reject(classified.clone());
            return Err(classified);
        }

        let token = self
            .mutation
            .begin()
            .map_err(|e| classify_query_error(&e))?;
        info!(request_id = %token.request_id, "Submitting query");

        let result = self.backend.create_query(text).await;
        let elapsed = token.elapsed();
        self.metrics.record_request(result.is_ok());

        match result {
            Ok(response) => {
                let response = Arc::new(response.into_shaped());
                if let Some(id) = &response.id {
                    self.cache.write(
                        CacheKey::Query(id.clone()),
                        CachedValue::Query(Arc::clone(&response)),
                        self.query_stale_after,
                    );
                }
                self.current.send_replace(Some(Arc::clone(&response)));
                self.lock_draft().clear();
                self.metrics.record_query(elapsed);
                info!(
                    request_id = %token.request_id,
                    themes = response.themes.len(),
                    documents = response.document_responses.len(),
                    "Query completed in {:.1} seconds",
                    elapsed.as_secs_f64()
                );
                self.mutation.finish(token, Ok(Arc::clone(&response)));
                Ok(response)
            }
            Err(e) => {
                let classified = classify_query_error(&MutationError::from(e));
                error!(
                    request_id = %token.request_id,
                    kind = %classified.kind,
                    error = %classified.detail,
                    "Query failed after {:.1} seconds",
                    elapsed.as_secs_f64()
                );
                self.mutation.finish(token, Err(classified.clone()));
                Err(classified)
            }
        }
    }

    /// The last successful response. Replaced, never merged.
    pub fn current(&self) -> Option<Arc<QueryResponse>> {
        self.current.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.mutation.is_pending()
    }

    pub fn state(&self) -> MutationState<QueryResponse> {
        self.mutation.state()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.mutation.elapsed_secs()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<QueryResponse>> {
        self.mutation.subscribe()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.mutation.subscribe_elapsed()
    }

    pub fn subscribe_current(&self) -> watch::Receiver<Option<Arc<QueryResponse>>> {
        self.current.subscribe()
    }

    pub fn reset(&self) {
        self.mutation.reset();
    }
}
