use model::{HealthStatus, QueryResponse};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::ClassifiedError;
use crate::health::HealthMonitor;
use crate::mutation::MutationState;
use crate::query::QueryController;

/// Elapsed time after which an indeterminate progress bar is shown.
pub const PROGRESS_BAR_AFTER: Duration = Duration::from_secs(20);

/// UI-facing query state.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleView {
    pub pending: bool,
    pub elapsed: Duration,
    #[serde(skip)]
    pub current_response: Option<Arc<QueryResponse>>,
    pub error: Option<ClassifiedError>,
    /// Advisory only; queries may still succeed without the language model.
    pub backend_degraded: bool,
}

impl LifecycleView {
    pub fn progress_message(&self) -> Option<&'static str> {
        self.pending.then(|| progress_message(self.elapsed))
    }

    pub fn show_progress_bar(&self) -> bool {
        self.pending && self.elapsed > PROGRESS_BAR_AFTER
    }

    pub fn show_degraded_warning(&self) -> bool {
        self.backend_degraded
    }
}

pub fn progress_message(elapsed: Duration) -> &'static str {
    match elapsed.as_secs() {
        0..5 => "Processing your query...",
        5..15 => "This may take up to a minute.",
        _ => "Still working... Complex queries can take longer to process.",
    }
}

/// Combines query and health outputs into a `LifecycleView`. No I/O.
pub fn derive(
    state: &MutationState<QueryResponse>,
    elapsed_secs: u64,
    current: Option<Arc<QueryResponse>>,
    health: &HealthStatus,
) -> LifecycleView {
    let pending = state.is_pending();
    LifecycleView {
        pending,
        elapsed: if pending {
            Duration::from_secs(elapsed_secs)
        } else {
            Duration::ZERO
        },
        current_response: current,
        error: state.error().cloned(),
        backend_degraded: !health.llm_available(),
    }
}

/// Watches the query controller and the health monitor and recomputes the
/// view whenever either changes.
pub struct QueryLifecycle {
    state: watch::Receiver<MutationState<QueryResponse>>,
    elapsed: watch::Receiver<u64>,
    current: watch::Receiver<Option<Arc<QueryResponse>>>,
    health: watch::Receiver<HealthStatus>,
}

impl QueryLifecycle {
    pub fn new(queries: &QueryController, health: &HealthMonitor) -> Self {
        Self {
            state: queries.subscribe(),
            elapsed: queries.subscribe_elapsed(),
            current: queries.subscribe_current(),
            health: health.subscribe(),
        }
    }

    /// Current view; marks every input as seen.
    pub fn view(&mut self) -> LifecycleView {
        let state = self.state.borrow_and_update().clone();
        let elapsed = *self.elapsed.borrow_and_update();
        let current = self.current.borrow_and_update().clone();
        let health = *self.health.borrow_and_update();
        derive(&state, elapsed, current, &health)
    }

    /// Waits for any input to change. `None` once the sources are gone.
    pub async fn changed(&mut self) -> Option<LifecycleView> {
        let result = tokio::select! {
            r = self.state.changed() => r,
            r = self.elapsed.changed() => r,
            r = self.current.changed() => r,
            r = self.health.changed() => r,
        };
        result.ok()?;
        Some(self.view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MutationError, classify_query_error};
    use model::SubsystemState;
    use tokio::time::Instant;
    use uuid::Uuid;

    fn healthy() -> HealthStatus {
        HealthStatus {
            mongodb: SubsystemState::Available,
            ollama: SubsystemState::Available,
            chromadb: SubsystemState::Available,
            status: SubsystemState::Available,
        }
    }

    #[test]
    fn test_progress_messages_follow_elapsed() {
        assert_eq!(progress_message(Duration::from_secs(0)), "Processing your query...");
        assert_eq!(progress_message(Duration::from_secs(4)), "Processing your query...");
        assert_eq!(progress_message(Duration::from_secs(5)), "This may take up to a minute.");
        assert_eq!(progress_message(Duration::from_secs(14)), "This may take up to a minute.");
        assert!(progress_message(Duration::from_secs(15)).starts_with("Still working..."));
    }

    #[tokio::test]
    async fn test_pending_view_shows_elapsed_and_bar() {
        let state = MutationState::Pending {
            request_id: Uuid::new_v4(),
            started_at: Instant::now(),
        };
        let view = derive(&state, 21, None, &healthy());

        assert!(view.pending);
        assert_eq!(view.elapsed, Duration::from_secs(21));
        assert!(view.show_progress_bar());
        assert!(view.progress_message().is_some());
        assert!(!view.backend_degraded);
    }

    #[test]
    fn test_resolved_view_ignores_elapsed() {
        let error = classify_query_error(&MutationError::EmptyQuery);
        let view = derive(&MutationState::Failed(error.clone()), 7, None, &healthy());

        assert!(!view.pending);
        assert_eq!(view.elapsed, Duration::ZERO);
        assert_eq!(view.error, Some(error));
        assert_eq!(view.progress_message(), None);
    }

    #[test]
    fn test_degraded_when_llm_not_available() {
        let mut health = healthy();
        health.ollama = SubsystemState::Unavailable;
        let view = derive(&MutationState::Idle, 0, None, &health);
        assert!(view.show_degraded_warning());

        // Before the first probe nothing is known about the model.
        let view = derive(&MutationState::Idle, 0, None, &HealthStatus::default());
        assert!(view.backend_degraded);
    }
}
