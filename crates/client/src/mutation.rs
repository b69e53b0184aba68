use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ClassifiedError, MutationError};
use crate::task::TaskHandle;

/// Lifecycle of a single-flight mutation.
#[derive(Debug, Clone)]
pub enum MutationState<T> {
    Idle,
    Pending { request_id: Uuid, started_at: Instant },
    Succeeded(Arc<T>),
    Failed(ClassifiedError),
}

impl<T> MutationState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            Self::Succeeded(data) => Some(data),
            _ => None,
        }
    }
}

struct Flight {
    request_id: Uuid,
    _ticker: Option<TaskHandle>,
}

/// Issued by `Mutation::begin`. Resolved by `Mutation::finish`; dropping an
/// unresolved token (the caller stopped awaiting) releases the flight and
/// publishes `Idle`.
pub(crate) struct FlightToken<T> {
    mutation: Weak<Mutation<T>>,
    pub(crate) request_id: Uuid,
    pub(crate) started_at: Instant,
    resolved: bool,
}

impl<T> FlightToken<T> {
    pub(crate) fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl<T> Drop for FlightToken<T> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        if let Some(mutation) = self.mutation.upgrade() {
            if mutation.resolve(self.request_id, MutationState::Idle) {
                debug!(
                    operation = mutation.operation,
                    request_id = %self.request_id,
                    "Pending request abandoned by caller"
                );
            }
        }
    }
}

/// Shortest elapsed-signal tick; a zero period would stop the ticker.
const MIN_TICK: Duration = Duration::from_millis(10);

/// State shared by the upload and query controllers: the published
/// `MutationState`, the elapsed-seconds signal and the single-flight guard.
///
/// The elapsed signal is only written while holding the flight lock and
/// only by the ticker of the current flight, so it cannot advance after
/// `finish` has reset it.
pub(crate) struct Mutation<T> {
    operation: &'static str,
    state: watch::Sender<MutationState<T>>,
    elapsed: watch::Sender<u64>,
    active: Mutex<Option<Flight>>,
    tick: Option<Duration>,
}

impl<T> Mutation<T> {
    fn lock(&self) -> MutexGuard<'_, Option<Flight>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ends flight `request_id` with `state`. Returns false when that flight
    /// is no longer current.
    fn resolve(&self, request_id: Uuid, state: MutationState<T>) -> bool {
        let flight = {
            let mut active = self.lock();
            if active.as_ref().map(|f| f.request_id) != Some(request_id) {
                return false;
            }
            let flight = active.take();
            self.elapsed.send_replace(0);
            self.state.send_replace(state);
            flight
        };
        // Dropping the flight aborts its ticker, outside the lock.
        drop(flight);
        true
    }
}

impl<T: Send + Sync + 'static> Mutation<T> {
    pub(crate) fn new(operation: &'static str, tick: Option<Duration>) -> Arc<Self> {
        let (state, _) = watch::channel(MutationState::Idle);
        let (elapsed, _) = watch::channel(0);
        Arc::new(Self {
            operation,
            state,
            elapsed,
            active: Mutex::new(None),
            tick: tick.map(|t| t.max(MIN_TICK)),
        })
    }

    pub(crate) fn begin(self: &Arc<Self>) -> Result<FlightToken<T>, MutationError> {
        let mut active = self.lock();
        if active.is_some() {
            return Err(MutationError::AlreadyPending(self.operation));
        }

        let request_id = Uuid::new_v4();
        let started_at = Instant::now();
        let ticker = self
            .tick
            .map(|tick| self.spawn_ticker(request_id, started_at, tick));
        *active = Some(Flight {
            request_id,
            _ticker: ticker,
        });

        self.elapsed.send_replace(0);
        self.state.send_replace(MutationState::Pending {
            request_id,
            started_at,
        });
        Ok(FlightToken {
            mutation: Arc::downgrade(self),
            request_id,
            started_at,
            resolved: false,
        })
    }

    fn spawn_ticker(self: &Arc<Self>, request_id: Uuid, started_at: Instant, tick: Duration) -> TaskHandle {
        let mutation = Arc::downgrade(self);
        TaskHandle::spawn("elapsed_tick", async move {
            let mut interval = tokio::time::interval_at(started_at + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let Some(mutation) = mutation.upgrade() else {
                    break;
                };
                let still_current = {
                    let active = mutation.lock();
                    match active.as_ref() {
                        Some(flight) if flight.request_id == request_id => {
                            mutation
                                .elapsed
                                .send_replace(started_at.elapsed().as_secs());
                            true
                        }
                        _ => false,
                    }
                };
                if !still_current {
                    break;
                }
            }
        })
    }

    /// Resolves the flight: elapsed drops to zero and the ticker stops.
    pub(crate) fn finish(&self, mut token: FlightToken<T>, outcome: Result<Arc<T>, ClassifiedError>) {
        token.resolved = true;
        let state = match outcome {
            Ok(data) => MutationState::Succeeded(data),
            Err(error) => MutationState::Failed(error),
        };
        self.resolve(token.request_id, state);
    }

    /// Records a locally rejected submission. Ignored while a flight is
    /// pending so the pending state stays visible.
    pub(crate) fn reject(&self, error: ClassifiedError) {
        let active = self.lock();
        if active.is_none() {
            self.state.send_replace(MutationState::Failed(error));
        }
    }

    pub(crate) fn reset(&self) {
        let active = self.lock();
        if active.is_none() {
            self.state.send_replace(MutationState::Idle);
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn state(&self) -> MutationState<T>
    where
        T: Clone,
    {
        self.state.borrow().clone()
    }

    pub(crate) fn elapsed_secs(&self) -> u64 {
        *self.elapsed.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<MutationState<T>> {
        self.state.subscribe()
    }

    pub(crate) fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed.subscribe()
    }
}
