pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod metrics;
mod mutation;
pub mod query;
pub mod retry;
pub mod task;
pub mod upload;

pub use app::App;
pub use cache::{CacheEntry, CacheKey, CacheStats, CacheStore, CachedValue};
pub use config::ClientConfig;
pub use error::{ClassifiedError, ErrorKind, MutationError};
pub use health::HealthMonitor;
pub use lifecycle::{LifecycleView, QueryLifecycle};
pub use metrics::{Metrics, MetricsSnapshot};
pub use mutation::MutationState;
pub use query::QueryController;
pub use upload::{FileSelection, UploadController};
