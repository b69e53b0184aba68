pub mod document;
pub mod health;
pub mod response;
mod timestamp;

pub use document::{Document, DocumentKind, format_file_size};
pub use health::{HealthStatus, Subsystem, SubsystemState};
pub use response::{
    Citation, DocumentLabel, DocumentResponse, QueryResponse, Relevance, RelevanceBand, Theme,
};
