pub mod backend;
pub mod client;
pub mod error;
pub mod interceptor;

pub use backend::Backend;
pub use client::{ApiClient, ApiClientBuilder, RequestBody, UploadForm};
pub use error::{EndpointClass, TransportError};
pub use interceptor::{RequestInterceptor, detect_subsystem, intercept_failure};
