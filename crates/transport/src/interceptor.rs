use model::Subsystem;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{error, warn};

use crate::error::TransportError;

/// Hook applied to every outgoing request before it is sent.
pub trait RequestInterceptor: Send + Sync {
    fn on_request(&self, request: RequestBuilder) -> RequestBuilder;
}

/// Finds a known backend-subsystem signature in a failure message.
pub fn detect_subsystem(detail: &str) -> Option<Subsystem> {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("mongodb") || lower.contains("database service unavailable") {
        Some(Subsystem::MongoDb)
    } else if lower.contains("chroma") {
        Some(Subsystem::ChromaDb)
    } else if lower.contains("ollama") {
        Some(Subsystem::Ollama)
    } else {
        None
    }
}

/// Turns a non-2xx response into a `TransportError`, inspecting the
/// `detail` field the server puts on its error payloads.
pub fn intercept_failure(status: u16, body: &str) -> TransportError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|payload| payload.get("detail").cloned())
        .map(|detail| match detail {
            Value::String(text) => text,
            other => other.to_string(),
        });

    match detail {
        Some(detail) => match detect_subsystem(&detail) {
            Some(subsystem) => {
                error!(
                    subsystem = %subsystem,
                    status = status,
                    detail = %detail,
                    "Backend subsystem failure"
                );
                TransportError::Subsystem {
                    subsystem,
                    status,
                    detail,
                }
            }
            None => TransportError::Server {
                status,
                message: detail,
            },
        },
        None => {
            let trimmed = body.trim();
            let message = if trimmed.is_empty() {
                StatusCode::from_u16(status)
                    .ok()
                    .and_then(|code| code.canonical_reason())
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                trimmed.to_string()
            };
            warn!(status = status, message = %message, "Request failed without detail");
            TransportError::Server { status, message }
        }
    }
}
