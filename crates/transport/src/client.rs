use model::HealthStatus;
use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{EndpointClass, TransportError};
use crate::interceptor::{RequestInterceptor, intercept_failure};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_API_PREFIX: &str = "/api";
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// A file upload as sent to `POST /documents`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    /// Omitted from the form when empty so the server picks a default.
    pub title: Option<String>,
}

impl UploadForm {
    fn into_form(self) -> Result<Form, TransportError> {
        let part = Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        let mut form = Form::new().part("file", part);
        if let Some(title) = self.title.filter(|t| !t.trim().is_empty()) {
            form = form.text("title", title);
        }
        Ok(form)
    }
}

pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(UploadForm),
}

/// HTTP client for the research API: `{base}/api/...` plus `{base}/health`.
///
/// Two reqwest clients are kept so the health probe gets its own, shorter
/// deadline. The client never retries; callers own their retry policy.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    api_prefix: String,
    health_path: String,
    client: reqwest::Client,
    health_client: reqwest::Client,
    request_timeout: Duration,
    health_timeout: Duration,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

pub struct ApiClientBuilder {
    base_url: String,
    api_prefix: String,
    health_path: String,
    request_timeout: Duration,
    health_timeout: Duration,
    interceptors: Vec<Arc<dyn RequestInterceptor>>,
}

impl ApiClientBuilder {
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn build(self) -> Result<ApiClient, TransportError> {
        let client = Self::http_client(self.request_timeout)?;
        let health_client = Self::http_client(self.health_timeout)?;

        Ok(ApiClient {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_prefix: self.api_prefix,
            health_path: self.health_path,
            client,
            health_client,
            request_timeout: self.request_timeout,
            health_timeout: self.health_timeout,
            interceptors: self.interceptors,
        })
    }

    fn http_client(timeout: Duration) -> Result<reqwest::Client, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            request_timeout: Duration::from_secs(60),
            health_timeout: Duration::from_secs(5),
            interceptors: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn health_timeout(&self) -> Duration {
        self.health_timeout
    }

    /// Sends a request to `{base}{api_prefix}{path}` and decodes the JSON reply.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
    ) -> Result<T, TransportError> {
        let url = format!("{}{}{}", self.base_url, self.api_prefix, path);
        self.execute(&self.client, EndpointClass::Api, self.request_timeout, method, url, body)
            .await
    }

    /// `GET {base}/health`, outside the API prefix, on the short deadline.
    pub async fn health(&self) -> Result<HealthStatus, TransportError> {
        let url = format!("{}{}", self.base_url, self.health_path);
        self.execute(
            &self.health_client,
            EndpointClass::Health,
            self.health_timeout,
            Method::GET,
            url,
            RequestBody::Empty,
        )
        .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        client: &reqwest::Client,
        endpoint: EndpointClass,
        timeout: Duration,
        method: Method,
        url: String,
        body: RequestBody,
    ) -> Result<T, TransportError> {
        let mut request = client.request(method.clone(), &url);
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Multipart(upload) => request.multipart(upload.into_form()?),
        };
        for interceptor in &self.interceptors {
            request = interceptor.on_request(request);
        }

        debug!(method = %method, url = %url, "Sending request");

        let response = request.send().await.map_err(|e| {
            let err = TransportError::from_reqwest(e, endpoint, timeout);
            warn!(method = %method, url = %url, error = %err, "Request failed");
            err
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(intercept_failure(status.as_u16(), &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::from_reqwest(e, endpoint, timeout))
    }
}

/// Validates an id before it is spliced into a path.
pub(crate) fn path_segment(id: &str) -> Result<&str, TransportError> {
    if id.is_empty() || id.contains(['/', '?', '#']) {
        return Err(TransportError::InvalidRequest(format!(
            "invalid resource id: {:?}",
            id
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segment_rejects_separators() {
        assert!(path_segment("665f1c").is_ok());
        assert!(path_segment("").is_err());
        assert!(path_segment("a/b").is_err());
        assert!(path_segment("a?b").is_err());
    }

    #[test]
    fn test_builder_trims_base_url() {
        let client = ApiClient::builder("http://localhost:8000/")
            .health_timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.health_timeout(), Duration::from_secs(2));
        assert_eq!(client.request_timeout(), Duration::from_secs(60));
    }
}
