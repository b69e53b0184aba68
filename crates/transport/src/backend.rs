use async_trait::async_trait;
use model::{Document, HealthStatus, QueryResponse};
use reqwest::Method;
use serde_json::json;

use crate::client::{ApiClient, RequestBody, UploadForm, path_segment};
use crate::error::TransportError;

/// The remote analysis service as the client core sees it.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, TransportError>;

    async fn upload_document(&self, upload: UploadForm) -> Result<Document, TransportError>;

    async fn list_documents(&self) -> Result<Vec<Document>, TransportError>;

    async fn get_document(&self, id: &str) -> Result<Document, TransportError>;

    async fn create_query(&self, text: &str) -> Result<QueryResponse, TransportError>;

    async fn get_query(&self, id: &str) -> Result<QueryResponse, TransportError>;
}

#[async_trait]
impl Backend for ApiClient {
    async fn health(&self) -> Result<HealthStatus, TransportError> {
        ApiClient::health(self).await
    }

    async fn upload_document(&self, upload: UploadForm) -> Result<Document, TransportError> {
        self.send(Method::POST, "/documents", RequestBody::Multipart(upload))
            .await
    }

    async fn list_documents(&self) -> Result<Vec<Document>, TransportError> {
        self.send(Method::GET, "/documents", RequestBody::Empty).await
    }

    async fn get_document(&self, id: &str) -> Result<Document, TransportError> {
        let path = format!("/documents/{}", path_segment(id)?);
        self.send(Method::GET, &path, RequestBody::Empty).await
    }

    async fn create_query(&self, text: &str) -> Result<QueryResponse, TransportError> {
        self.send(
            Method::POST,
            "/queries",
            RequestBody::Json(json!({ "text": text })),
        )
        .await
    }

    async fn get_query(&self, id: &str) -> Result<QueryResponse, TransportError> {
        let path = format!("/queries/{}", path_segment(id)?);
        self.send(Method::GET, &path, RequestBody::Empty).await
    }
}
