#![allow(dead_code)]

use async_trait::async_trait;
use model::{Document, HealthStatus, QueryResponse, SubsystemState};
use serde_json::json;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use transport::{Backend, TransportError, UploadForm};

/// In-process backend with scripted answers and call counters.
pub struct ScriptedBackend {
    pub health: Mutex<HealthStatus>,
    /// The next N health calls fail with a network error.
    pub health_failures: AtomicUsize,
    pub documents: Mutex<Vec<Document>>,
    pub query_delay: Duration,
    pub upload_delay: Duration,
    pub query_response: Mutex<QueryResponse>,
    /// Taken by the next query call.
    pub query_error: Mutex<Option<TransportError>>,

    pub health_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            health: Mutex::new(healthy()),
            health_failures: AtomicUsize::new(0),
            documents: Mutex::new(vec![document("doc1", "Annual Report"), document("doc2", "Audit Notes")]),
            query_delay: Duration::from_secs(2),
            upload_delay: Duration::ZERO,
            query_response: Mutex::new(findings_response()),
            query_error: Mutex::new(None),
            health_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = delay;
        self
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn health(&self) -> Result<HealthStatus, TransportError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .health_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Network("connection refused".into()));
        }
        Ok(*self.health.lock().unwrap())
    }

    async fn upload_document(&self, upload: UploadForm) -> Result<Document, TransportError> {
        let n = self.upload_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.upload_delay).await;
        let title = upload
            .title
            .unwrap_or_else(|| upload.file_name.trim_end_matches(".pdf").to_string());
        let doc = document(&format!("uploaded-{n}"), &title);
        self.documents.lock().unwrap().push(doc.clone());
        Ok(doc)
    }

    async fn list_documents(&self) -> Result<Vec<Document>, TransportError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.documents.lock().unwrap().clone())
    }

    async fn get_document(&self, id: &str) -> Result<Document, TransportError> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| TransportError::Server {
                status: 404,
                message: "Document not found".into(),
            })
    }

    async fn create_query(&self, text: &str) -> Result<QueryResponse, TransportError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.query_delay).await;

        let error = self.query_error.lock().unwrap().take();
        if let Some(error) = error {
            return Err(error);
        }
        let mut response = self.query_response.lock().unwrap().clone();
        response.query_text = text.to_string();
        Ok(response)
    }

    async fn get_query(&self, id: &str) -> Result<QueryResponse, TransportError> {
        let response = self.query_response.lock().unwrap().clone();
        match response.id.as_deref() {
            Some(known) if known == id => Ok(response),
            _ => Err(TransportError::Server {
                status: 404,
                message: "Query not found".into(),
            }),
        }
    }
}

pub fn healthy() -> HealthStatus {
    HealthStatus {
        mongodb: SubsystemState::Available,
        ollama: SubsystemState::Available,
        chromadb: SubsystemState::Available,
        status: SubsystemState::Available,
    }
}

pub fn document(id: &str, title: &str) -> Document {
    serde_json::from_value(json!({
        "id": id,
        "title": title,
        "file_type": "pdf",
        "original_filename": format!("{title}.pdf"),
        "page_count": 3,
        "processed": true,
        "ocr_processed": false,
        "file_size": 2048,
        "upload_date": "2024-05-01T10:00:00",
    }))
    .unwrap()
}

pub fn findings_response() -> QueryResponse {
    serde_json::from_value(json!({
        "id": "q-1",
        "query_text": "",
        "themes": [{
            "theme_name": "Revenue growth",
            "description": "Both documents report growth.",
            "document_ids": ["doc1", "doc2"],
            "supporting_evidence": ["Revenue rose 12%"]
        }],
        "document_responses": [
            {
                "document_id": "doc1",
                "document_title": "Annual Report",
                "extracted_answer": "Revenue rose 12%.",
                "citations": [{"page_number": 2, "paragraph": 1, "relevance_score": 0.91}]
            },
            {
                "document_id": "doc2",
                "document_title": "Audit Notes",
                "extracted_answer": "Growth confirmed.",
                "citations": [{"page_number": 5, "relevance_score": null}]
            }
        ],
        "created_at": "2024-05-01T10:05:00"
    }))
    .unwrap()
}
