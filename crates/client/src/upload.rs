use model::Document;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use transport::{Backend, UploadForm};

use crate::cache::{CacheKey, CacheStore, CachedValue};
use crate::error::{ClassifiedError, MutationError, classify_upload_error};
use crate::metrics::Metrics;
use crate::mutation::{Mutation, MutationState};

/// Extensions the backend can ingest, with the MIME type sent for each.
const ACCEPTED_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
];

/// A file chosen for upload, already read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSelection {
    file_name: String,
    mime: &'static str,
    bytes: Vec<u8>,
}

impl FileSelection {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, MutationError> {
        let file_name = file_name.into();
        let mime = mime_for(&file_name)
            .ok_or_else(|| MutationError::UnsupportedFile(file_name.clone()))?;

        Ok(Self {
            file_name,
            mime,
            bytes,
        })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, MutationError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(MutationError::MissingFile)?;

        // Check the type before reading a possibly large file.
        if mime_for(&file_name).is_none() {
            return Err(MutationError::UnsupportedFile(file_name));
        }

        let bytes = tokio::fs::read(path).await.map_err(|source| MutationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(file_name, bytes)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The file name without its last extension.
    pub fn suggested_title(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => self.file_name.clone(),
        }
    }

    fn into_form(self, title: Option<String>) -> UploadForm {
        UploadForm {
            file_name: self.file_name,
            mime: self.mime.to_string(),
            bytes: self.bytes,
            title: title.filter(|t| !t.trim().is_empty()),
        }
    }
}

fn mime_for(file_name: &str) -> Option<&'static str> {
    let (_, extension) = file_name.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    ACCEPTED_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

#[derive(Default)]
struct Draft {
    selection: Option<FileSelection>,
    title: String,
}

/// Upload mutation controller.
///
/// Holds the locally selected file and title. A successful upload
/// invalidates the document listing and clears the selection. Uploads are
/// never retried.
pub struct UploadController {
    backend: Arc<dyn Backend>,
    cache: Arc<CacheStore>,
    metrics: Arc<Metrics>,
    mutation: Arc<Mutation<Document>>,
    draft: Mutex<Draft>,
    document_stale_after: Duration,
}

impl UploadController {
    pub fn new(
        backend: Arc<dyn Backend>,
        cache: Arc<CacheStore>,
        metrics: Arc<Metrics>,
        document_stale_after: Duration,
    ) -> Self {
        Self {
            backend,
            cache,
            metrics,
            mutation: Mutation::new("upload", None),
            draft: Mutex::new(Draft::default()),
            document_stale_after,
        }
    }

    fn draft(&self) -> std::sync::MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Selects a file and pre-fills the title from its name.
    pub fn select(&self, selection: FileSelection) {
        let mut draft = self.draft();
        draft.title = selection.suggested_title();
        draft.selection = Some(selection);
    }

    pub async fn select_path(&self, path: impl AsRef<Path>) -> Result<(), ClassifiedError> {
        match FileSelection::from_path(path).await {
            Ok(selection) => {
                self.select(selection);
                Ok(())
            }
            Err(e) => {
                let classified = classify_upload_error(&e);
                self.mutation.reject(classified.clone());
                Err(classified)
            }
        }
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.draft().title = title.into();
    }

    pub fn title(&self) -> String {
        self.draft().title.clone()
    }

    /// Name and size of the selected file, if any.
    pub fn selection(&self) -> Option<(String, u64)> {
        self.draft()
            .selection
            .as_ref()
            .map(|s| (s.file_name().to_string(), s.size()))
    }

    pub fn clear_selection(&self) {
        *self.draft() = Draft::default();
    }

    /// Uploads the currently selected file with the current title.
    pub async fn upload_selected(&self) -> Result<Arc<Document>, ClassifiedError> {
        let (selection, title) = {
            let draft = self.draft();
            (draft.selection.clone(), draft.title.clone())
        };
        self.upload(selection, Some(title)).await
    }

    pub async fn upload(
        &self,
        file: Option<FileSelection>,
        title: Option<String>,
    ) -> Result<Arc<Document>, ClassifiedError> {
        let Some(file) = file else {
            let classified = classify_upload_error(&MutationError::MissingFile);
            self.mutation.reject(classified.clone());
            return Err(classified);
        };

        let token = self
            .mutation
            .begin()
            .map_err(|e| classify_upload_error(&e))?;
        let file_name = file.file_name().to_string();
        info!(file = %file_name, size = file.size(), "Uploading document");

        let result = self.backend.upload_document(file.into_form(title)).await;
        let elapsed = token.elapsed();
        self.metrics.record_request(result.is_ok());

        match result {
            Ok(document) => {
                let document = Arc::new(document);
                self.cache.invalidate(&CacheKey::Documents);
                self.cache.write(
                    CacheKey::Document(document.id.clone()),
                    CachedValue::Document(Arc::clone(&document)),
                    self.document_stale_after,
                );
                self.clear_selection();
                self.metrics.record_upload(elapsed);
                info!(
                    id = %document.id,
                    title = %document.title,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Document uploaded"
                );
                self.mutation.finish(token, Ok(Arc::clone(&document)));
                Ok(document)
            }
            Err(e) => {
                let classified = classify_upload_error(&MutationError::from(e));
                error!(file = %file_name, error = %classified.detail, "Upload failed");
                self.mutation.finish(token, Err(classified.clone()));
                Err(classified)
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.mutation.is_pending()
    }

    pub fn state(&self) -> MutationState<Document> {
        self.mutation.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<Document>> {
        self.mutation.subscribe()
    }

    pub fn reset(&self) {
        self.mutation.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_pdf_and_images() {
        for name in ["report.pdf", "scan.JPG", "a.jpeg", "b.png", "c.tiff", "d.tif"] {
            assert!(FileSelection::new(name, vec![1]).is_ok(), "{name}");
        }
        assert_eq!(FileSelection::new("x.PDF", vec![]).unwrap().mime(), "application/pdf");
    }

    #[test]
    fn test_rejects_other_files() {
        for name in ["notes.txt", "archive.pdf.zip", "README"] {
            let err = FileSelection::new(name, vec![1]).unwrap_err();
            assert!(matches!(err, MutationError::UnsupportedFile(_)), "{name}");
            assert_eq!(err.to_string(), "Please upload a valid PDF or image file.");
        }
    }

    #[test]
    fn test_suggested_title_strips_extension() {
        let selection = FileSelection::new("annual.report.pdf", vec![]).unwrap();
        assert_eq!(selection.suggested_title(), "annual.report");

        let selection = FileSelection::new(".png", vec![]).unwrap();
        assert_eq!(selection.suggested_title(), ".png");
    }

    #[test]
    fn test_blank_title_is_dropped_from_form() {
        let selection = FileSelection::new("a.pdf", vec![1, 2]).unwrap();
        let form = selection.clone().into_form(Some("   ".into()));
        assert_eq!(form.title, None);
        assert_eq!(form.mime, "application/pdf");

        let form = selection.into_form(Some("Paper".into()));
        assert_eq!(form.title.as_deref(), Some("Paper"));
    }

    #[tokio::test]
    async fn test_from_path_checks_type_before_reading() {
        let err = FileSelection::from_path("/nonexistent/notes.txt").await.unwrap_err();
        assert!(matches!(err, MutationError::UnsupportedFile(_)));

        let err = FileSelection::from_path("/nonexistent/paper.pdf").await.unwrap_err();
        assert!(matches!(err, MutationError::Io { .. }));
    }
}
