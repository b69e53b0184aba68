use serde::Serialize;
use std::fmt;
use thiserror::Error;
use transport::TransportError;

/// Why a mutation could not complete, before classification.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("Please enter a query.")]
    EmptyQuery,

    #[error("Please upload a file.")]
    MissingFile,

    #[error("Please upload a valid PDF or image file.")]
    UnsupportedFile(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("A {0} is already in progress")]
    AlreadyPending(&'static str),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    /// The selected file could not be read locally.
    File,
    Timeout,
    Network,
    Subsystem,
    Server,
}

impl ErrorKind {
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::File => Some("Check that the file exists and is readable, then select it again."),
            Self::Timeout => Some("Try a simpler query or try again later."),
            Self::Network => {
                Some("Check your connection and make sure the backend server is running.")
            }
            Self::Subsystem => {
                Some("A backend service (database, vector store or language model) is unavailable.")
            }
            Self::Validation | Self::Server => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::File => "file",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Subsystem => "subsystem",
            Self::Server => "server",
        };
        f.write_str(name)
    }
}

/// A failure as presented to the user: kind, message and remediation hint.
/// `detail` keeps the raw error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: Option<&'static str>,
    pub detail: String,
}

impl MutationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyQuery
            | Self::MissingFile
            | Self::UnsupportedFile(_)
            | Self::AlreadyPending(_) => ErrorKind::Validation,
            Self::Io { .. } => ErrorKind::File,
            Self::Transport(err) => match err {
                TransportError::Timeout { .. } => ErrorKind::Timeout,
                TransportError::Network(_) => ErrorKind::Network,
                TransportError::Subsystem { .. } => ErrorKind::Subsystem,
                TransportError::Server { .. }
                | TransportError::Decode(_)
                | TransportError::InvalidRequest(_) => ErrorKind::Server,
            },
        }
    }
}

/// Classification for query submissions.
pub fn classify_query_error(err: &MutationError) -> ClassifiedError {
    let kind = err.kind();
    let message = match kind {
        ErrorKind::Validation | ErrorKind::File => err.to_string(),
        ErrorKind::Timeout => "Query timed out. The server is taking too long to respond. \
                               Try a simpler query or try again later."
            .to_string(),
        ErrorKind::Network => "Network error. Please check your connection and make sure \
                               the backend server is running."
            .to_string(),
        ErrorKind::Subsystem | ErrorKind::Server => format!("Query failed: {}", err),
    };

    ClassifiedError {
        kind,
        message,
        hint: kind.hint(),
        detail: err.to_string(),
    }
}

/// Classification for uploads: the raw message is passed through.
pub fn classify_upload_error(err: &MutationError) -> ClassifiedError {
    let kind = err.kind();
    let message = match kind {
        ErrorKind::Validation | ErrorKind::File => err.to_string(),
        _ => format!("Upload failed: {}", err),
    };

    ClassifiedError {
        kind,
        message,
        hint: kind.hint(),
        detail: err.to_string(),
    }
}

/// Message for a failed read of cached server data (document listing).
pub fn describe_read_error(err: &TransportError) -> String {
    match err {
        TransportError::Network(_) => {
            "Cannot connect to the server. Please check if the backend is running.".to_string()
        }
        other => format!("Error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::Subsystem;
    use std::time::Duration;
    use transport::EndpointClass;

    #[test]
    fn test_timeout_suggests_simpler_query() {
        let err = MutationError::from(TransportError::Timeout {
            endpoint: EndpointClass::Api,
            after: Duration::from_secs(60),
        });
        let classified = classify_query_error(&err);

        assert_eq!(classified.kind, ErrorKind::Timeout);
        assert!(classified.message.starts_with("Query timed out."));
        assert!(classified.hint.unwrap().contains("simpler query"));
        assert!(classified.detail.contains("60000ms"));
    }

    #[test]
    fn test_network_suggests_checking_connection() {
        let err = MutationError::from(TransportError::Network("connection refused".into()));
        let classified = classify_query_error(&err);

        assert_eq!(classified.kind, ErrorKind::Network);
        assert!(classified.message.starts_with("Network error."));
    }

    #[test]
    fn test_other_errors_show_raw_message() {
        let err = MutationError::from(TransportError::Subsystem {
            subsystem: Subsystem::MongoDb,
            status: 500,
            detail: "MongoDB Atlas connection error".into(),
        });
        let classified = classify_query_error(&err);

        assert_eq!(classified.kind, ErrorKind::Subsystem);
        assert!(classified.message.starts_with("Query failed: "));
        assert!(classified.message.contains("MongoDB Atlas connection error"));
    }

    #[test]
    fn test_validation_is_passed_through() {
        let classified = classify_query_error(&MutationError::EmptyQuery);

        assert_eq!(classified.kind, ErrorKind::Validation);
        assert_eq!(classified.message, "Please enter a query.");
        assert_eq!(classified.hint, None);
    }

    #[test]
    fn test_upload_keeps_message_unmodified() {
        let err = MutationError::from(TransportError::Server {
            status: 500,
            message: "Error uploading document: disk full".into(),
        });
        let classified = classify_upload_error(&err);

        assert_eq!(
            classified.message,
            "Upload failed: Request failed with status code 500: Error uploading document: disk full"
        );
        assert_eq!(classify_upload_error(&MutationError::MissingFile).message, "Please upload a file.");
    }

    #[test]
    fn test_read_error_messages() {
        let network = describe_read_error(&TransportError::Network("refused".into()));
        assert!(network.starts_with("Cannot connect to the server."));

        let server = describe_read_error(&TransportError::Server {
            status: 500,
            message: "boom".into(),
        });
        assert_eq!(server, "Error: Request failed with status code 500: boom");
    }

    #[test]
    fn test_unreadable_file_has_its_own_kind_and_hint() {
        let err = MutationError::Io {
            path: "/tmp/missing.pdf".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        };
        let classified = classify_upload_error(&err);

        assert_eq!(classified.kind, ErrorKind::File);
        assert!(classified.message.starts_with("Failed to read /tmp/missing.pdf"));
        assert!(classified.hint.unwrap().contains("readable"));
    }
}
