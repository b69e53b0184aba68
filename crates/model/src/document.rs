use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A server-processed upload. Only ever built from a server response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub file_type: String,
    pub original_filename: String,
    pub page_count: u32,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub ocr_processed: bool,
    pub file_size: u64,
    #[serde(deserialize_with = "crate::timestamp::deserialize")]
    pub upload_date: DateTime<Utc>,
    #[serde(default, deserialize_with = "crate::timestamp::deserialize_opt")]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
    Other,
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self.file_type.to_ascii_lowercase().as_str() {
            "pdf" => DocumentKind::Pdf,
            "jpg" | "jpeg" | "png" | "tiff" | "tif" | "bmp" => DocumentKind::Image,
            _ => DocumentKind::Other,
        }
    }

    pub fn size_label(&self) -> String {
        format_file_size(self.file_size)
    }

    /// "1 page" / "12 pages"
    pub fn pages_label(&self) -> String {
        if self.page_count == 1 {
            "1 page".to_string()
        } else {
            format!("{} pages", self.page_count)
        }
    }
}

/// Human readable byte count: bytes below 1 KiB, two decimals above.
pub fn format_file_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;

    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    }
}
