use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Theme name the server uses when only one document contributed.
pub const SINGLE_DOCUMENT_THEME: &str = "Single Document";

/// Treats an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub document_title: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub paragraph: Option<u32>,
    #[serde(default)]
    pub sentence: Option<String>,
    #[serde(default)]
    pub relevance_score: Option<f32>,
}

impl Citation {
    pub fn relevance(&self) -> Relevance {
        match self.relevance_score {
            Some(score) => Relevance::Scored(score),
            None => Relevance::Unknown,
        }
    }

    pub fn page_label(&self) -> String {
        label_or_unknown(self.page_number)
    }

    pub fn paragraph_label(&self) -> String {
        label_or_unknown(self.paragraph)
    }

    pub fn sentence_text(&self) -> &str {
        self.sentence.as_deref().unwrap_or(Relevance::UNKNOWN)
    }

    fn clamp(&mut self) {
        self.relevance_score = self
            .relevance_score
            .filter(|score| !score.is_nan())
            .map(|score| score.clamp(0.0, 1.0));
    }
}

fn label_or_unknown(value: Option<u32>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| Relevance::UNKNOWN.to_string())
}

/// Advisory relevance. `Scored(0.0)` is a real, low score and is kept
/// distinct from a score that was never computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Relevance {
    Scored(f32),
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceBand {
    High,
    Medium,
    Low,
}

impl Relevance {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn percent(&self) -> Option<u32> {
        match self {
            Self::Scored(score) => Some((score * 100.0).round() as u32),
            Self::Unknown => None,
        }
    }

    pub fn band(&self) -> Option<RelevanceBand> {
        match *self {
            Self::Scored(score) if score > 0.8 => Some(RelevanceBand::High),
            Self::Scored(score) if score > 0.5 => Some(RelevanceBand::Medium),
            Self::Scored(_) => Some(RelevanceBand::Low),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(percent) => write!(f, "{}%", percent),
            None => f.write_str(Self::UNKNOWN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub theme_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub document_ids: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub supporting_evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub document_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub document_title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub extracted_answer: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub citations: Vec<Citation>,
}

/// The completed answer to a query. Replaced wholesale on every new
/// submission, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub query_text: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub themes: Vec<Theme>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub document_responses: Vec<DocumentResponse>,
    #[serde(default, deserialize_with = "crate::timestamp::deserialize_opt")]
    pub created_at: Option<DateTime<Utc>>,
}

/// How a theme's document reference should be displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLabel<'a> {
    Titled(&'a str),
    /// The id did not resolve against `document_responses`.
    Raw(&'a str),
}

impl DocumentLabel<'_> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Titled(_))
    }
}

impl fmt::Display for DocumentLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Titled(text) | Self::Raw(text) => f.write_str(text),
        }
    }
}

impl QueryResponse {
    /// Applies the presentation invariants: scores clamped to [0, 1] (NaN
    /// dropped to unknown) and one answer per `document_id`, first wins.
    pub fn into_shaped(mut self) -> Self {
        let mut seen = HashSet::new();
        self.document_responses
            .retain(|response| seen.insert(response.document_id.clone()));

        for response in &mut self.document_responses {
            for citation in &mut response.citations {
                citation.clamp();
            }
        }
        self
    }

    pub fn document_response(&self, document_id: &str) -> Option<&DocumentResponse> {
        self.document_responses
            .iter()
            .find(|r| r.document_id == document_id)
    }

    /// Resolves an id to its document title, falling back to the raw id.
    pub fn document_label<'a>(&'a self, document_id: &'a str) -> DocumentLabel<'a> {
        match self.document_response(document_id) {
            Some(response) if !response.document_title.is_empty() => {
                DocumentLabel::Titled(&response.document_title)
            }
            _ => DocumentLabel::Raw(document_id),
        }
    }

    pub fn theme_documents<'a>(&'a self, theme: &'a Theme) -> Vec<DocumentLabel<'a>> {
        theme
            .document_ids
            .iter()
            .map(|id| self.document_label(id))
            .collect()
    }

    /// Theme document ids with no matching document response.
    pub fn unresolved_document_ids(&self) -> Vec<&str> {
        self.themes
            .iter()
            .flat_map(|theme| theme.document_ids.iter())
            .filter(|id| self.document_response(id).is_none())
            .map(String::as_str)
            .collect()
    }

    pub fn is_single_document_summary(&self) -> bool {
        matches!(self.themes.as_slice(), [theme] if theme.theme_name == SINGLE_DOCUMENT_THEME)
    }

    pub fn citation_count(&self) -> usize {
        self.document_responses
            .iter()
            .map(|r| r.citations.len())
            .sum()
    }
}
