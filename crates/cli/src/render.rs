use client::{ClassifiedError, MetricsSnapshot};
use model::{Document, DocumentKind, HealthStatus, QueryResponse, RelevanceBand, Subsystem};
use std::fmt::Write;

pub fn health(status: &HealthStatus) -> String {
    let mut out = String::new();
    for subsystem in [Subsystem::MongoDb, Subsystem::Ollama, Subsystem::ChromaDb] {
        let state = status.subsystem(subsystem);
        let mark = if state.is_available() { "ok" } else { "--" };
        let _ = writeln!(out, "[{mark}] {:<9} {state}", subsystem.name());
    }
    let _ = write!(out, "overall: {}", status.status);
    out
}

pub fn documents(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No documents uploaded yet.".to_string();
    }

    let mut out = String::new();
    for doc in documents {
        let _ = writeln!(out, "{}", document_line(doc));
    }
    let _ = write!(out, "{} document(s)", documents.len());
    out
}

fn document_line(doc: &Document) -> String {
    let kind = match doc.kind() {
        DocumentKind::Pdf => "pdf",
        DocumentKind::Image => "image",
        DocumentKind::Other => "file",
    };
    let mut badges = Vec::new();
    if doc.ocr_processed {
        badges.push("OCR");
    }
    if !doc.processed {
        badges.push("processing");
    }

    let mut line = format!(
        "{}  {} [{}] {}, {}",
        doc.id,
        doc.title,
        kind,
        doc.pages_label(),
        doc.size_label()
    );
    if !badges.is_empty() {
        let _ = write!(line, " ({})", badges.join(", "));
    }
    line
}

pub fn document(doc: &Document) -> String {
    let mut out = document_line(doc);
    let _ = write!(out, "\n  file: {}", doc.original_filename);
    let _ = write!(out, "\n  uploaded: {}", doc.upload_date.format("%Y-%m-%d %H:%M"));
    if let Some(modified) = doc.last_modified {
        let _ = write!(out, "\n  modified: {}", modified.format("%Y-%m-%d %H:%M"));
    }
    out
}

pub fn response(response: &QueryResponse) -> String {
    let mut out = String::new();
    if let Some(id) = &response.id {
        let _ = writeln!(out, "Query {id}: {}", response.query_text);
    }

    if response.is_single_document_summary() {
        let _ = writeln!(out, "\nDocument summary");
    } else if !response.themes.is_empty() {
        let _ = writeln!(out, "\nThemes");
    }
    for theme in &response.themes {
        let _ = writeln!(out, "* {}", theme.theme_name);
        if !theme.description.is_empty() {
            let _ = writeln!(out, "  {}", theme.description);
        }
        let sources: Vec<String> = response
            .theme_documents(theme)
            .iter()
            .map(ToString::to_string)
            .collect();
        if !sources.is_empty() {
            let _ = writeln!(out, "  sources: {}", sources.join(", "));
        }
        for evidence in &theme.supporting_evidence {
            let _ = writeln!(out, "  - {evidence}");
        }
    }

    if !response.document_responses.is_empty() {
        let _ = writeln!(out, "\nDocuments ({} citations)", response.citation_count());
    }
    for doc in &response.document_responses {
        let title = response.document_label(&doc.document_id);
        let _ = writeln!(out, "# {title}");
        let _ = writeln!(out, "  {}", doc.extracted_answer);
        for citation in &doc.citations {
            let relevance = citation.relevance();
            let band = match relevance.band() {
                Some(RelevanceBand::High) => "high",
                Some(RelevanceBand::Medium) => "medium",
                Some(RelevanceBand::Low) => "low",
                None => "unscored",
            };
            let _ = writeln!(
                out,
                "  p.{} para.{}  relevance {} ({band})",
                citation.page_label(),
                citation.paragraph_label(),
                relevance
            );
        }
    }

    out.trim_end().to_string()
}

pub fn error(err: &ClassifiedError) -> String {
    match err.hint {
        Some(hint) if !err.message.contains(hint) => format!("{}\nhint: {hint}", err.message),
        _ => err.message.clone(),
    }
}

pub fn stats(snapshot: &MetricsSnapshot) -> String {
    serde_json::to_string_pretty(snapshot).unwrap_or_default()
}
