//! Output formatting for command results.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use std::path::PathBuf;

use docindex_retrieval::{
    ChunkId, DeleteReport, Document, IndexStatus, IndexUpdate, IngestReport, SearchResults,
    SearchStrategy,
};
use serde::Serialize;

/// Maximum characters to show in a text snippet
const SNIPPET_MAX_LEN: usize = 200;

/// Formats any serializable value as pretty JSON.
pub fn format_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// JSON output structure for search results
#[derive(Serialize)]
pub struct JsonSearch<'a> {
    pub query: &'a str,
    pub strategy: SearchStrategy,
    pub results: Vec<JsonHit<'a>>,
}

#[derive(Serialize)]
pub struct JsonHit<'a> {
    pub chunk_id: ChunkId,
    pub document_id: &'a str,
    pub document_name: Option<&'a str>,
    pub chunk_index: u32,
    pub score: Option<f32>,
    pub snippet: String,
}

pub fn search_json<'a>(query: &'a str, results: &'a SearchResults) -> JsonSearch<'a> {
    JsonSearch {
        query,
        strategy: results.strategy,
        results: results
            .results
            .iter()
            .map(|hit| JsonHit {
                chunk_id: hit.chunk.id,
                document_id: &hit.chunk.document_id,
                document_name: hit.document.as_ref().map(|doc| doc.name.as_str()),
                chunk_index: hit.chunk.chunk_index,
                score: hit.score,
                snippet: truncate_text(&hit.chunk.content, SNIPPET_MAX_LEN),
            })
            .collect(),
    }
}

/// Formats search results for the terminal.
pub fn format_search(query: &str, results: &SearchResults) -> String {
    if results.results.is_empty() {
        return match results.strategy {
            SearchStrategy::EmptyScope => {
                format!("No documents match the filter for \"{query}\"")
            }
            _ => format!("No results found for \"{query}\""),
        };
    }

    let count = results.results.len();
    let mut output = format!(
        "Found {count} chunk{} for \"{query}\"",
        if count == 1 { "" } else { "s" }
    );
    if results.strategy == SearchStrategy::Fallback {
        output.push_str(" (text match, unranked)");
    }
    output.push_str(":\n\n");

    for (i, hit) in results.results.iter().enumerate() {
        let name = hit
            .document
            .as_ref()
            .map_or(hit.chunk.document_id.as_str(), |doc| doc.name.as_str());
        output.push_str(&format!("{}. {name} #{}", i + 1, hit.chunk.chunk_index));
        if let Some(score) = hit.score {
            output.push_str(&format!(" (score: {score:.2})"));
        }
        output.push('\n');

        let snippet = truncate_text(&hit.chunk.content, SNIPPET_MAX_LEN);
        output.push_str(&format!("   {}\n\n", indent_text(&snippet, "   ")));
    }

    output.trim_end().to_string()
}

/// Formats per-file ingestion results.
pub fn format_ingest(reports: &[(PathBuf, IngestReport)]) -> String {
    reports
        .iter()
        .map(|(path, report)| {
            let chunks = report.chunk_ids.len();
            let index = match &report.index {
                IndexUpdate::Updated { .. } => "indexed".to_string(),
                IndexUpdate::Degraded { reason } => format!("not indexed: {reason}"),
            };
            format!(
                "{} -> {} ({chunks} chunk{}, {index})",
                path.display(),
                report.document_id,
                if chunks == 1 { "" } else { "s" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats the document listing.
pub fn format_documents(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No documents ingested".to_string();
    }

    documents
        .iter()
        .map(|doc| {
            let status = format_json(&doc.status);
            let mut line = format!(
                "{}  {}  {}  {}",
                doc.id,
                status.trim_matches('"'),
                doc.mime_type,
                doc.name
            );
            if let Some(batch) = &doc.batch_id {
                line.push_str(&format!("  [batch: {batch}]"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats the index status.
pub fn format_status(status: &IndexStatus) -> String {
    let state = format_json(&status.state);
    let backend = format_json(&status.backend);
    let mut output = format!(
        "Index: {} ({} backend)\nEntries: {}",
        state.trim_matches('"'),
        backend.trim_matches('"'),
        status.entries
    );
    if let Some(dimension) = status.dimension {
        output.push_str(&format!("\nDimension: {dimension}"));
    }
    if status.dirty {
        output.push_str("\nSnapshot is behind the in-memory index");
    }
    output
}

/// Formats a deletion result.
pub fn format_delete(report: &DeleteReport) -> String {
    let mut output = format!(
        "Deleted {} ({} chunk{})",
        report.document_id,
        report.chunks_removed,
        if report.chunks_removed == 1 { "" } else { "s" }
    );
    if let Some(status) = &report.index {
        output.push('\n');
        output.push_str(&format_status(status));
    }
    output
}

/// Truncates text to a maximum number of characters, adding ellipsis if needed.
fn truncate_text(text: &str, max_len: usize) -> String {
    let text = text.trim();
    let Some((cut, _)) = text.char_indices().nth(max_len) else {
        return text.to_string();
    };

    // Find a word boundary near max_len
    let truncated = &text[..cut];
    match truncated.rfind(' ') {
        Some(last_space) => format!("{}...", &truncated[..last_space]),
        None => format!("{truncated}..."),
    }
}

/// Indents all lines of text after the first line.
fn indent_text(text: &str, indent: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                line.to_string()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
