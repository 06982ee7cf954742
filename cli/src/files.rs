//! Reading local files into documents.

use std::path::Path;

use anyhow::{Context, Result};
use docindex_retrieval::Document;
use docindex_retrieval::ingest::is_text_like;

/// A file ready for ingestion.
#[derive(Debug)]
pub struct LoadedFile {
    pub document: Document,
    pub text: String,
}

/// Read a file and guess its mime type from the extension.
///
/// Text-like files are decoded as lossy UTF-8. Other files, PDFs included,
/// are ingested with no text and get a placeholder chunk.
pub async fn load_file(path: &Path, batch: Option<&str>) -> Result<LoadedFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let text = if is_text_like(&mime, &name) && !is_pdf(&mime, &name) {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        String::new()
    };

    let mut document = Document::new(name, mime, bytes.len() as u64);
    if let Some(batch) = batch {
        document = document.with_batch(batch);
    }
    Ok(LoadedFile { document, text })
}

fn is_pdf(mime: &str, name: &str) -> bool {
    mime.contains("pdf") || name.to_ascii_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_text_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, "# Notes\n\nShip it.").unwrap();

        let loaded = load_file(&path, Some("week-1")).await.unwrap();
        assert_eq!(loaded.document.name, "notes.txt");
        assert_eq!(loaded.document.mime_type, "text/plain");
        assert_eq!(loaded.document.size_bytes, 17);
        assert_eq!(loaded.document.batch_id.as_deref(), Some("week-1"));
        assert_eq!(loaded.text, "# Notes\n\nShip it.");
    }

    #[tokio::test]
    async fn test_binary_files_have_no_text() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-1.7 \x00\x01").unwrap();

        let loaded = load_file(&path, None).await.unwrap();
        assert_eq!(loaded.document.mime_type, "application/pdf");
        assert!(loaded.text.is_empty());
        assert_eq!(loaded.document.batch_id, None);
    }

    #[tokio::test]
    async fn test_missing_file_names_path() {
        let err = load_file(Path::new("/nonexistent/file.txt"), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/file.txt"));
    }
}
