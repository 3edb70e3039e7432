//! Document discovery and chunking.

use std::path::{Path, PathBuf};

use fg_05_persistence::{StoreCounts, StoreError};
use serde::Serialize;
use thiserror::Error;

/// File extensions picked up by directory ingestion.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = ["txt", "md"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("no .txt or .md documents found in {0}")]
    NoDocuments(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to query the knowledge store: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one directory ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub files_found: usize,
    /// Files that produced at least one chunk.
    pub files_processed: usize,
    pub chunks_published: usize,
    /// Whether the pipeline drained before the idle timeout.
    pub settled: bool,
    pub counts: StoreCounts,
}

/// Split `text` into word windows of `size` words, consecutive windows
/// sharing `overlap` words.
///
/// The window advances by `size - overlap` and stops once it reaches the
/// last word, so the tail is never emitted twice.
pub fn chunk_words(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Supported documents directly inside `dir`, sorted by path.
pub fn find_documents(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !dir.is_dir() {
        return Err(IngestError::MissingDirectory(dir.to_path_buf()));
    }
    let entries = std::fs::read_dir(dir).map_err(|source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| IngestError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && is_supported(&path) {
            files.push(path);
        }
    }
    if files.is_empty() {
        return Err(IngestError::NoDocuments(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

/// Read a document as UTF-8, replacing invalid sequences.
pub fn read_document(path: &Path) -> Result<String, IngestError> {
    let bytes = std::fs::read(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// `{file_stem}_chunk_{index}`
pub fn chunk_doc_id(path: &Path, index: usize) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    format!("{stem}_chunk_{index}")
}
