//! Loads converted text files from the data directory.

use crate::models::Document;
use globset::Glob;
use std::path::Path;
use walkdir::WalkDir;

/// Top-level `*.txt` file names, used for diagnostics before loading.
pub fn list_text_files(data_dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(data_dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("txt") {
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Every file under `data_dir` whose relative path matches `pattern`.
pub fn load_documents(data_dir: &Path, pattern: &str) -> anyhow::Result<Vec<Document>> {
    let matcher = Glob::new(pattern)?.compile_matcher();
    let mut docs = Vec::new();
    for entry in WalkDir::new(data_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(data_dir).unwrap_or(entry.path());
        if !matcher.is_match(rel) {
            continue;
        }
        let bytes = std::fs::read(entry.path())?;
        docs.push(Document {
            text: String::from_utf8_lossy(&bytes).into_owned(),
            source: entry.path().to_string_lossy().into_owned(),
        });
    }
    Ok(docs)
}
