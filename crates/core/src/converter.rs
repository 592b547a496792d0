//! Batch PDF conversion on a bounded pool of blocking tasks.

use crate::config::ConvertConfig;
use crate::extractor;
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversionSummary {
    pub found: usize,
    pub converted: usize,
}

/// `*.pdf` files directly inside `dir`, sorted. A missing directory yields
/// an empty list.
pub fn list_pdfs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("pdf") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub async fn batch_convert(
    input_dir: &Path,
    output_dir: &Path,
    cfg: &ConvertConfig,
) -> anyhow::Result<ConversionSummary> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("create output dir {}", output_dir.display()))?;

    let pdfs = list_pdfs(input_dir)?;
    if pdfs.is_empty() {
        warn!("No PDF files found in {}", input_dir.display());
        return Ok(ConversionSummary::default());
    }
    info!("Found {} PDF files to convert...", pdfs.len());

    let found = pdfs.len();
    let permits = Arc::new(Semaphore::new(cfg.workers.max(1)));
    let mut tasks = JoinSet::new();
    for pdf in pdfs {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let txt = output_dir.join(format!("{stem}.txt"));
        let lang = cfg.ocr_lang.clone();
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await?;
            let ok =
                tokio::task::spawn_blocking(move || extractor::pdf_to_text(&pdf, &txt, &lang))
                    .await?;
            anyhow::Ok(ok)
        });
    }

    let mut converted = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(true)) => converted += 1,
            Ok(Ok(false)) => {}
            Ok(Err(e)) => error!("conversion task failed: {:?}", e),
            Err(e) => error!("conversion task panicked: {}", e),
        }
    }

    info!(
        "Conversion complete: {}/{} files converted successfully",
        converted, found
    );
    Ok(ConversionSummary { found, converted })
}
