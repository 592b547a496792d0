//! PDF to text: text-layer extraction with an OCR path for scanned documents.

use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("built without PDF support (enable the `pdf` feature)")]
    PdfSupportDisabled,
    #[error("built without OCR support (enable the `ocr` feature)")]
    OcrSupportDisabled,
    #[error("ocr failed: {0}")]
    Ocr(String),
}

struct Cleaners {
    newlines: Regex,
    spaces: Regex,
    control: Regex,
    hyphen_break: Regex,
}

fn cleaners() -> &'static Cleaners {
    static CLEANERS: OnceLock<Cleaners> = OnceLock::new();
    CLEANERS.get_or_init(|| Cleaners {
        newlines: Regex::new(r"\n{3,}").expect("valid regex"),
        spaces: Regex::new(r" {2,}").expect("valid regex"),
        control: Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f-\x9f]").expect("valid regex"),
        hyphen_break: Regex::new(r"-\n").expect("valid regex"),
    })
}

/// Normalises extracted text: collapses blank-line runs and space runs, drops
/// control characters and re-joins words hyphenated across lines.
pub fn clean_text(text: &str) -> String {
    let c = cleaners();
    let text = c.newlines.replace_all(text, "\n\n");
    let text = c.spaces.replace_all(&text, " ");
    let text = c.control.replace_all(&text, "");
    let text = c.hyphen_break.replace_all(&text, "");
    text.trim().to_string()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// True when no page yields any text. Unreadable files count as scanned so
/// they take the OCR path.
#[cfg(feature = "pdf")]
pub fn is_pdf_scanned(path: &Path) -> bool {
    let doc = match lopdf::Document::load(path) {
        Ok(doc) => doc,
        Err(_) => return true,
    };
    for page_no in doc.get_pages().keys() {
        match doc.extract_text(&[*page_no]) {
            Ok(text) if !text.trim().is_empty() => return false,
            Ok(_) => continue,
            Err(_) => return true,
        }
    }
    true
}

#[cfg(not(feature = "pdf"))]
pub fn is_pdf_scanned(_path: &Path) -> bool {
    true
}

/// Text layer of every page joined by blank lines, falling back to
/// `pdf-extract` when lopdf cannot decode the document.
#[cfg(feature = "pdf")]
pub fn extract_text_layer(path: &Path) -> anyhow::Result<String> {
    let per_page = || -> anyhow::Result<String> {
        let doc = lopdf::Document::load(path)?;
        let mut pages = Vec::new();
        for page_no in doc.get_pages().keys() {
            pages.push(doc.extract_text(&[*page_no])?);
        }
        Ok(pages.join("\n\n"))
    };
    match per_page() {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!(error = %e, "lopdf extraction failed for {}, using pdf-extract", display_name(path));
            Ok(pdf_extract::extract_text(path)?)
        }
    }
}

#[cfg(not(feature = "pdf"))]
pub fn extract_text_layer(_path: &Path) -> anyhow::Result<String> {
    Err(ExtractError::PdfSupportDisabled.into())
}

/// OCR of a scanned PDF. Failures are logged and yield an empty string.
pub fn ocr_pdf(path: &Path, lang: &str) -> String {
    let name = display_name(path);
    info!("Running OCR on {}", name);
    match ocr_pages(path, lang) {
        Ok(text) => clean_text(&text),
        Err(e) => {
            error!("OCR error for {}: {:?}", name, e);
            String::new()
        }
    }
}

#[cfg(feature = "ocr")]
fn ocr_pages(path: &Path, lang: &str) -> anyhow::Result<String> {
    let doc = lopdf::Document::load(path)?;
    let mut tess = leptess::LepTess::new(None, lang)
        .map_err(|e| ExtractError::Ocr(format!("tesseract init ({lang}): {e:?}")))?;
    let mut text = String::new();
    for (i, page_id) in doc.get_pages().values().enumerate() {
        let mut page_text = String::new();
        for image in page_images(&doc, *page_id)? {
            tess.set_image_from_mem(&image)
                .map_err(|e| ExtractError::Ocr(format!("{e:?}")))?;
            let recognised = tess
                .get_utf8_text()
                .map_err(|e| ExtractError::Ocr(format!("{e:?}")))?;
            page_text.push_str(&recognised);
        }
        text.push_str(&format!("--- Page {} ---\n{}\n\n", i + 1, page_text));
    }
    Ok(text)
}

#[cfg(not(feature = "ocr"))]
fn ocr_pages(_path: &Path, _lang: &str) -> anyhow::Result<String> {
    Err(ExtractError::OcrSupportDisabled.into())
}

/// Encoded images (JPEG/PNG/JPX bytes) placed on a page. Scanned PDFs carry one
/// image XObject per page.
#[cfg(feature = "ocr")]
fn page_images(doc: &lopdf::Document, page_id: lopdf::ObjectId) -> anyhow::Result<Vec<Vec<u8>>> {
    use lopdf::Object;

    fn resolve<'a>(doc: &'a lopdf::Document, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => doc.get_object(*id).ok(),
            other => Some(other),
        }
    }

    let (own, inherited) = doc.get_page_resources(page_id);
    let resources: Vec<&lopdf::Dictionary> = own
        .into_iter()
        .chain(inherited.iter().filter_map(|id| doc.get_dictionary(*id).ok()))
        .collect();

    let mut images = Vec::new();
    for res in resources {
        let Some(xobjects) = res
            .get(b"XObject")
            .ok()
            .and_then(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
        else {
            continue;
        };
        for (_, entry) in xobjects.iter() {
            let Some(stream) = resolve(doc, entry).and_then(|o| o.as_stream().ok()) else {
                continue;
            };
            let is_image = stream
                .dict
                .get(b"Subtype")
                .and_then(|o| o.as_name())
                .map(|n| n == &b"Image"[..])
                .unwrap_or(false);
            if !is_image {
                continue;
            }
            if let Some(bytes) = encode_image(stream)? {
                images.push(bytes);
            }
        }
    }
    Ok(images)
}

#[cfg(feature = "ocr")]
fn encode_image(stream: &lopdf::Stream) -> anyhow::Result<Option<Vec<u8>>> {
    use lopdf::Object;

    let filters: Vec<Vec<u8>> = match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    };
    let is = |f: &[u8]| filters.len() == 1 && filters[0] == f;

    // Leptonica decodes these container formats directly.
    if is(&b"DCTDecode"[..]) || is(&b"JPXDecode"[..]) {
        return Ok(Some(stream.content.clone()));
    }

    let raw = if filters.is_empty() {
        stream.content.clone()
    } else if is(&b"FlateDecode"[..]) {
        stream.decompressed_content()?
    } else {
        tracing::debug!(?filters, "skipping image with unsupported filter");
        return Ok(None);
    };

    let dim = |key: &[u8]| -> Option<u32> {
        stream.dict.get(key).ok()?.as_i64().ok().map(|v| v as u32)
    };
    let (Some(width), Some(height)) = (dim(&b"Width"[..]), dim(&b"Height"[..])) else {
        return Ok(None);
    };
    let pixels = width as usize * height as usize;
    let image = if raw.len() == pixels {
        image::GrayImage::from_raw(width, height, raw).map(image::DynamicImage::ImageLuma8)
    } else if raw.len() == pixels * 3 {
        image::RgbImage::from_raw(width, height, raw).map(image::DynamicImage::ImageRgb8)
    } else {
        None
    };
    let Some(image) = image else {
        tracing::debug!(width, height, "skipping image with unsupported pixel layout");
        return Ok(None);
    };
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, image::ImageOutputFormat::Png)?;
    Ok(Some(buf.into_inner()))
}

/// Converts one PDF into a cleaned UTF-8 text file. Returns `false` on any
/// failure after logging it.
pub fn pdf_to_text(pdf_path: &Path, txt_path: &Path, ocr_lang: &str) -> bool {
    let name = display_name(pdf_path);
    let start = Instant::now();
    info!("Processing: {}", name);
    match convert(pdf_path, txt_path, ocr_lang) {
        Ok(()) => {
            info!(
                "Converted: {} -> {} ({:.2}s)",
                name,
                display_name(txt_path),
                start.elapsed().as_secs_f64()
            );
            true
        }
        Err(e) => {
            error!("Error processing {}: {:?}", name, e);
            false
        }
    }
}

fn convert(pdf_path: &Path, txt_path: &Path, ocr_lang: &str) -> anyhow::Result<()> {
    if !cfg!(feature = "pdf") {
        return Err(ExtractError::PdfSupportDisabled.into());
    }
    let text = if is_pdf_scanned(pdf_path) {
        info!("Scanned PDF detected: {}", display_name(pdf_path));
        ocr_pdf(pdf_path, ocr_lang)
    } else {
        extract_text_layer(pdf_path)?
    };
    fs::write(txt_path, clean_text(&text))?;
    Ok(())
}

/// Writes a one-page PDF whose text layer holds `text`.
#[cfg(all(test, feature = "pdf"))]
pub(crate) fn write_text_pdf(path: &Path, text: &str) {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 24.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
