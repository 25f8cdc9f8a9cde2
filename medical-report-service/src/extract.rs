//! Text extraction for uploaded reports.
//!
//! Supported uploads are PDF, plain text (`.txt`, `.data`) and CSV. Every failure, including
//! a panic inside the PDF parser, comes back as a [`ReportError`] value.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use chrono::Utc;
use lopdf::Document;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{ReportError, Result};
use crate::models::{ExtractedText, UploadedDocument};

/// Inserted between the texts of consecutive PDF pages
pub const PAGE_SEPARATOR: &str = "\n";

const COLUMN_GAP: &str = "  ";
/// Shown for cells missing from a short CSV row
const MISSING_CELL: &str = "NaN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    PlainText,
    Csv,
}

impl FileKind {
    /// Resolve the file kind from the upload's file name suffix (case-insensitive)
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("pdf") => Ok(FileKind::Pdf),
            Some("txt") | Some("data") => Ok(FileKind::PlainText),
            Some("csv") => Ok(FileKind::Csv),
            Some(other) => Err(ReportError::UnsupportedFileType(format!(".{other}"))),
            None => Err(ReportError::UnsupportedFileType(filename.to_string())),
        }
    }
}

/// Deterministic identity of an upload, used for cache keys and to tie summaries to their source
pub fn content_digest(filename: &str, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Extract the text of `bytes` interpreted as `kind`. Blank output counts as a failure.
pub fn extract(bytes: &[u8], kind: FileKind) -> Result<String> {
    let text = match kind {
        FileKind::Pdf => extract_pdf(bytes)?,
        FileKind::PlainText => decode_utf8(bytes)?,
        FileKind::Csv => render_csv(bytes)?,
    };

    if text.trim().is_empty() {
        return Err(ReportError::DecodeFailure(
            "the document contains no extractable text".to_string(),
        ));
    }
    Ok(text)
}

pub fn extract_document(document: &UploadedDocument) -> Result<ExtractedText> {
    let kind = FileKind::from_filename(&document.filename)?;
    let text = extract(&document.bytes, kind)?;

    info!(
        "Extracted {} characters from {} ({:?})",
        text.len(),
        document.filename,
        kind
    );

    Ok(ExtractedText {
        document_id: content_digest(&document.filename, &document.bytes),
        filename: document.filename.clone(),
        text,
        extracted_at: Utc::now(),
    })
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    // lopdf can panic on some malformed inputs; keep that inside the extractor.
    panic::catch_unwind(AssertUnwindSafe(|| extract_pdf_pages(bytes))).unwrap_or_else(|_| {
        warn!("PDF parser panicked on malformed input");
        Err(ReportError::DecodeFailure(
            "the PDF is malformed and could not be parsed".to_string(),
        ))
    })
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<String> {
    let document = Document::load_mem(bytes)
        .map_err(|err| ReportError::DecodeFailure(format!("failed to open PDF: {err}")))?;

    let pages = document.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        let text = document.extract_text(&[*page_number]).map_err(|err| {
            ReportError::DecodeFailure(format!(
                "failed to extract text from page {page_number}: {err}"
            ))
        })?;
        page_texts.push(text);
    }

    Ok(page_texts.join(PAGE_SEPARATOR))
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| ReportError::DecodeFailure(format!("file is not valid UTF-8: {err}")))
}

/// Render CSV as a column-aligned table: header row first, cells right-aligned, no index column
fn render_csv(bytes: &[u8]) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|err| ReportError::DecodeFailure(format!("invalid CSV header: {err}")))?
        .clone();
    if headers.is_empty() {
        return Err(ReportError::DecodeFailure(
            "no columns to parse from file".to_string(),
        ));
    }

    let mut rows: Vec<Vec<String>> = vec![headers.iter().map(str::to_string).collect()];
    for (index, record) in reader.records().enumerate() {
        let record =
            record.map_err(|err| ReportError::DecodeFailure(format!("invalid CSV row: {err}")))?;
        if record.len() > headers.len() {
            return Err(ReportError::DecodeFailure(format!(
                "invalid CSV row {}: expected {} fields, saw {}",
                index + 2,
                headers.len(),
                record.len()
            )));
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(headers.len(), MISSING_CELL.to_string());
        rows.push(row);
    }

    let mut widths = vec![0usize; headers.len()];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let lines = rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:>width$}"))
                .collect::<Vec<_>>()
                .join(COLUMN_GAP)
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>();

    Ok(lines.join("\n"))
}
