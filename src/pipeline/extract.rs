//! Text extraction: turn a document into ordered [`PageText`] entries.
//!
//! PDFs are parsed with lopdf, one `PageText` per page in page order.
//! lopdf is synchronous and CPU-bound on large files, so every call runs
//! inside `tokio::task::spawn_blocking`.
//!
//! Plain-text documents have no pages; they are cut into overlapping
//! chunks at blank lines and chunk `i` plays the role of page `i`.
//!
//! Extraction is all-or-nothing: one unreadable page fails the document.

use crate::config::TimelineConfig;
use crate::error::TimelineError;
use crate::output::{DocumentMetadata, PageText};
use crate::pipeline::input::DocumentKind;
use lopdf::{Document, Object};
use std::path::Path;
use tracing::{debug, info};

/// Extract the text of every page (or chunk) of a local document.
pub async fn extract_pages(
    path: &Path,
    kind: DocumentKind,
    config: &TimelineConfig,
) -> Result<Vec<PageText>, TimelineError> {
    let path = path.to_path_buf();
    let password = config.password.clone();
    let chunk_size = config.text_chunk_size;
    let overlap = config.text_chunk_overlap;

    tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Pdf => extract_pdf_blocking(&path, password.as_deref()),
        DocumentKind::Text => extract_text_file_blocking(&path, chunk_size, overlap),
    })
    .await
    .map_err(|e| TimelineError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Read PDF metadata without extracting page text.
pub async fn extract_metadata(
    path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, TimelineError> {
    let path = path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| TimelineError::Internal(format!("Metadata task panicked: {e}")))?
}

/// Open a PDF, decrypting it when needed. Returns the document and whether
/// it was encrypted on disk.
fn load_document(path: &Path, password: Option<&str>) -> Result<(Document, bool), TimelineError> {
    let mut doc = Document::load(path).map_err(|e| {
        let detail = e.to_string();
        if detail.contains("encrypt") || detail.contains("password") {
            TimelineError::PasswordRequired {
                path: path.to_path_buf(),
            }
        } else {
            TimelineError::CorruptPdf {
                path: path.to_path_buf(),
                detail,
            }
        }
    })?;

    let encrypted = doc.is_encrypted();
    if encrypted {
        match password {
            Some(pwd) => doc.decrypt(pwd).map_err(|_| TimelineError::WrongPassword {
                path: path.to_path_buf(),
            })?,
            // Owner-password-only PDFs open with an empty user password.
            None => doc.decrypt("").map_err(|e| {
                debug!("Empty user password rejected: {}", e);
                TimelineError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            })?,
        }
    }

    Ok((doc, encrypted))
}

fn extract_pdf_blocking(path: &Path, password: Option<&str>) -> Result<Vec<PageText>, TimelineError> {
    let (doc, _) = load_document(path, password)?;

    // BTreeMap keyed by 1-indexed page number, so iteration is in page order.
    let pages = doc.get_pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut results = Vec::with_capacity(pages.len());
    for (number, _object_id) in pages {
        let text = doc
            .extract_text(&[number])
            .map_err(|e| TimelineError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("text extraction failed on page {number}: {e}"),
            })?;
        debug!("Page {}: {} chars", number, text.len());
        results.push(PageText {
            page_number: number as usize,
            text,
        });
    }

    Ok(results)
}

fn extract_text_file_blocking(
    path: &Path,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<PageText>, TimelineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| read_error(path, e))?;
    let chunks = chunk_text(&raw, chunk_size, overlap);
    info!("Text document split into {} chunks", chunks.len());

    Ok(chunks
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText {
            page_number: i + 1,
            text,
        })
        .collect())
}

fn read_error(path: &Path, e: std::io::Error) -> TimelineError {
    match e.kind() {
        std::io::ErrorKind::NotFound => TimelineError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => TimelineError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => TimelineError::InvalidInput {
            input: format!("{}: {e}", path.display()),
        },
    }
}

const PARAGRAPH_SEP: &str = "\n\n";

/// Split text at blank lines and pack paragraphs into chunks of at most
/// `chunk_size` characters, carrying up to `overlap` characters of trailing
/// paragraphs into the next chunk. A single paragraph longer than
/// `chunk_size` becomes a chunk of its own.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let normalised = text.replace("\r\n", "\n");
    let splits: Vec<&str> = normalised
        .split(PARAGRAPH_SEP)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();

    for split in splits {
        let len = split.chars().count();
        if !window.is_empty() && joined_len(&window) + PARAGRAPH_SEP.len() + len > chunk_size {
            chunks.push(window.join(PARAGRAPH_SEP));
            // Drop leading paragraphs until the carried-over tail fits both
            // the overlap budget and the room left for the new paragraph.
            while !window.is_empty()
                && (joined_len(&window) > overlap
                    || joined_len(&window) + PARAGRAPH_SEP.len() + len > chunk_size)
            {
                window.remove(0);
            }
        }
        window.push(split);
    }

    if !window.is_empty() {
        chunks.push(window.join(PARAGRAPH_SEP));
    }

    chunks
}

fn joined_len(window: &[&str]) -> usize {
    let chars: usize = window.iter().map(|s| s.chars().count()).sum();
    chars + PARAGRAPH_SEP.len() * window.len().saturating_sub(1)
}

fn extract_metadata_blocking(
    path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, TimelineError> {
    let (doc, encrypted) = load_document(path, password)?;

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok(),
        Ok(obj) => Some(obj),
        Err(_) => None,
    }
    .and_then(|obj| obj.as_dict().ok());

    let get_meta = |key: &[u8]| -> Option<String> {
        let dict = info?;
        let bytes = dict.get(key).ok()?.as_str().ok()?;
        let value = decode_pdf_string(bytes);
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    };

    Ok(DocumentMetadata {
        title: get_meta(b"Title"),
        author: get_meta(b"Author"),
        subject: get_meta(b"Subject"),
        creator: get_meta(b"Creator"),
        producer: get_meta(b"Producer"),
        page_count: doc.get_pages().len(),
        pdf_version: doc.version.clone(),
        is_encrypted: encrypted,
    })
}

/// Decode a PDF text string: UTF-16BE when it carries a BOM, otherwise
/// bytes are taken as Latin-1 (close enough to PDFDocEncoding for metadata).
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}
