//! PDF metadata extraction

use std::fs;
use std::path::Path;

use lopdf::{Dictionary, Document, Object};

use super::version::PdfVersion;
use crate::error::{Error, Result};

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Header version, raised by a newer catalog `/Version`
    pub version: PdfVersion,
    /// Number of pages reachable through the page tree
    pub page_count: usize,
    /// Whether the trailer names an encryption dictionary
    pub encrypted: bool,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
}

/// Extract metadata from a PDF file
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    metadata_from_bytes(&fs::read(path)?)
}

/// Extract metadata from PDF bytes
pub fn metadata_from_bytes(bytes: &[u8]) -> Result<PdfMetadata> {
    let doc = Document::load_mem(bytes)?;

    let mut version = PdfVersion::parse(&doc.version).unwrap_or_default();
    if let Some(declared) = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"Version").ok())
        .and_then(|v| v.as_name().ok())
        .and_then(|name| std::str::from_utf8(name).ok())
        .and_then(PdfVersion::parse)
    {
        version = version.max(declared);
    }

    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|info| doc.dereference(info).ok())
        .and_then(|(_, info)| info.as_dict().ok());

    Ok(PdfMetadata {
        version,
        page_count: doc.get_pages().len(),
        encrypted: doc.trailer.has(b"Encrypt"),
        title: info.and_then(|info| text_entry(info, b"Title")),
        author: info.and_then(|info| text_entry(info, b"Author")),
    })
}

/// Count the number of pages in a PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    Ok(extract_metadata(path)?.page_count)
}

/// Decode a text string entry (UTF-16BE with BOM, otherwise UTF-8/Latin-1)
fn text_entry(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = match dict.get(key).ok()? {
        Object::String(bytes, _) => bytes,
        _ => return None,
    };
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16(&units).ok();
    }
    Some(match String::from_utf8(bytes.clone()) {
        Ok(text) => text,
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    })
}
