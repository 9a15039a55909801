//! Error types for the PDF collate library

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the PDF collate library
#[derive(Error, Debug)]
pub enum Error {
    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A missing or unusable input entry
    #[error("Invalid argument at index {index}: {reason}")]
    InvalidArgument { index: usize, reason: String },

    /// Source document declares an encryption dictionary
    #[error("Document {index} is encrypted; encrypted PDFs cannot be merged")]
    Encrypted { index: usize },

    /// Source document is structurally unusable
    #[error("Malformed PDF at index {index}: {reason}")]
    Format { index: usize, reason: String },

    /// Selected page does not exist in the source document
    #[error("Page {page} is out of range for document {index} ({count} pages)")]
    PageOutOfRange { index: usize, page: u32, count: u32 },

    /// No input contributed any page
    #[error("Merge produced no pages")]
    EmptyResult,

    /// Internal bookkeeping went wrong
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Page range expression could not be parsed
    #[error("Invalid page range: {0}")]
    InvalidRange(String),
}
