//! PDF Collate Library
//!
//! Merges PDF documents into a single file. This library provides
//! functionality to:
//! - Merge whole documents or selected pages of each, in any order
//! - Group the merged pages under bounded `/Pages` nodes that carry the
//!   resources the pages inherited in their source documents
//! - Serialize the result in one pass with a fresh object numbering
//! - Extract metadata (version, page counts, etc.)
//!
//! Encrypted inputs are refused.
//!
//! # Example
//!
//! ```no_run
//! use pdf_collate::pdf::{merge_pdfs, MergeOptions};
//! use std::path::PathBuf;
//!
//! let options = MergeOptions {
//!     input_paths: vec![
//!         PathBuf::from("1. intro.pdf"),
//!         PathBuf::from("2. advanced.pdf"),
//!     ],
//!     page_selections: vec![],
//!     output_path: PathBuf::from("merged.pdf"),
//! };
//!
//! merge_pdfs(&options).expect("Failed to merge PDFs");
//! ```

pub mod error;
pub mod pdf;

// Re-export commonly used items
pub use error::{Error, Result};
