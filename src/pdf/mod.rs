//! PDF manipulation module

pub mod copier;
pub mod encode;
pub mod merge;
pub mod metadata;
pub mod selection;
pub mod source;
pub mod version;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used items
pub use copier::ObjectCopier;
pub use merge::{
    merge_buffers, merge_files, merge_paths, merge_pdfs, MergeOptions, Merger, GROUP_CAPACITY,
};
pub use metadata::{count_pages, extract_metadata, metadata_from_bytes, PdfMetadata};
pub use selection::parse_page_selection;
pub use source::{InheritedResources, PageNode, SourceDocument};
pub use version::PdfVersion;
pub use writer::{DeferredWriter, WriterState};
