//! PDF merging
//!
//! Selected pages of every source are copied into one object space and hung
//! under synthetic `/Pages` groups of at most [`GROUP_CAPACITY`] pages:
//!
//! ```text
//! Catalog -> root /Pages -> group /Pages -> page
//!                        -> group /Pages -> page ...
//! ```
//!
//! Each group carries the resources its pages inherited in their source
//! documents. A page whose inherited resources would clash with the group's
//! (same key from a different resource dictionary) starts a new group.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::{dictionary, Dictionary, Object, ObjectId};
use tracing::debug;

use super::copier::ObjectCopier;
use super::source::{PageNode, SourceDocument};
use super::version::PdfVersion;
use super::writer::DeferredWriter;
use crate::error::{Error, Result};

/// Maximum number of pages under one group node
pub const GROUP_CAPACITY: usize = 100;

/// Options for merging PDF files
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Input PDF file paths in the order they should be merged
    pub input_paths: Vec<PathBuf>,
    /// Optional 1-based page selection per input, matched by position;
    /// missing or `None` entries take every page
    pub page_selections: Vec<Option<Vec<u32>>>,
    /// Output PDF file path
    pub output_path: PathBuf,
}

/// Merge two PDF files, all pages of each
pub fn merge_files(first: impl AsRef<Path>, second: impl AsRef<Path>) -> Result<Vec<u8>> {
    merge_paths(&[first.as_ref(), second.as_ref()])
}

/// Merge PDF files in argument order, all pages of each
///
/// Every path is checked before any file is read.
pub fn merge_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<u8>> {
    validate_paths(paths)?;
    let buffers = read_all(paths)?;
    let selections = vec![None; buffers.len()];
    merge_sources(&buffers, &selections, GROUP_CAPACITY)
}

/// Merge PDF documents held in memory
///
/// `selections`, when given, must have one entry per buffer. An empty
/// selection skips its document; indices may repeat and come in any order.
pub fn merge_buffers<B: AsRef<[u8]>>(
    buffers: &[B],
    selections: Option<&[Vec<u32>]>,
) -> Result<Vec<u8>> {
    for (index, buffer) in buffers.iter().enumerate() {
        if buffer.as_ref().is_empty() {
            return Err(Error::InvalidArgument {
                index,
                reason: "input buffer is empty".to_string(),
            });
        }
    }
    let selections: Vec<Option<&[u32]>> = match selections {
        Some(selections) if selections.len() != buffers.len() => {
            return Err(Error::InvalidArgument {
                index: selections.len().min(buffers.len()),
                reason: format!(
                    "{} page selections given for {} inputs",
                    selections.len(),
                    buffers.len()
                ),
            });
        }
        Some(selections) => selections.iter().map(|s| Some(s.as_slice())).collect(),
        None => vec![None; buffers.len()],
    };
    merge_sources(buffers, &selections, GROUP_CAPACITY)
}

/// Merge the files named in `options` and save the result
///
/// # Example
///
/// ```no_run
/// use pdf_collate::pdf::{merge_pdfs, MergeOptions};
/// use std::path::PathBuf;
///
/// let options = MergeOptions {
///     input_paths: vec![
///         PathBuf::from("1. first.pdf"),
///         PathBuf::from("2. second.pdf"),
///     ],
///     page_selections: vec![Some(vec![2, 1]), None],
///     output_path: PathBuf::from("merged.pdf"),
/// };
///
/// merge_pdfs(&options).expect("Failed to merge");
/// ```
pub fn merge_pdfs(options: &MergeOptions) -> Result<()> {
    validate_paths(&options.input_paths)?;
    if options.page_selections.len() > options.input_paths.len() {
        return Err(Error::InvalidArgument {
            index: options.input_paths.len(),
            reason: "more page selections than input files".to_string(),
        });
    }
    let buffers = read_all(&options.input_paths)?;
    let selections: Vec<Option<&[u32]>> = (0..buffers.len())
        .map(|i| options.page_selections.get(i).and_then(|s| s.as_deref()))
        .collect();

    let merged = merge_sources(&buffers, &selections, GROUP_CAPACITY)?;
    fs::write(&options.output_path, merged)?;
    Ok(())
}

fn validate_paths<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for (index, path) in paths.iter().enumerate() {
        if path.as_ref().as_os_str().is_empty() {
            return Err(Error::InvalidArgument {
                index,
                reason: "input path is empty".to_string(),
            });
        }
    }
    for path in paths {
        if !path.as_ref().exists() {
            return Err(Error::FileNotFound(path.as_ref().to_path_buf()));
        }
    }
    Ok(())
}

fn read_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Vec<u8>>> {
    paths
        .iter()
        .map(|path| fs::read(path).map_err(Error::from))
        .collect()
}

fn merge_sources<B: AsRef<[u8]>>(
    buffers: &[B],
    selections: &[Option<&[u32]>],
    capacity: usize,
) -> Result<Vec<u8>> {
    let mut merger = Merger::with_capacity(capacity)?;
    for (index, (buffer, selection)) in buffers.iter().zip(selections).enumerate() {
        let source = SourceDocument::from_bytes(index, buffer.as_ref())?;
        merger.add_document(&source, *selection)?;
    }
    merger.finish()
}

/// Pages collected for one output `/Pages` node
#[derive(Debug)]
struct MergeGroup {
    id: ObjectId,
    kids: Vec<ObjectId>,
    resources: Dictionary,
    /// Source resource dictionary each key of `resources` came from
    origins: HashMap<Vec<u8>, ObjectId>,
}

impl MergeGroup {
    fn new(id: ObjectId) -> Self {
        Self {
            id,
            kids: Vec::new(),
            resources: Dictionary::new(),
            origins: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.kids.len()
    }

    fn is_empty(&self) -> bool {
        self.kids.is_empty()
    }

    /// Whether the page's inherited resources cannot share this group
    ///
    /// Keys are compared by name only: a key contributed by two different
    /// resource dictionaries, in the group or along the page's own ancestor
    /// chain, is a collision even when the values are equal.
    fn collides(&self, source: &SourceDocument, page: PageNode) -> bool {
        let mut walked: HashMap<&[u8], ObjectId> = HashMap::new();
        for inherited in source.resource_chain(page) {
            for (key, _) in inherited.dictionary.iter() {
                if let Some(previous) = walked.insert(key.as_slice(), inherited.origin) {
                    if previous != inherited.origin {
                        return true;
                    }
                }
                if let Some(origin) = self.origins.get(key) {
                    if *origin != inherited.origin {
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// Incremental merge of source documents into one output document
///
/// ```
/// use pdf_collate::pdf::{Merger, SourceDocument};
/// # use lopdf::{dictionary, Document, Object};
/// # let mut doc = Document::with_version("1.5");
/// # let pages_id = doc.new_object_id();
/// # let page_id = doc.add_object(dictionary! { "Type" => "Page", "Parent" => pages_id });
/// # doc.objects.insert(pages_id, Object::Dictionary(dictionary! {
/// #     "Type" => "Pages", "Kids" => vec![Object::Reference(page_id)], "Count" => 1,
/// # }));
/// # let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
/// # doc.trailer.set("Root", catalog_id);
///
/// let source = SourceDocument::from_document(0, doc).unwrap();
/// let mut merger = Merger::new().unwrap();
/// merger.add_document(&source, None).unwrap();
/// merger.add_document(&source, Some(&[1, 1])).unwrap();
/// let bytes = merger.finish().unwrap();
///
/// let merged = Document::load_mem(&bytes).unwrap();
/// assert_eq!(merged.get_pages().len(), 3);
/// ```
#[derive(Debug)]
pub struct Merger {
    writer: DeferredWriter<'static>,
    copier: ObjectCopier,
    capacity: usize,
    /// Reserved up front: pages point at it long before it is written
    root: ObjectId,
    groups: Vec<ObjectId>,
    version: Option<PdfVersion>,
    page_count: usize,
}

impl Merger {
    pub fn new() -> Result<Self> {
        Self::with_capacity(GROUP_CAPACITY)
    }

    /// Merger whose groups hold at most `capacity` pages (at least one)
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut writer = DeferredWriter::new();
        let root = writer.reserve()?;
        Ok(Self {
            writer,
            copier: ObjectCopier::new(),
            capacity: capacity.max(1),
            root,
            groups: Vec::new(),
            version: None,
            page_count: 0,
        })
    }

    /// Number of pages finalized so far
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Number of groups finalized so far
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Append the selected pages of `source` (all pages when `selection` is `None`)
    pub fn add_document(
        &mut self,
        source: &SourceDocument,
        selection: Option<&[u32]>,
    ) -> Result<()> {
        let numbers: Vec<u32> = match selection {
            Some([]) => {
                debug!(index = source.index(), "empty selection, skipping document");
                return Ok(());
            }
            Some(selection) => selection.to_vec(),
            None if source.page_count() < 1 => {
                debug!(index = source.index(), "document has no pages, skipping");
                return Ok(());
            }
            None => (1..=source.page_count()).collect(),
        };

        let version = source.version();
        self.version = Some(self.version.map_or(version, |current| current.max(version)));

        let pages = numbers
            .into_iter()
            .map(|number| source.page(number))
            .collect::<Result<Vec<_>>>()?;

        // References between pages (annotation /P, link /Dest) must land on the
        // merged pages, so each selected page gets its identity up front
        let mut targets: HashMap<ObjectId, ObjectId> = HashMap::new();
        for page in &pages {
            if !targets.contains_key(&page.id()) {
                let target = self.writer.reserve()?;
                self.copier.assign(source, page.id(), target);
                targets.insert(page.id(), target);
            }
        }
        for page in source.pages() {
            if !targets.contains_key(&page.id()) {
                self.copier.exclude(source, page.id());
            }
        }

        let mut group = MergeGroup::new(self.writer.reserve()?);
        for page in pages {
            if !group.is_empty() && (group.len() >= self.capacity || group.collides(source, page)) {
                let next = MergeGroup::new(self.writer.reserve()?);
                self.finalize_group(std::mem::replace(&mut group, next))?;
            }
            // A repeated page is a distinct object; only its first copy is a link target
            let target = match targets.remove(&page.id()) {
                Some(target) => target,
                None => self.writer.reserve()?,
            };
            self.add_page(&mut group, source, page, target)?;
        }
        if !group.is_empty() {
            self.finalize_group(group)?;
        }

        self.copier.reset();
        debug!(
            index = source.index(),
            pages = self.page_count,
            groups = self.groups.len(),
            "merged document"
        );
        Ok(())
    }

    fn add_page(
        &mut self,
        group: &mut MergeGroup,
        source: &SourceDocument,
        page: PageNode,
        target: ObjectId,
    ) -> Result<()> {
        for inherited in source.resource_chain(page) {
            for (key, value) in inherited.dictionary.iter() {
                if group.resources.has(key) {
                    continue;
                }
                let copied = self.copier.copy(value, source, &mut self.writer)?;
                group.resources.set(key.clone(), copied);
                group.origins.insert(key.clone(), inherited.origin);
            }
        }

        let mut dict = source.dictionary(page)?.clone();
        dict.remove(b"Parent");
        let mut copied = self.copier.copy_dictionary(&dict, source, &mut self.writer)?;
        copied.set("Parent", group.id);
        self.writer.bind(target, copied)?;
        group.kids.push(target);
        Ok(())
    }

    fn finalize_group(&mut self, group: MergeGroup) -> Result<()> {
        if group.is_empty() {
            return Err(Error::InvariantViolation(format!(
                "group {} {} finalized without pages",
                group.id.0, group.id.1
            )));
        }

        let count = group.len();
        let kids: Vec<Object> = group.kids.into_iter().map(Object::Reference).collect();
        let mut node = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
            "Parent" => self.root,
        };
        if !group.resources.is_empty() {
            node.set("Resources", group.resources);
        }
        self.writer.bind(group.id, node)?;

        debug!(group = ?group.id, pages = count, "finalized group");
        self.groups.push(group.id);
        self.page_count += count;
        Ok(())
    }

    /// Write the root node and catalog and serialize the document
    pub fn finish(mut self) -> Result<Vec<u8>> {
        if self.groups.is_empty() {
            return Err(Error::EmptyResult);
        }

        let kids: Vec<Object> = self.groups.iter().copied().map(Object::Reference).collect();
        self.writer.bind(
            self.root,
            dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.page_count as i64,
            },
        )?;
        let catalog = self.writer.add(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.root,
        })?;

        let version = self.version.unwrap_or_default();
        self.writer.flush(version, catalog)?;
        let bytes = self.writer.bytes().to_vec();
        self.writer.close();

        debug!(
            %version,
            pages = self.page_count,
            groups = self.groups.len(),
            size = bytes.len(),
            "wrote merged document"
        );
        Ok(bytes)
    }
}
