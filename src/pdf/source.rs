//! Source documents and their page trees
//!
//! A [`SourceDocument`] wraps a parsed `lopdf` document together with its
//! position in the merge input list. Page-tree nodes are addressed by
//! [`PageNode`] handles; a node's parent is found by looking its `/Parent`
//! entry up in the owning document, never through a stored link.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, warn};

use super::version::PdfVersion;
use crate::error::{Error, Result};

/// Handle to a page-tree node inside a source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageNode {
    id: ObjectId,
}

impl PageNode {
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

/// A resource dictionary met while walking up from a page
#[derive(Debug, Clone, Copy)]
pub struct InheritedResources<'a> {
    /// Identity of the resource dictionary: the referenced object when
    /// `/Resources` is indirect, otherwise the node that holds it inline
    pub origin: ObjectId,
    pub dictionary: &'a Dictionary,
}

/// A parsed, unencrypted source PDF
#[derive(Debug)]
pub struct SourceDocument {
    index: usize,
    document: Document,
    version: PdfVersion,
    pages: Vec<ObjectId>,
}

impl SourceDocument {
    /// Parse a document from bytes
    ///
    /// `index` is the document's position in the merge input and is used to
    /// identify it in errors.
    pub fn from_bytes(index: usize, bytes: &[u8]) -> Result<Self> {
        match Document::load_mem(bytes) {
            Ok(document) => Self::from_document(index, document),
            // The parser may refuse an encrypted file before we see its trailer
            Err(_) if contains(bytes, b"/Encrypt") => Err(Error::Encrypted { index }),
            Err(e) => Err(Error::Format {
                index,
                reason: e.to_string(),
            }),
        }
    }

    /// Wrap an already parsed document
    pub fn from_document(index: usize, document: Document) -> Result<Self> {
        if document.trailer.has(b"Encrypt") {
            return Err(Error::Encrypted { index });
        }

        let catalog = catalog(index, &document)?;

        let mut version = PdfVersion::parse(&document.version).ok_or_else(|| Error::Format {
            index,
            reason: format!("unrecognised header version {:?}", document.version),
        })?;
        // A catalog /Version newer than the header takes precedence
        if let Ok(Object::Name(name)) = catalog.get(b"Version") {
            if let Some(declared) = std::str::from_utf8(name).ok().and_then(PdfVersion::parse) {
                version = version.max(declared);
            }
        }

        let pages: Vec<ObjectId> = document.get_pages().into_values().collect();
        debug!(index, %version, pages = pages.len(), "loaded source document");

        Ok(Self {
            index,
            document,
            version,
            pages,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn version(&self) -> PdfVersion {
        self.version
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Every page in document order
    pub fn pages(&self) -> impl Iterator<Item = PageNode> + '_ {
        self.pages.iter().map(|&id| PageNode { id })
    }

    /// Look up a page by its 1-based number
    pub fn page(&self, number: u32) -> Result<PageNode> {
        let id = (number as usize)
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .copied()
            .ok_or(Error::PageOutOfRange {
                index: self.index,
                page: number,
                count: self.page_count(),
            })?;
        let node = PageNode { id };
        if !self.is_page(node) {
            warn!(index = self.index, page = number, "page object lacks /Type /Page");
        }
        Ok(node)
    }

    /// The node's own dictionary
    pub fn dictionary(&self, node: PageNode) -> Result<&Dictionary> {
        self.document
            .get_dictionary(node.id)
            .map_err(|_| {
                self.malformed(format!("page-tree node {:?} is not a dictionary", node.id))
            })
    }

    pub fn is_page(&self, node: PageNode) -> bool {
        self.dictionary(node)
            .ok()
            .and_then(|dict| dict.get(b"Type").ok())
            .and_then(|kind| kind.as_name().ok())
            .is_some_and(|kind| kind == b"Page")
    }

    pub fn parent(&self, node: PageNode) -> Option<PageNode> {
        let dict = self.dictionary(node).ok()?;
        let id = dict.get(b"Parent").ok()?.as_reference().ok()?;
        Some(PageNode { id })
    }

    /// The node's own resource dictionary, if any
    pub fn resources(&self, node: PageNode) -> Option<InheritedResources<'_>> {
        let dict = self.dictionary(node).ok()?;
        match dict.get(b"Resources").ok()? {
            Object::Dictionary(dictionary) => Some(InheritedResources {
                origin: node.id,
                dictionary,
            }),
            Object::Reference(id) => match self.document.get_dictionary(*id) {
                Ok(dictionary) => Some(InheritedResources {
                    origin: *id,
                    dictionary,
                }),
                Err(_) => {
                    warn!(index = self.index, node = ?node.id, "unresolvable /Resources");
                    None
                }
            },
            _ => None,
        }
    }

    /// Resource dictionaries from the node itself up to the page-tree root
    ///
    /// A `/Parent` loop ends the walk at the first repeated node.
    pub fn resource_chain(&self, node: PageNode) -> Vec<InheritedResources<'_>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(node);
        while let Some(node) = current {
            if !visited.insert(node) {
                warn!(index = self.index, node = ?node.id, "cycle in page-tree /Parent links");
                break;
            }
            chain.extend(self.resources(node));
            current = self.parent(node);
        }
        chain
    }

    fn malformed(&self, reason: String) -> Error {
        Error::Format {
            index: self.index,
            reason,
        }
    }
}

/// Resolve and check the document catalog
fn catalog(index: usize, document: &Document) -> Result<&Dictionary> {
    let malformed = |reason: &str| Error::Format {
        index,
        reason: reason.to_string(),
    };

    let root = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| malformed("trailer has no /Root reference"))?;
    let catalog = document
        .get_dictionary(root)
        .map_err(|_| malformed("/Root does not resolve to a dictionary"))?;

    if let Ok(kind) = catalog.get(b"Type").and_then(Object::as_name) {
        if kind != b"Catalog" {
            return Err(malformed("/Root is not a /Catalog"));
        }
    }
    if !catalog.has(b"Pages") {
        return Err(malformed("catalog has no /Pages"));
    }
    Ok(catalog)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::{build_document, PageSpec};
    use lopdf::dictionary;

    #[test]
    fn test_page_lookup_is_one_based() {
        let doc = build_document("1.5", &PageSpec::plain(3));
        let source = SourceDocument::from_document(0, doc).unwrap();

        assert_eq!(source.page_count(), 3);
        let first = source.page(1).unwrap();
        assert!(source.is_page(first));

        assert!(matches!(
            source.page(0),
            Err(Error::PageOutOfRange { page: 0, count: 3, .. })
        ));
        assert!(matches!(
            source.page(4),
            Err(Error::PageOutOfRange { page: 4, count: 3, .. })
        ));
    }

    #[test]
    fn test_parent_is_page_tree_root() {
        let doc = build_document("1.5", &PageSpec::plain(2));
        let source = SourceDocument::from_document(0, doc).unwrap();

        let page = source.page(2).unwrap();
        let parent = source.parent(page).unwrap();
        assert!(!source.is_page(parent));
        assert!(source.parent(parent).is_none());
    }

    #[test]
    fn test_encrypted_trailer_is_rejected() {
        let mut doc = build_document("1.5", &PageSpec::plain(1));
        let encrypt = doc.add_object(dictionary! { "Filter" => "Standard", "V" => 1, "R" => 2 });
        doc.trailer.set("Encrypt", encrypt);

        let result = SourceDocument::from_document(3, doc);
        assert!(matches!(result, Err(Error::Encrypted { index: 3 })));
    }

    #[test]
    fn test_root_must_be_catalog() {
        let mut doc = build_document("1.5", &PageSpec::plain(1));
        let bogus = doc.add_object(dictionary! { "Type" => "Font" });
        doc.trailer.set("Root", bogus);

        let result = SourceDocument::from_document(1, doc);
        assert!(matches!(result, Err(Error::Format { index: 1, .. })));
    }

    #[test]
    fn test_catalog_version_overrides_older_header() {
        let mut doc = build_document("1.4", &PageSpec::plain(1));
        let root = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
        doc.get_dictionary_mut(root)
            .unwrap()
            .set("Version", Object::Name(b"1.7".to_vec()));

        let source = SourceDocument::from_document(0, doc).unwrap();
        assert_eq!(source.version(), PdfVersion::new(1, 7));
    }

    #[test]
    fn test_garbage_bytes_are_a_format_error() {
        let result = SourceDocument::from_bytes(2, b"not a pdf at all");
        assert!(matches!(result, Err(Error::Format { index: 2, .. })));
    }

    #[test]
    fn test_resource_chain_walks_up_from_page() {
        let spec = PageSpec {
            inherited_fonts: true,
            ..PageSpec::with_own_resources(1, "XObject")
        };
        let doc = build_document("1.5", &spec);
        let source = SourceDocument::from_document(0, doc).unwrap();

        let page = source.page(1).unwrap();
        let chain = source.resource_chain(page);
        assert_eq!(chain.len(), 2);
        assert!(chain[0].dictionary.has(b"XObject"));
        assert!(chain[1].dictionary.has(b"Font"));
        assert_eq!(chain[0].origin, page.id());
    }
}
