//! In-memory PDF fixtures for unit tests

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Shape of a generated fixture document
#[derive(Debug, Clone)]
pub struct PageSpec {
    pub count: usize,
    /// Prefix of each page's text, pages read `<label>-<n>`
    pub label: String,
    /// Put a `/Font` resource on the page-tree root
    pub inherited_fonts: bool,
    /// Give every page an inline `/Resources` with this single key
    pub own_resource_key: Option<&'static str>,
    /// Point every page at one shared, indirect `/Resources` object
    pub shared_resources: bool,
}

impl PageSpec {
    pub fn plain(count: usize) -> Self {
        Self {
            count,
            label: "P".to_string(),
            inherited_fonts: false,
            own_resource_key: None,
            shared_resources: false,
        }
    }

    pub fn with_own_resources(count: usize, key: &'static str) -> Self {
        Self {
            own_resource_key: Some(key),
            ..Self::plain(count)
        }
    }

    pub fn labelled(self, label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..self
        }
    }
}

pub fn build_document(version: &str, spec: &PageSpec) -> Document {
    let mut doc = Document::with_version(version);
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let shared_id: Option<ObjectId> = spec
        .shared_resources
        .then(|| doc.add_object(dictionary! { "Font" => dictionary! { "F1" => font_id } }));

    let mut kids = Vec::new();
    for n in 1..=spec.count {
        let text = format!("BT /F1 12 Tf ({}-{}) Tj ET", spec.label, n);
        let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        if let Some(key) = spec.own_resource_key {
            let resource = doc.add_object(dictionary! { "Marker" => n as i64 });
            let mut inner = Dictionary::new();
            inner.set(format!("R{}", n), resource);
            let mut resources = Dictionary::new();
            resources.set(key, inner);
            page.set("Resources", resources);
        }
        if let Some(shared) = shared_id {
            page.set("Resources", shared);
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages = dictionary! {
        "Type" => "Pages",
        "Count" => spec.count as i64,
        "Kids" => kids,
    };
    if spec.inherited_fonts {
        pages.set("Resources", dictionary! { "Font" => dictionary! { "F1" => font_id } });
    }
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

pub fn build_pdf(version: &str, spec: &PageSpec) -> Vec<u8> {
    let mut doc = build_document(version, spec);
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("fixture saves");
    buffer
}

/// Text of every page in reading order
pub fn page_labels(bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(bytes).expect("output parses");
    doc.get_pages()
        .into_values()
        .map(|page_id| page_label(&doc, page_id))
        .collect()
}

pub fn page_label(doc: &Document, page_id: ObjectId) -> String {
    let page = doc.get_dictionary(page_id).expect("page dictionary");
    let content_id = page
        .get(b"Contents")
        .and_then(Object::as_reference)
        .expect("contents reference");
    let stream = doc
        .get_object(content_id)
        .and_then(Object::as_stream)
        .expect("content stream");
    let text = String::from_utf8_lossy(&stream.content);
    let start = text.find('(').expect("text operand") + 1;
    let end = text.find(')').expect("text operand");
    text[start..end].to_string()
}

/// Kids of the root container, each with the page ids it holds
pub fn groups(bytes: &[u8]) -> (Document, Vec<(ObjectId, Vec<ObjectId>)>) {
    let doc = Document::load_mem(bytes).expect("output parses");
    let root = doc
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .expect("catalog /Pages");
    let kids = references(doc.get_dictionary(root).expect("root container"), b"Kids");
    let groups = kids
        .into_iter()
        .map(|group| {
            let pages = references(doc.get_dictionary(group).expect("group"), b"Kids");
            (group, pages)
        })
        .collect();
    (doc, groups)
}

fn references(dict: &Dictionary, key: &[u8]) -> Vec<ObjectId> {
    dict.get(key)
        .and_then(Object::as_array)
        .expect("kids array")
        .iter()
        .map(|kid| kid.as_reference().expect("kid reference"))
        .collect()
}
