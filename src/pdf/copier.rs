//! Deep copy of object graphs from a source document into the writer
//!
//! Every indirect reference met while copying is given a fresh identity in
//! the destination. Identities are remembered per (source document, source
//! object), so an object shared by several pages of one document is written
//! once. The memo is cleared with [`ObjectCopier::reset`] after each source
//! document; objects are never shared across documents.

use std::collections::{HashMap, HashSet, VecDeque};

use lopdf::{Dictionary, Object, ObjectId, Stream};
use tracing::{trace, warn};

use super::source::SourceDocument;
use super::writer::DeferredWriter;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct ObjectCopier {
    memo: HashMap<(usize, ObjectId), ObjectId>,
    /// Source objects whose references are written as null
    excluded: HashSet<(usize, ObjectId)>,
    /// Reserved destinations whose source object still has to be copied
    queue: VecDeque<(ObjectId, ObjectId)>,
}

impl ObjectCopier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `value`, writing every object it references into `writer`
    ///
    /// Returns the translated value; direct values stay direct.
    pub fn copy(
        &mut self,
        value: &Object,
        source: &SourceDocument,
        writer: &mut DeferredWriter<'_>,
    ) -> Result<Object> {
        let copied = self.translate(value, source, writer)?;
        self.drain(source, writer)?;
        Ok(copied)
    }

    pub fn copy_dictionary(
        &mut self,
        dict: &Dictionary,
        source: &SourceDocument,
        writer: &mut DeferredWriter<'_>,
    ) -> Result<Dictionary> {
        let copied = self.translate_dictionary(dict, source, writer)?;
        self.drain(source, writer)?;
        Ok(copied)
    }

    /// Destination identity already assigned to a source object, if any
    pub fn lookup(&self, source: &SourceDocument, id: ObjectId) -> Option<ObjectId> {
        self.memo.get(&(source.index(), id)).copied()
    }

    /// Map a source object to a destination the caller binds itself
    ///
    /// References to `from` are retargeted to `to` and `from` is not copied.
    pub fn assign(&mut self, source: &SourceDocument, from: ObjectId, to: ObjectId) {
        self.memo.insert((source.index(), from), to);
    }

    /// Write references to `id` as null instead of copying it
    pub fn exclude(&mut self, source: &SourceDocument, id: ObjectId) {
        self.excluded.insert((source.index(), id));
    }

    /// Forget all memoized identities and exclusions
    pub fn reset(&mut self) {
        self.memo.clear();
        self.excluded.clear();
        self.queue.clear();
    }

    fn drain(&mut self, source: &SourceDocument, writer: &mut DeferredWriter<'_>) -> Result<()> {
        while let Some((from, to)) = self.queue.pop_front() {
            let copied = match source.document().get_object(from) {
                Ok(object) => self.translate(object, source, writer)?,
                Err(_) => {
                    warn!(
                        index = source.index(),
                        object = ?from,
                        "dangling reference copied as null"
                    );
                    Object::Null
                }
            };
            writer.bind(to, copied)?;
        }
        Ok(())
    }

    fn translate(
        &mut self,
        value: &Object,
        source: &SourceDocument,
        writer: &mut DeferredWriter<'_>,
    ) -> Result<Object> {
        Ok(match value {
            Object::Reference(id) if self.excluded.contains(&(source.index(), *id)) => Object::Null,
            Object::Reference(id) => Object::Reference(self.reference(*id, source, writer)?),
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.translate(item, source, writer))
                    .collect::<Result<_>>()?,
            ),
            Object::Dictionary(dict) => {
                Object::Dictionary(self.translate_dictionary(dict, source, writer)?)
            }
            Object::Stream(stream) => {
                // Length is recomputed from the content, an indirect one would be orphaned
                let mut dict = stream.dict.clone();
                dict.remove(b"Length");
                let mut copied = Stream::new(
                    self.translate_dictionary(&dict, source, writer)?,
                    stream.content.clone(),
                );
                copied.allows_compression = stream.allows_compression;
                Object::Stream(copied)
            }
            other => other.clone(),
        })
    }

    fn translate_dictionary(
        &mut self,
        dict: &Dictionary,
        source: &SourceDocument,
        writer: &mut DeferredWriter<'_>,
    ) -> Result<Dictionary> {
        let mut copied = Dictionary::new();
        for (key, value) in dict.iter() {
            copied.set(key.clone(), self.translate(value, source, writer)?);
        }
        Ok(copied)
    }

    fn reference(
        &mut self,
        id: ObjectId,
        source: &SourceDocument,
        writer: &mut DeferredWriter<'_>,
    ) -> Result<ObjectId> {
        let key = (source.index(), id);
        if let Some(&existing) = self.memo.get(&key) {
            return Ok(existing);
        }
        let reserved = writer.reserve()?;
        trace!(index = source.index(), from = ?id, to = ?reserved, "copying object");
        self.memo.insert(key, reserved);
        self.queue.push_back((id, reserved));
        Ok(reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::{build_document, PageSpec};
    use lopdf::dictionary;

    fn source_with(objects: Vec<(ObjectId, Object)>) -> SourceDocument {
        let mut doc = build_document("1.5", &PageSpec::plain(1));
        for (id, object) in objects {
            doc.objects.insert(id, object);
        }
        SourceDocument::from_document(0, doc).unwrap()
    }

    #[test]
    fn test_shared_object_copied_once() {
        let source = source_with(vec![((100, 0), Object::Integer(7))]);
        let mut writer = DeferredWriter::new();
        let mut copier = ObjectCopier::new();

        let value = Object::Array(vec![Object::Reference((100, 0)), Object::Reference((100, 0))]);
        let copied = copier.copy(&value, &source, &mut writer).unwrap();
        let again = copier.copy(&Object::Reference((100, 0)), &source, &mut writer).unwrap();

        let items = copied.as_array().unwrap();
        let first = items[0].as_reference().unwrap();
        assert_eq!(items[1].as_reference().unwrap(), first);
        assert_eq!(again.as_reference().unwrap(), first);
        assert_eq!(writer.len(), 1);
        assert_eq!(writer.get(first).unwrap().as_i64().unwrap(), 7);
    }

    #[test]
    fn test_reset_forgets_identities() {
        let source = source_with(vec![((100, 0), Object::Integer(7))]);
        let mut writer = DeferredWriter::new();
        let mut copier = ObjectCopier::new();

        let first = copier.copy(&Object::Reference((100, 0)), &source, &mut writer).unwrap();
        assert!(copier.lookup(&source, (100, 0)).is_some());

        copier.reset();
        assert!(copier.lookup(&source, (100, 0)).is_none());
        let second = copier.copy(&Object::Reference((100, 0)), &source, &mut writer).unwrap();
        assert_ne!(first.as_reference().unwrap(), second.as_reference().unwrap());
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn test_reference_cycle_terminates() {
        let source = source_with(vec![
            ((100, 0), Object::Dictionary(dictionary! { "Next" => Object::Reference((101, 0)) })),
            ((101, 0), Object::Dictionary(dictionary! { "Next" => Object::Reference((100, 0)) })),
        ]);
        let mut writer = DeferredWriter::new();
        let mut copier = ObjectCopier::new();

        let copied = copier.copy(&Object::Reference((100, 0)), &source, &mut writer).unwrap();
        let a = copied.as_reference().unwrap();
        let next = |id| {
            writer.get(id).unwrap().as_dict().unwrap().get(b"Next").unwrap().as_reference().unwrap()
        };
        let b = next(a);
        let back = next(b);
        assert_eq!(back, a);
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn test_assigned_object_is_not_copied() {
        let source = source_with(vec![((100, 0), Object::Integer(7))]);
        let mut writer = DeferredWriter::new();
        let mut copier = ObjectCopier::new();

        let target = writer.reserve().unwrap();
        copier.assign(&source, (100, 0), target);
        let copied = copier.copy(&Object::Reference((100, 0)), &source, &mut writer).unwrap();

        assert_eq!(copied.as_reference().unwrap(), target);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_excluded_reference_becomes_null() {
        let source = source_with(vec![((100, 0), Object::Integer(7))]);
        let mut writer = DeferredWriter::new();
        let mut copier = ObjectCopier::new();

        copier.exclude(&source, (100, 0));
        let value = Object::Array(vec![Object::Reference((100, 0)), Object::Integer(1)]);
        let copied = copier.copy(&value, &source, &mut writer).unwrap();

        assert_eq!(copied, Object::Array(vec![Object::Null, Object::Integer(1)]));
        assert!(writer.is_empty());

        copier.reset();
        let copied = copier.copy(&Object::Reference((100, 0)), &source, &mut writer).unwrap();
        assert!(copied.as_reference().is_ok());
    }

    #[test]
    fn test_dangling_reference_becomes_null() {
        let source = source_with(vec![]);
        let mut writer = DeferredWriter::new();
        let mut copier = ObjectCopier::new();

        let copied = copier.copy(&Object::Reference((999, 0)), &source, &mut writer).unwrap();
        let id = copied.as_reference().unwrap();
        assert!(matches!(writer.get(id), Some(Object::Null)));
    }

    #[test]
    fn test_stream_dictionary_references_are_retargeted() {
        let source = source_with(vec![((100, 0), Object::Integer(3))]);
        let mut writer = DeferredWriter::new();
        let mut copier = ObjectCopier::new();

        let stream = Stream::new(
            dictionary! { "Extra" => Object::Reference((100, 0)) },
            b"q Q".to_vec(),
        );
        let copied = copier.copy(&Object::Stream(stream), &source, &mut writer).unwrap();

        let copied = copied.as_stream().unwrap();
        assert_eq!(copied.content, b"q Q".to_vec());
        let extra = copied.dict.get(b"Extra").unwrap().as_reference().unwrap();
        assert_eq!(writer.get(extra).unwrap().as_i64().unwrap(), 3);
    }
}
