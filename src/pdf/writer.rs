//! Deferred object-graph writer
//!
//! Objects are given their identities as soon as they are needed (often before
//! their content exists), buffered in binding order, and serialized in a single
//! terminal [`DeferredWriter::flush`] together with the cross-reference table.
//!
//! ```
//! use lopdf::{dictionary, Object};
//! use pdf_collate::pdf::{DeferredWriter, PdfVersion};
//!
//! let mut writer = DeferredWriter::new();
//! let pages = writer.reserve().unwrap();
//! let catalog = writer
//!     .add(dictionary! { "Type" => "Catalog", "Pages" => pages })
//!     .unwrap();
//! writer
//!     .bind(
//!         pages,
//!         dictionary! { "Type" => "Pages", "Kids" => Vec::<Object>::new(), "Count" => 0 },
//!     )
//!     .unwrap();
//! writer.flush(PdfVersion::new(1, 7), catalog).unwrap();
//! assert!(writer.bytes().starts_with(b"%PDF-1.7\n"));
//! ```

use std::collections::{BTreeSet, HashMap};

use lopdf::{Object, ObjectId};
use tracing::trace;

use super::encode::write_object;
use super::version::PdfVersion;
use crate::error::{Error, Result};

/// Comment line with high-bit bytes, marking the file as binary
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Generation number of every object this writer emits
const GENERATION: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Flushed,
    Closed,
}

/// Output buffer, either owned by the writer or borrowed from the caller
#[derive(Debug)]
enum Sink<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a mut Vec<u8>),
}

impl Sink<'_> {
    fn buffer(&mut self) -> &mut Vec<u8> {
        match self {
            Sink::Owned(buffer) => buffer,
            Sink::Borrowed(buffer) => buffer,
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            Sink::Owned(buffer) => buffer,
            Sink::Borrowed(buffer) => buffer,
        }
    }
}

/// Writer that allocates object numbers up front and serializes once
#[derive(Debug)]
pub struct DeferredWriter<'a> {
    sink: Sink<'a>,
    /// Length of the sink when this writer attached to it
    base: usize,
    state: WriterState,
    last_number: u32,
    reserved: BTreeSet<u32>,
    pending: Vec<(ObjectId, Object)>,
    positions: HashMap<ObjectId, usize>,
}

impl DeferredWriter<'static> {
    /// Create a writer that owns its output buffer
    pub fn new() -> Self {
        Self::from_sink(Sink::Owned(Vec::new()))
    }
}

impl Default for DeferredWriter<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> DeferredWriter<'a> {
    /// Create a writer appending to a caller-owned buffer
    ///
    /// Byte offsets in the cross-reference table are relative to the buffer's
    /// length at this point, so the document may follow existing data.
    pub fn with_buffer(buffer: &'a mut Vec<u8>) -> Self {
        Self::from_sink(Sink::Borrowed(buffer))
    }

    fn from_sink(sink: Sink<'a>) -> Self {
        let base = sink.as_slice().len();
        Self {
            sink,
            base,
            state: WriterState::Open,
            last_number: 0,
            reserved: BTreeSet::new(),
            pending: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Number of objects bound so far
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Reserve the next object number; it must later be bound exactly once
    pub fn reserve_number(&mut self) -> Result<u32> {
        self.ensure_open("reserve")?;
        let number = self.allocate();
        self.reserved.insert(number);
        trace!(number, "reserved object number");
        Ok(number)
    }

    /// Reserve the next object number and return it as a forward reference
    pub fn reserve(&mut self) -> Result<ObjectId> {
        Ok((self.reserve_number()?, GENERATION))
    }

    /// Bind `value` to the next sequential object number
    pub fn add<T: Into<Object>>(&mut self, value: T) -> Result<ObjectId> {
        self.ensure_open("add")?;
        let id = (self.allocate(), GENERATION);
        self.push(id, value.into());
        Ok(id)
    }

    /// Bind `value` to a previously reserved identity, consuming the reservation
    pub fn bind<T: Into<Object>>(&mut self, id: ObjectId, value: T) -> Result<()> {
        self.ensure_open("bind")?;
        if id.1 != GENERATION || !self.reserved.remove(&id.0) {
            return Err(Error::InvariantViolation(format!(
                "object {} {} is not reserved",
                id.0, id.1
            )));
        }
        self.push(id, value.into());
        Ok(())
    }

    /// Look up a bound value
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.positions.get(&id).map(|&index| &self.pending[index].1)
    }

    /// Replace a bound value in place, returning the previous one
    ///
    /// The object keeps its original position in the output.
    pub fn replace<T: Into<Object>>(&mut self, id: ObjectId, value: T) -> Result<Object> {
        self.ensure_open("replace")?;
        let index = *self.positions.get(&id).ok_or_else(|| {
            Error::InvariantViolation(format!("object {} {} was never bound", id.0, id.1))
        })?;
        Ok(std::mem::replace(&mut self.pending[index].1, value.into()))
    }

    /// Serialize header, every bound object, the xref table and the trailer
    ///
    /// May be called once. Every reservation must have been bound and `root`
    /// must name a bound object.
    pub fn flush(&mut self, version: PdfVersion, root: ObjectId) -> Result<()> {
        self.ensure_open("flush")?;
        if !self.reserved.is_empty() {
            return Err(Error::InvariantViolation(format!(
                "reserved objects never bound: {:?}",
                self.reserved
            )));
        }
        if !self.positions.contains_key(&root) {
            return Err(Error::InvariantViolation(format!(
                "root object {} {} was never bound",
                root.0, root.1
            )));
        }

        let base = self.base;
        let pending = std::mem::take(&mut self.pending);
        let out = self.sink.buffer();

        out.extend_from_slice(format!("%PDF-{}\n", version).as_bytes());
        out.extend_from_slice(BINARY_MARKER);

        let mut offsets = vec![0usize; self.last_number as usize + 1];
        for ((number, generation), object) in &pending {
            offsets[*number as usize] = out.len() - base;
            out.extend_from_slice(format!("{} {} obj\n", number, generation).as_bytes());
            write_object(out, object);
            out.extend_from_slice(b"\nendobj\n");
        }

        let size = offsets.len();
        let xref_offset = out.len() - base;
        out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in &offsets[1..] {
            out.extend_from_slice(format!("{:010} {:05} n \n", offset, GENERATION).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<</Size {}/Root {} {} R>>\nstartxref\n{}\n%%EOF\n",
                size, root.0, root.1, xref_offset
            )
            .as_bytes(),
        );

        self.pending = pending;
        self.state = WriterState::Flushed;
        Ok(())
    }

    /// Bytes produced so far by this writer
    pub fn bytes(&self) -> &[u8] {
        &self.sink.as_slice()[self.base..]
    }

    /// Release the writer; an owned buffer is freed, a borrowed one is left to its owner
    pub fn close(mut self) {
        self.state = WriterState::Closed;
    }

    fn allocate(&mut self) -> u32 {
        self.last_number += 1;
        self.last_number
    }

    fn push(&mut self, id: ObjectId, object: Object) {
        self.positions.insert(id, self.pending.len());
        self.pending.push((id, object));
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            state => Err(Error::InvariantViolation(format!(
                "cannot {} on a writer that is {:?}",
                operation, state
            ))),
        }
    }
}
