//! Struct decoding from buffers and readers
//!
//! Decoding walks the field table of a schema in order. Before a field is
//! read, the decode hooks registered for it run against the partially decoded
//! instance, so earlier fields can retype later ones. A vector reads as many
//! elements as its length field (already decoded) announces.

use crate::constants::MAX_PREALLOCATED_BYTES;
use crate::error::LayoutError;
use crate::field::Field;
use crate::schema::Schema;
use crate::structure::Struct;
use crate::Result;
use bytes::Bytes;
use std::io::Read;
use std::sync::Arc;

/// A source of bytes consumed front to back
pub trait ByteSource {
    /// Take exactly `n` bytes, or fail with [`LayoutError::IncompleteData`]
    fn take(&mut self, n: usize) -> Result<Bytes>;

    /// Bytes consumed so far
    fn consumed(&self) -> usize;
}

/// Reads from an in-memory buffer
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Start at the front of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The bytes not consumed yet
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

impl ByteSource for SliceSource<'_> {
    fn take(&mut self, n: usize) -> Result<Bytes> {
        let remaining = self.data.len() - self.pos;
        if n > remaining {
            return Err(LayoutError::IncompleteData {
                expected: n,
                actual: remaining,
            });
        }
        let chunk = Bytes::copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(chunk)
    }

    fn consumed(&self) -> usize {
        self.pos
    }
}

/// Reads from a blocking reader, requesting exactly what each field needs
pub struct StreamSource<'a, R: Read + ?Sized> {
    reader: &'a mut R,
    consumed: usize,
}

impl<'a, R: Read + ?Sized> StreamSource<'a, R> {
    /// Wrap `reader`; nothing is read ahead
    pub fn new(reader: &'a mut R) -> Self {
        Self {
            reader,
            consumed: 0,
        }
    }
}

impl<R: Read + ?Sized> ByteSource for StreamSource<'_, R> {
    fn take(&mut self, n: usize) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(n.min(MAX_PREALLOCATED_BYTES));
        Read::take(&mut *self.reader, n as u64).read_to_end(&mut buf)?;
        if buf.len() != n {
            return Err(LayoutError::IncompleteData {
                expected: n,
                actual: buf.len(),
            });
        }
        self.consumed += n;
        Ok(Bytes::from(buf))
    }

    fn consumed(&self) -> usize {
        self.consumed
    }
}

/// Decode one instance of `schema` from `src`
pub(crate) fn decode_struct(schema: &Arc<Schema>, src: &mut dyn ByteSource) -> Result<Struct> {
    let mut instance = schema.instance();
    for (index, name) in schema.field_names().enumerate() {
        for hook in schema.hooks_for(index) {
            hook(&mut instance).map_err(|e| e.in_field(name))?;
        }
        decode_field(&mut instance, index, src).map_err(|e| e.in_field(name))?;
    }
    Ok(instance)
}

fn decode_field(instance: &mut Struct, index: usize, src: &mut dyn ByteSource) -> Result<()> {
    let count = match instance.field_at(index) {
        Field::Vector(v) => Some(instance.length_of(v)?),
        _ => None,
    };
    let field = instance.field_at_mut(index);
    match (field, count) {
        (Field::Vector(v), Some(count)) => v.decode_items(count, src)?,
        (field, _) => field.decode_from(src)?,
    }
    instance.field_at(index).validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_slice_source_short_read() {
        let data = [1u8, 2, 3];
        let mut src = SliceSource::new(&data);
        assert_eq!(src.take(2).unwrap().as_ref(), &[1, 2]);
        assert_eq!(src.remaining(), &[3]);
        assert_eq!(
            src.take(2),
            Err(LayoutError::IncompleteData {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(src.consumed(), 2);
    }

    #[test]
    fn test_stream_source_reads_exactly() {
        let mut reader = Cursor::new(vec![9u8, 8, 7, 6]);
        let mut src = StreamSource::new(&mut reader);
        assert_eq!(src.take(3).unwrap().as_ref(), &[9, 8, 7]);
        assert_eq!(src.consumed(), 3);
        assert!(matches!(
            src.take(2),
            Err(LayoutError::IncompleteData {
                expected: 2,
                actual: 1
            })
        ));
        // Only the requested bytes left the reader
        assert_eq!(reader.position(), 4);
    }

    #[test]
    fn test_zero_length_take() {
        let mut src = SliceSource::new(&[]);
        assert!(src.take(0).unwrap().is_empty());
    }
}
