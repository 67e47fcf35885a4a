//! Object buffers
//!
//! Scratch space for assembling a direct key or value object before it is written to a page.
//! The archived form is:
//!
//! ```text
//! key:   | type tag | null bitmap | field 1 | field 2 | ...
//! value: | type tag | leaf page id | key index | null bitmap | field 1 | ...
//! ```
//!
//! Each field takes exactly its archive size: fixed fields their type's size, inside variable
//! fields a length byte plus their maximum length, outside fields (and arrays) an object id.

use std::ptr::NonNull;

use thiserror::Error;

use super::file_parameter::{FieldArray, FieldDescriptor, FileParameter};
use super::null_bitmap::NullBitmap;
use crate::data::{
    DataType, FieldValue, OBJECT_TYPE_ARCHIVE_SIZE, PAGE_ID_ARCHIVE_SIZE, U32_ARCHIVE_SIZE,
};
use crate::memory::{MemoryError, MemoryPool};

/// Errors raised while filling an object buffer.
#[derive(Error, Debug)]
pub enum ObjectError {
    /// The pool couldn't supply the buffer
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// No such field in this object
    #[error("field {0} out of range")]
    FieldOutOfRange(usize),

    /// The value has the wrong type or doesn't fit
    #[error("value doesn't fit field {0}")]
    Mismatch(usize),
}

/// Which object a buffer holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// Direct key object
    Key,
    /// Direct value object
    Value,
}

impl ObjectKind {
    fn header_size(self) -> usize {
        match self {
            ObjectKind::Key => OBJECT_TYPE_ARCHIVE_SIZE,
            ObjectKind::Value => OBJECT_TYPE_ARCHIVE_SIZE + PAGE_ID_ARCHIVE_SIZE + U32_ARCHIVE_SIZE,
        }
    }
}

/// A pool backed direct object.
#[derive(Debug)]
pub struct ObjectBuffer<'p> {
    pool: &'p MemoryPool,
    ptr: NonNull<u8>,
    size: usize,
    kind: ObjectKind,
    fields: FieldArray<FieldDescriptor>,
    offsets: FieldArray<usize>,
}

// The buffer is exclusively owned
unsafe impl Send for ObjectBuffer<'_> {}

impl<'p> ObjectBuffer<'p> {
    /// A zeroed direct key object of `file`.
    pub fn new_key(pool: &'p MemoryPool, file: &FileParameter) -> Result<Self, ObjectError> {
        Self::new(pool, ObjectKind::Key, file.key_fields())
    }

    /// A zeroed direct value object of `file`.
    pub fn new_value(pool: &'p MemoryPool, file: &FileParameter) -> Result<Self, ObjectError> {
        Self::new(pool, ObjectKind::Value, file.value_fields())
    }

    fn new(
        pool: &'p MemoryPool,
        kind: ObjectKind,
        fields: &[FieldDescriptor],
    ) -> Result<Self, ObjectError> {
        let mut offset = kind.header_size() + super::null_bitmap::size(fields.len());
        let mut offsets = FieldArray::with_capacity(fields.len());
        for field in fields {
            offsets.push(offset);
            offset += field.archive_size();
        }
        let size = offset;
        let ptr = pool.allocate(size)?;
        // SAFETY: the pool handed out at least `size` bytes
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(Self {
            pool,
            ptr,
            size,
            kind,
            fields: fields.iter().copied().collect(),
            offsets,
        })
    }

    /// Key or value.
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Archived size in bytes.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Always false: every object has a type tag.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of fields held.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// The archived bytes.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `ptr` owns `size` initialised bytes for the lifetime of `self`
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// The archived bytes, writable.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` makes the access exclusive
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// The object type tag.
    pub fn object_type(&self) -> u8 {
        self.as_bytes()[0]
    }

    /// Set the object type tag.
    pub fn set_object_type(&mut self, object_type: u8) {
        self.as_bytes_mut()[0] = object_type;
    }

    /// Leaf page id and key information index of a value object.
    pub fn set_key_location(&mut self, page_id: u32, key_index: u32) {
        if self.kind != ObjectKind::Value {
            return;
        }
        let start = OBJECT_TYPE_ARCHIVE_SIZE;
        let bytes = self.as_bytes_mut();
        bytes[start..start + PAGE_ID_ARCHIVE_SIZE].copy_from_slice(&page_id.to_be_bytes());
        bytes[start + PAGE_ID_ARCHIVE_SIZE..start + PAGE_ID_ARCHIVE_SIZE + U32_ARCHIVE_SIZE]
            .copy_from_slice(&key_index.to_be_bytes());
    }

    /// Read only view of the null bitmap.
    pub fn null_bitmap(&self) -> NullBitmap<&[u8]> {
        let start = self.kind.header_size();
        NullBitmap::new(&self.as_bytes()[start..], self.fields.len())
    }

    /// Writable view of the null bitmap.
    pub fn null_bitmap_mut(&mut self) -> NullBitmap<&mut [u8]> {
        let start = self.kind.header_size();
        let count = self.fields.len();
        NullBitmap::new(&mut self.as_bytes_mut()[start..], count)
    }

    /// Offset of field `index` (0 is the first key or value field).
    pub fn field_offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    /// Archived bytes of field `index`.
    pub fn field(&self, index: usize) -> Option<&[u8]> {
        let range = self.field_range(index)?;
        Some(&self.as_bytes()[range])
    }

    fn field_range(&self, index: usize) -> Option<std::ops::Range<usize>> {
        let start = self.field_offset(index)?;
        Some(start..start + self.fields[index].archive_size())
    }

    /// Store `value` in field `index`, updating the null bitmap.
    ///
    /// Outside fields take the [`FieldValue::ObjectId`] of the object holding the data.
    pub fn set_field(&mut self, index: usize, value: &FieldValue) -> Result<(), ObjectError> {
        let range = self
            .field_range(index)
            .ok_or(ObjectError::FieldOutOfRange(index))?;
        let field = self.fields[index];

        if value.is_null() {
            self.as_bytes_mut()[range].fill(0);
            self.null_bitmap_mut().on(index);
            return Ok(());
        }

        let slot = &mut self.as_bytes_mut()[range];
        let written = match (value, field.outside || field.array.is_some()) {
            (FieldValue::ObjectId(_), true) => value.archive_fixed(slot),
            (_, true) => None,
            (FieldValue::String(s), false) if !field.fixed => {
                // Length byte, then the data padded to the maximum length
                let bytes = s.as_bytes();
                (bytes.len() < slot.len()).then(|| {
                    slot.fill(0);
                    slot[0] = bytes.len() as u8;
                    slot[1..=bytes.len()].copy_from_slice(bytes);
                    slot.len()
                })
            }
            (value, false) if field.fixed && has_type(value, field.data_type) => {
                value.archive_fixed(slot)
            }
            _ => None,
        };
        if written != Some(slot.len()) {
            return Err(ObjectError::Mismatch(index));
        }
        self.null_bitmap_mut().off(index);
        Ok(())
    }
}

fn has_type(value: &FieldValue, data_type: DataType) -> bool {
    matches!(
        (value, data_type),
        (FieldValue::Integer(_), DataType::Integer)
            | (FieldValue::UnsignedInteger(_), DataType::UnsignedInteger)
            | (FieldValue::Integer64(_), DataType::Integer64)
            | (FieldValue::UnsignedInteger64(_), DataType::UnsignedInteger64)
            | (FieldValue::Float(_), DataType::Float)
            | (FieldValue::Double(_), DataType::Double)
            | (FieldValue::Date(_), DataType::Date)
            | (FieldValue::DateTime(_), DataType::DateTime)
            | (FieldValue::ObjectId(_), DataType::ObjectId)
    )
}

impl Drop for ObjectBuffer<'_> {
    fn drop(&mut self) {
        // SAFETY: allocated from `pool` with `size` in `new` and never handed out
        if let Err(err) = unsafe { self.pool.free(self.ptr.as_ptr(), self.size) } {
            tracing::error!("failed to return object buffer: {err}");
        }
    }
}
