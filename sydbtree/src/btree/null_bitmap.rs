//! Null bitmaps
//!
//! Every key and value object starts (after its type tag) with one bit per field recording
//! whether the field is NULL. Bit `i` lives in byte `i / 8` under mask `1 << (i % 8)`.
//!
//! The bitmap never owns its bytes: [`NullBitmap`] wraps a borrowed slice (read only for
//! `&[u8]`, read write for `&mut [u8]`) and the free functions work on raw slices in place.
//! Field indices are only checked in debug builds.

/// Bytes needed to hold `field_count` bits.
pub const fn size(field_count: usize) -> usize {
    field_count.div_ceil(u8::BITS as usize)
}

/// Offset of the first byte after a bitmap of `field_count` bits.
pub const fn tail(field_count: usize) -> usize {
    size(field_count)
}

/// Clear every bit of a bitmap of `field_count` bits.
pub fn clear(bytes: &mut [u8], field_count: usize) {
    bytes[..size(field_count)].fill(0);
}

/// Is any bit set?
pub fn exist_null(bytes: &[u8], field_count: usize) -> bool {
    let len = size(field_count);
    let full = field_count / u8::BITS as usize;
    if bytes[..full].iter().any(|b| *b != 0) {
        return true;
    }
    // Ignore bits past field_count in the last byte
    if len > full {
        let mask = (1u8 << (field_count % u8::BITS as usize)) - 1;
        return bytes[full] & mask != 0;
    }
    false
}

/// Is field `index` NULL?
pub fn is_null(bytes: &[u8], field_count: usize, index: usize) -> bool {
    debug_assert!(index < field_count, "field {index} out of {field_count}");
    let (byte, mask) = locate(index);
    bytes[byte] & mask != 0
}

/// Mark field `index` NULL.
pub fn on(bytes: &mut [u8], field_count: usize, index: usize) {
    debug_assert!(index < field_count, "field {index} out of {field_count}");
    let (byte, mask) = locate(index);
    bytes[byte] |= mask;
}

/// Mark field `index` not NULL.
pub fn off(bytes: &mut [u8], field_count: usize, index: usize) {
    debug_assert!(index < field_count, "field {index} out of {field_count}");
    let (byte, mask) = locate(index);
    bytes[byte] &= !mask;
}

fn locate(index: usize) -> (usize, u8) {
    (index / u8::BITS as usize, 1 << (index % u8::BITS as usize))
}

/// A view over the null bitmap at the start of `bytes`.
#[derive(Debug)]
pub struct NullBitmap<B> {
    bytes: B,
    field_count: usize,
}

impl<B: AsRef<[u8]>> NullBitmap<B> {
    /// View the bitmap for `field_count` fields at the start of `bytes`.
    pub fn new(bytes: B, field_count: usize) -> Self {
        debug_assert!(bytes.as_ref().len() >= size(field_count));
        Self { bytes, field_count }
    }

    /// Number of fields covered.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Size of the bitmap in bytes.
    pub fn size(&self) -> usize {
        size(self.field_count)
    }

    /// Is any field NULL?
    pub fn exist_null(&self) -> bool {
        exist_null(self.bytes.as_ref(), self.field_count)
    }

    /// Is field `index` NULL?
    pub fn is_null(&self, index: usize) -> bool {
        is_null(self.bytes.as_ref(), self.field_count, index)
    }

    /// The bitmap bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes.as_ref()[..self.size()]
    }

    /// The bytes following the bitmap, where field data begins.
    pub fn tail(&self) -> &[u8] {
        &self.bytes.as_ref()[self.size()..]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> NullBitmap<B> {
    /// Mark every field not NULL.
    pub fn clear(&mut self) {
        clear(self.bytes.as_mut(), self.field_count)
    }

    /// Mark field `index` NULL.
    pub fn on(&mut self, index: usize) {
        on(self.bytes.as_mut(), self.field_count, index)
    }

    /// Mark field `index` not NULL.
    pub fn off(&mut self, index: usize) {
        off(self.bytes.as_mut(), self.field_count, index)
    }

    /// The bytes following the bitmap, where field data begins.
    pub fn tail_mut(&mut self) -> &mut [u8] {
        let size = self.size();
        &mut self.bytes.as_mut()[size..]
    }
}
