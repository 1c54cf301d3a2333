//! [`BitField`] – one named signal inside a fixed-size frame.
//!
//! A field is addressed by `(byte, bit, width)`: `byte` is the offset into the
//! frame, `bit` the position of the field's least significant bit within that
//! byte (0 = LSB) and `width` the number of bits.  Multi-bit values are
//! unsigned and little-endian within their byte.
//!
//! Fields never span a byte boundary; [`BitField::new`] rejects such
//! declarations at compile time when used in a `const` context.

// ────────────────────────────────────────────────────────────────────────────
// BitField
// ────────────────────────────────────────────────────────────────────────────

/// Static position of a named signal inside a frame.
///
/// # Example
///
/// ```
/// use flexigate_codec::BitField;
///
/// const CASE: BitField = BitField::new("laser_case", 0, 0, 5);
/// const FAR_FRONT: BitField = BitField::new("far_front", 0, 5, 1);
///
/// let mut frame = [0u8; 2];
/// FAR_FRONT.write(&mut frame, 1);
/// CASE.write(&mut frame, 17);
///
/// assert_eq!(CASE.read(&frame), 17);
/// assert_eq!(FAR_FRONT.read(&frame), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField {
    /// Signal name as documented in the controller's memory map.
    pub name: &'static str,
    /// Byte offset into the frame.
    pub byte: usize,
    /// Bit offset of the least significant bit within `byte`.
    pub bit: u8,
    /// Number of bits (1..=8).
    pub width: u8,
}

impl BitField {
    /// Declare a field.
    ///
    /// # Panics
    ///
    /// Panics (at compile time in `const` items) when `width` is zero or the
    /// field would cross the byte boundary.
    pub const fn new(name: &'static str, byte: usize, bit: u8, width: u8) -> Self {
        assert!(width >= 1 && width <= 8, "bit field width must be 1..=8");
        assert!(bit as u32 + width as u32 <= 8, "bit field crosses a byte boundary");
        Self {
            name,
            byte,
            bit,
            width,
        }
    }

    /// Largest raw value the field can hold.
    pub const fn max_value(&self) -> u8 {
        ((1u16 << self.width) - 1) as u8
    }

    /// In-byte mask covering exactly this field's bits.
    pub const fn mask(&self) -> u8 {
        self.max_value() << self.bit
    }

    /// `true` when both fields claim at least one common bit.
    pub const fn overlaps(&self, other: &BitField) -> bool {
        self.byte == other.byte && (self.mask() & other.mask()) != 0
    }

    /// Extract the raw field value from `frame`.
    ///
    /// # Panics
    ///
    /// Panics when `frame` is shorter than `byte + 1`.  The layouts in this
    /// crate assert at compile time that they fit the [`Frame`] types, so the
    /// frame-level functions never hit this.
    ///
    /// [`Frame`]: crate::frame::Frame
    pub fn read(&self, frame: &[u8]) -> u8 {
        (frame[self.byte] & self.mask()) >> self.bit
    }

    /// Store `value` into `frame`, leaving every bit outside the field intact.
    ///
    /// Bits of `value` above the field width are discarded.
    ///
    /// # Panics
    ///
    /// Panics when `frame` is shorter than `byte + 1`.
    pub fn write(&self, frame: &mut [u8], value: u8) {
        let mask = self.mask();
        let slot = &mut frame[self.byte];
        *slot = (*slot & !mask) | ((value & self.max_value()) << self.bit);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Layout checks (usable in const assertions)
// ────────────────────────────────────────────────────────────────────────────

/// Number of bytes a layout occupies (highest used byte offset + 1).
pub const fn encoded_len(fields: &[BitField]) -> usize {
    let mut len = 0;
    let mut i = 0;
    while i < fields.len() {
        if fields[i].byte + 1 > len {
            len = fields[i].byte + 1;
        }
        i += 1;
    }
    len
}

/// `true` when no two fields of the layout share a bit.
pub const fn is_disjoint(fields: &[BitField]) -> bool {
    let mut i = 0;
    while i < fields.len() {
        let mut j = i + 1;
        while j < fields.len() {
            if fields[i].overlaps(&fields[j]) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

/// Mask of all bits claimed by the layout in byte `byte`.
pub fn used_mask(fields: &[BitField], byte: usize) -> u8 {
    fields
        .iter()
        .filter(|f| f.byte == byte)
        .fold(0, |acc, f| acc | f.mask())
}

// ────────────────────────────────────────────────────────────────────────────
// FieldValue
// ────────────────────────────────────────────────────────────────────────────

/// Conversion between a field's typed value and its raw bits.
///
/// `from_raw` receives a value already masked to the field width and must be
/// total: every raw pattern maps to some value.
pub trait FieldValue: Copy {
    fn to_raw(self) -> u8;
    fn from_raw(raw: u8) -> Self;
}

impl FieldValue for bool {
    fn to_raw(self) -> u8 {
        u8::from(self)
    }

    fn from_raw(raw: u8) -> Self {
        raw != 0
    }
}
