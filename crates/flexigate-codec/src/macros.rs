//! The [`frame_layout!`] declaration macro.
//!
//! A layout is declared once as a struct whose fields carry their
//! `(byte, bit, width)` position.  The macro emits the struct itself plus the
//! matching [`BitField`][crate::field::BitField] table and the generic
//! decode/encode routines, so the record and its wire map cannot drift apart.

/// Declare a logical record together with its bit-level frame layout.
///
/// Every field type must implement [`FieldValue`][crate::field::FieldValue].
///
/// ```
/// use flexigate_codec::frame_layout;
///
/// frame_layout! {
///     #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
///     pub struct Lamps {
///         red: bool = (0, 0, 1),
///         green: bool = (0, 3, 1),
///     }
/// }
///
/// let lamps = Lamps { red: false, green: true };
/// let mut frame = [0u8; 1];
/// lamps.encode_into(&mut frame);
/// assert_eq!(frame, [0b1000]);
/// assert_eq!(Lamps::decode_from(&frame), lamps);
/// ```
#[macro_export]
macro_rules! frame_layout {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty = ($byte:expr, $bit:expr, $width:expr)
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $name {
            /// Position table of every named signal, in declaration order.
            pub const FIELDS: &'static [$crate::field::BitField] = &[
                $( $crate::field::BitField::new(stringify!($field), $byte, $bit, $width), )*
            ];

            /// Number of bytes the encoded record occupies.
            pub const ENCODED_LEN: usize = $crate::field::encoded_len(Self::FIELDS);

            /// Decode every named signal from `frame`; reserved bits are ignored.
            ///
            /// # Panics
            ///
            /// Panics when `frame` is shorter than [`Self::ENCODED_LEN`].
            pub fn decode_from(frame: &[u8]) -> Self {
                assert!(
                    frame.len() >= Self::ENCODED_LEN,
                    "{} needs {} bytes, got {}",
                    stringify!($name),
                    Self::ENCODED_LEN,
                    frame.len(),
                );
                Self {
                    $(
                        $field: <$ty as $crate::field::FieldValue>::from_raw(
                            $crate::field::BitField::new(stringify!($field), $byte, $bit, $width)
                                .read(frame),
                        ),
                    )*
                }
            }

            /// Write every named signal into `frame`.
            ///
            /// Only the bits owned by the layout are touched.
            ///
            /// # Panics
            ///
            /// Panics when `frame` is shorter than [`Self::ENCODED_LEN`].
            pub fn encode_into(&self, frame: &mut [u8]) {
                assert!(
                    frame.len() >= Self::ENCODED_LEN,
                    "{} needs {} bytes, got {}",
                    stringify!($name),
                    Self::ENCODED_LEN,
                    frame.len(),
                );
                $(
                    $crate::field::BitField::new(stringify!($field), $byte, $bit, $width)
                        .write(frame, $crate::field::FieldValue::to_raw(self.$field));
                )*
            }

            /// `(name, raw value)` pairs in declaration order.
            pub fn named_values(&self) -> Vec<(&'static str, u8)> {
                vec![
                    $( (stringify!($field), $crate::field::FieldValue::to_raw(self.$field)), )*
                ]
            }

            /// Names of the signals whose value differs between `self` and `other`.
            pub fn changed_fields(&self, other: &Self) -> Vec<&'static str> {
                self.named_values()
                    .into_iter()
                    .zip(other.named_values())
                    .filter(|(mine, theirs)| mine.1 != theirs.1)
                    .map(|(mine, _)| mine.0)
                    .collect()
            }
        }
    };
}
