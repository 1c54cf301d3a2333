//! `flexigate-codec` – Payload Codec
//!
//! Converts between the safety controller's fixed-layout binary data sets and
//! named-field logical records.
//!
//! # Modules
//!
//! - [`field`] – [`BitField`]: a `(byte, bit, width)` position plus masked
//!   read/write, the const layout checks, and the [`FieldValue`] conversion
//!   trait.
//! - [`macros`] – [`frame_layout!`]: declares a record struct and its bit
//!   table in one place.
//! - [`layout`] – the controller memory map: [`InputRecord`],
//!   [`OutputRecord`] and the [`LaserCase`] selector.
//! - [`frame`] – fixed-length [`InputFrame`] / [`OutputFrame`] payloads and
//!   the total decode/encode functions.
//!
//! Encoding is symmetric: `decode(encode(r)) == r` for every record, and
//! reserved bits are always written as zero.  The [`Frame`]-level functions
//! are total; the slice-level `decode_from` / `encode_into` generated by
//! [`frame_layout!`] panic on a slice shorter than the layout.

pub mod error;
pub mod field;
pub mod frame;
pub mod layout;
pub mod macros;

pub use error::CodecError;
pub use field::{BitField, FieldValue};
pub use frame::{
    decode_input, decode_output, encode_input, encode_output, Frame, InputFrame, OutputFrame,
    INPUT_FRAME_LEN, OUTPUT_FRAME_LEN,
};
pub use layout::{InputRecord, LaserCase, OutputRecord};
