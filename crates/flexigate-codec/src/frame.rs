//! Fixed-length raw frames and the record ⇄ frame conversions.

use std::fmt;

use crate::error::CodecError;
use crate::layout::{InputRecord, OutputRecord};

/// Payload capacity of the controller → gateway data set.
pub const INPUT_FRAME_LEN: usize = 50;

/// Payload capacity of the gateway → controller data set.
pub const OUTPUT_FRAME_LEN: usize = 10;

/// A raw payload of exactly `N` bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame<const N: usize>([u8; N]);

/// Controller → gateway payload.
pub type InputFrame = Frame<INPUT_FRAME_LEN>;

/// Gateway → controller payload.
pub type OutputFrame = Frame<OUTPUT_FRAME_LEN>;

impl<const N: usize> Frame<N> {
    /// Payload length in bytes.
    pub const LEN: usize = N;

    /// Wrap an owned byte array.
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// An all-zero frame.
    pub const fn zeroed() -> Self {
        Self([0; N])
    }

    /// Copy a frame out of `bytes`.
    ///
    /// # Errors
    ///
    /// [`CodecError::FrameLength`] when `bytes` is not exactly `N` long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        let array: [u8; N] = bytes.try_into().map_err(|_| CodecError::FrameLength {
            expected: N,
            actual: bytes.len(),
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8; N] {
        &mut self.0
    }
}

impl<const N: usize> Default for Frame<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const N: usize> fmt::Debug for Frame<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame<{N}>[")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        write!(f, "]")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Record ⇄ frame
// ────────────────────────────────────────────────────────────────────────────

/// Decode an inbound payload.  Total: every byte pattern yields a record.
pub fn decode_input(frame: &InputFrame) -> InputRecord {
    InputRecord::decode_from(frame.as_bytes())
}

/// Encode an input record; used by simulated controllers and tests.
pub fn encode_input(record: &InputRecord) -> InputFrame {
    let mut frame = InputFrame::zeroed();
    record.encode_into(frame.as_mut_bytes());
    frame
}

/// Encode an outbound record.  Reserved bits are always zero.
pub fn encode_output(record: &OutputRecord) -> OutputFrame {
    let mut frame = OutputFrame::zeroed();
    record.encode_into(frame.as_mut_bytes());
    frame
}

/// Decode an outbound payload back into its record.
pub fn decode_output(frame: &OutputFrame) -> OutputRecord {
    OutputRecord::decode_from(frame.as_bytes())
}
