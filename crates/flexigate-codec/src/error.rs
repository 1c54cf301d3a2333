use thiserror::Error;

/// Errors raised while constructing codec values.
///
/// Decoding and encoding themselves are total and never fail; only building a
/// frame from a slice of the wrong length or a selector outside its range is
/// rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("laser case {0} exceeds the 5-bit selector range (0..=31)")]
    LaserCaseOutOfRange(u8),

    #[error("frame length mismatch: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },
}
