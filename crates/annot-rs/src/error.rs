//! Error types shared across the crate.
//!
//! Format and shape problems are raised immediately; numeric degeneracies
//! (zero-area unions, empty run lists) resolve to defined values in the
//! operations themselves and never surface here.

use crate::rle::ScanOrder;

/// Errors produced by mask and suppression operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Operands declare incompatible canvas dimensions.
    #[error("canvas shape mismatch: expected {expected_h}x{expected_w}, got {got_h}x{got_w}")]
    ShapeMismatch {
        expected_h: u32,
        expected_w: u32,
        got_h: u32,
        got_w: u32,
    },

    /// Parallel input arrays disagree in length.
    #[error("input length mismatch: {name} has {got} entries, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    /// A set operation received zero masks.
    #[error("empty input: at least one mask is required")]
    EmptyInput,

    /// A byte-encoded RLE failed to decode to a consistent run sequence.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// An unsupported representation or representation combination was
    /// requested, e.g. merging masks with different scan orders.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

impl Error {
    pub(crate) fn shape_mismatch(expected: (u32, u32), got: (u32, u32)) -> Self {
        Error::ShapeMismatch {
            expected_h: expected.0,
            expected_w: expected.1,
            got_h: got.0,
            got_w: got.1,
        }
    }

    pub(crate) fn order_mismatch(expected: ScanOrder, got: ScanOrder) -> Self {
        Error::InvalidFormat(format!(
            "scan order mismatch: expected {expected:?}, got {got:?}"
        ))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
