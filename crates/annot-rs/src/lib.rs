//! Geometric data structures for computer-vision annotations.
//!
//! The core of the crate is a run-length-encoded mask engine (encode,
//! decode, set operations, and in-encoding-space translation) together
//! with non-maximum suppression over detection boxes, in both the classic
//! greedy form and a divide-and-conquer spatial form for dense candidate
//! sets. Masks round-trip bit-for-bit through the MS-COCO compressed
//! `counts` string format.

pub mod alpha;
pub mod error;
pub mod mask;
pub mod nms;
pub mod ops;
pub mod poly;
pub mod rle;
pub mod translate;

pub use error::{Error, Result};
pub use mask::{Mask, MaskFormat, MaskRecord, RecordCounts};
pub use nms::{daq_nms, greedy_nms, non_max_suppression, DaqParams, NmsMethod};
pub use rle::{BytesRle, Raster, Rle, ScanOrder};
pub use translate::rle_translate;
