//! Run-length codec for binary masks.
//!
//! A mask raster is linearized in a declared scan order and stored as
//! alternating background/foreground run lengths, starting with background
//! (a leading zero count means the mask starts with foreground). The array
//! form keeps counts as plain integers; the compact byte form packs them
//! with the COCO variable-length scheme so encoded strings are
//! interchangeable with pycocotools.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Order in which a 2-D grid is linearized into the run sequence.
///
/// The choice decides which pixels are adjacent in run space, so every
/// operation preserves it. The compressed byte form is always column-major
/// per the COCO convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOrder {
    /// "C" order: consecutive indices walk along a row.
    RowMajor,
    /// "F" order: consecutive indices walk down a column.
    ColumnMajor,
}

impl ScanOrder {
    /// Length of one contiguous line in this order (w for row-major,
    /// h for column-major).
    pub(crate) fn line_len(self, h: u32, w: u32) -> usize {
        match self {
            ScanOrder::RowMajor => w as usize,
            ScanOrder::ColumnMajor => h as usize,
        }
    }
}

/// Dense binary mask with an owned contiguous buffer.
///
/// Pixel (x, y) lives at `y * w + x` in row-major order and `x * h + y` in
/// column-major order. Nonzero bytes are foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub h: u32,
    pub w: u32,
    pub order: ScanOrder,
    pub data: Vec<u8>,
}

impl Raster {
    pub fn new(h: u32, w: u32, order: ScanOrder, data: Vec<u8>) -> Result<Self> {
        let n = h as usize * w as usize;
        if data.len() != n {
            return Err(Error::LengthMismatch {
                name: "raster data",
                expected: n,
                got: data.len(),
            });
        }
        Ok(Raster { h, w, order, data })
    }

    pub fn zeros(h: u32, w: u32, order: ScanOrder) -> Self {
        Raster {
            h,
            w,
            order,
            data: vec![0; h as usize * w as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        match self.order {
            ScanOrder::RowMajor => y as usize * self.w as usize + x as usize,
            ScanOrder::ColumnMajor => x as usize * self.h as usize + y as usize,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, v: u8) {
        let i = self.index(x, y);
        self.data[i] = v;
    }

    /// Copy into the other linearization. A no-op copy when the order
    /// already matches.
    pub fn to_order(&self, order: ScanOrder) -> Raster {
        if order == self.order {
            return self.clone();
        }
        let mut out = Raster::zeros(self.h, self.w, order);
        for y in 0..self.h {
            for x in 0..self.w {
                let v = self.get(x, y);
                if v != 0 {
                    out.set(x, y, 1);
                }
            }
        }
        out
    }
}

/// Array-form run-length encoding of a binary mask.
///
/// Invariant: `counts` sums to `h * w` (decode tolerates a short sum; the
/// remainder is background).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rle {
    pub h: u32,
    pub w: u32,
    pub order: ScanOrder,
    /// Alternating background/foreground run lengths, background first.
    pub counts: Vec<u32>,
}

impl Rle {
    /// Number of pixels on the canvas.
    pub fn total(&self) -> u64 {
        self.h as u64 * self.w as u64
    }

    /// An all-background encoding of the given canvas.
    pub fn empty(h: u32, w: u32, order: ScanOrder) -> Self {
        Rle {
            h,
            w,
            order,
            counts: vec![(h as u64 * w as u64) as u32],
        }
    }

    /// Check the run-sum invariant.
    pub fn validate(&self) -> Result<()> {
        let sum: u64 = self.counts.iter().map(|&c| c as u64).sum();
        if sum != self.total() {
            return Err(Error::MalformedEncoding(format!(
                "run sum {} does not cover a {}x{} canvas",
                sum, self.h, self.w
            )));
        }
        Ok(())
    }
}

/// Compact byte-form RLE, always column-major, byte-compatible with the
/// COCO `counts` strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesRle {
    pub h: u32,
    pub w: u32,
    pub counts: String,
}

/// Encode a raster into run lengths under its own scan order.
///
/// All-background yields a single count `h*w`; all-foreground yields
/// `[0, h*w]`.
pub fn encode(raster: &Raster) -> Rle {
    let mut counts = Vec::new();
    let mut prev: u8 = 0;
    let mut run: u32 = 0;
    for &v in &raster.data {
        let v = u8::from(v != 0);
        if v != prev {
            counts.push(run);
            run = 0;
            prev = v;
        }
        run += 1;
    }
    counts.push(run);
    Rle {
        h: raster.h,
        w: raster.w,
        order: raster.order,
        counts,
    }
}

/// Decode run lengths back to a dense raster in the RLE's scan order.
pub fn decode(rle: &Rle) -> Raster {
    let n = rle.total() as usize;
    let mut data = vec![0u8; n];
    let mut idx = 0usize;
    let mut v = 0u8;
    for &c in &rle.counts {
        let c = c as usize;
        let end = (idx + c).min(n);
        for slot in &mut data[idx..end] {
            *slot = v;
        }
        idx = end;
        v = 1 - v;
    }
    Raster {
        h: rle.h,
        w: rle.w,
        order: rle.order,
        data,
    }
}

/// Pack array counts into the COCO byte string.
///
/// Each count is written in 5-bit groups, low bits first, with bit 5 as the
/// continuation flag and bit 4 of the final group as the sign; counts past
/// index 2 are stored as deltas against the count two positions back, which
/// keeps the near-constant stride of mask columns to a byte or two. Every
/// group is offset by 48 into printable ASCII.
pub fn rle_to_string(rle: &Rle) -> String {
    let m = rle.counts.len();
    let mut s = String::with_capacity(m * 2);
    for i in 0..m {
        let mut x = rle.counts[i] as i64;
        if i > 2 {
            x -= rle.counts[i - 2] as i64;
        }
        loop {
            let mut c = (x & 0x1f) as u8;
            x >>= 5;
            let more = if c & 0x10 != 0 { x != -1 } else { x != 0 };
            if more {
                c |= 0x20;
            }
            s.push((c + 48) as char);
            if !more {
                break;
            }
        }
    }
    s
}

/// Unpack a COCO byte string into array counts for an `h` x `w` canvas.
///
/// Fails with [`Error::MalformedEncoding`] on truncated groups, bytes
/// outside the encoding alphabet, negative reconstructed counts, or a run
/// sum that does not cover the canvas.
pub fn rle_from_string(s: &str, h: u32, w: u32) -> Result<Rle> {
    let bytes = s.as_bytes();
    let mut counts: Vec<u32> = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let mut x: i64 = 0;
        let mut k: u32 = 0;
        loop {
            if i >= bytes.len() {
                return Err(Error::MalformedEncoding(
                    "truncated count group".to_string(),
                ));
            }
            let c = bytes[i] as i64 - 48;
            if !(0..64).contains(&c) {
                return Err(Error::MalformedEncoding(format!(
                    "byte {:#04x} outside encoding alphabet",
                    bytes[i]
                )));
            }
            // Seven groups already cover the 32-bit count range.
            if k >= 12 {
                return Err(Error::MalformedEncoding(
                    "count group too long".to_string(),
                ));
            }
            i += 1;
            x |= (c & 0x1f) << (5 * k);
            k += 1;
            if c & 0x20 == 0 {
                if c & 0x10 != 0 {
                    x |= -1i64 << (5 * k);
                }
                break;
            }
        }
        if counts.len() > 2 {
            x += counts[counts.len() - 2] as i64;
        }
        if x < 0 || x > u32::MAX as i64 {
            return Err(Error::MalformedEncoding(format!(
                "count {x} out of range after delta reconstruction"
            )));
        }
        counts.push(x as u32);
    }
    let rle = Rle {
        h,
        w,
        order: ScanOrder::ColumnMajor,
        counts,
    };
    rle.validate()?;
    Ok(rle)
}

/// Compress an array-form RLE into the byte form.
///
/// The byte form is defined on column-major runs only.
pub fn compress(rle: &Rle) -> Result<BytesRle> {
    if rle.order != ScanOrder::ColumnMajor {
        return Err(Error::order_mismatch(ScanOrder::ColumnMajor, rle.order));
    }
    Ok(BytesRle {
        h: rle.h,
        w: rle.w,
        counts: rle_to_string(rle),
    })
}

/// Decompress the byte form back to array counts. Lossless inverse of
/// [`compress`].
pub fn decompress(bytes: &BytesRle) -> Result<Rle> {
    rle_from_string(&bytes.counts, bytes.h, bytes.w)
}
