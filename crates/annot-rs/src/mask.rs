//! A single segmentation mask, convertible between four representations:
//! compressed byte RLE, array RLE, and row-/column-major dense rasters.
//!
//! The representation set is closed and the conversion table is a fixed
//! matrix over (from, to) pairs; there is no open-ended format registry.
//! Operations accept any representation and convert internally, so callers
//! can hold masks in whichever form their pipeline produces.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ops;
use crate::poly;
use crate::rle::{self, BytesRle, Raster, Rle, ScanOrder};
use crate::translate::rle_translate;

/// Identifies one of the four mask representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskFormat {
    BytesRle,
    ArrayRle,
    /// Row-major dense raster.
    CMask,
    /// Column-major dense raster.
    FMask,
}

/// A segmentation mask in one of the supported representations.
#[derive(Debug, Clone, PartialEq)]
pub enum Mask {
    BytesRle(BytesRle),
    ArrayRle(Rle),
    CMask(Raster),
    FMask(Raster),
}

impl Mask {
    /// Wrap a dense raster, picking the variant matching its scan order.
    pub fn from_raster(raster: Raster) -> Mask {
        match raster.order {
            ScanOrder::RowMajor => Mask::CMask(raster),
            ScanOrder::ColumnMajor => Mask::FMask(raster),
        }
    }

    /// Rasterize one or more flat polygons onto an `h` x `w` canvas and
    /// union them.
    pub fn from_polygons(polygons: &[Vec<f64>], h: u32, w: u32) -> Result<Mask> {
        Ok(Mask::ArrayRle(poly::from_polygons(polygons, h, w)?))
    }

    /// Rasterize polygons given as `[x, y]` vertex pairs.
    pub fn from_polygon_points(points: &[Vec<[f64; 2]>], h: u32, w: u32) -> Result<Mask> {
        let flat: Vec<Vec<f64>> = points
            .iter()
            .map(|poly| poly.iter().flat_map(|p| [p[0], p[1]]).collect())
            .collect();
        Mask::from_polygons(&flat, h, w)
    }

    /// Build a mask covering an `[x, y, w, h]` box.
    pub fn from_bbox(bb: &[f64; 4], h: u32, w: u32) -> Mask {
        Mask::ArrayRle(poly::from_bbox(bb, h, w))
    }

    pub fn format(&self) -> MaskFormat {
        match self {
            Mask::BytesRle(_) => MaskFormat::BytesRle,
            Mask::ArrayRle(_) => MaskFormat::ArrayRle,
            Mask::CMask(_) => MaskFormat::CMask,
            Mask::FMask(_) => MaskFormat::FMask,
        }
    }

    /// Canvas dimensions `(h, w)`.
    pub fn shape(&self) -> (u32, u32) {
        match self {
            Mask::BytesRle(b) => (b.h, b.w),
            Mask::ArrayRle(r) => (r.h, r.w),
            Mask::CMask(m) | Mask::FMask(m) => (m.h, m.w),
        }
    }

    /// Convert into the requested representation. Conversions route through
    /// the cheapest path that exists for the (from, to) pair.
    pub fn to_format(&self, format: MaskFormat) -> Result<Mask> {
        match format {
            MaskFormat::BytesRle => Ok(Mask::BytesRle(self.to_bytes_rle()?)),
            MaskFormat::ArrayRle => Ok(Mask::ArrayRle(self.to_array_rle()?)),
            MaskFormat::CMask => Ok(Mask::CMask(self.to_c_mask()?)),
            MaskFormat::FMask => Ok(Mask::FMask(self.to_f_mask()?)),
        }
    }

    /// Array-form RLE in the mask's native scan order.
    pub fn to_array_rle(&self) -> Result<Rle> {
        match self {
            Mask::BytesRle(b) => rle::decompress(b),
            Mask::ArrayRle(r) => Ok(r.clone()),
            Mask::CMask(m) | Mask::FMask(m) => Ok(rle::encode(m)),
        }
    }

    /// Array-form RLE in column-major order, re-linearizing if needed.
    fn to_f_array_rle(&self) -> Result<Rle> {
        let r = self.to_array_rle()?;
        if r.order == ScanOrder::ColumnMajor {
            Ok(r)
        } else {
            Ok(rle::encode(&rle::decode(&r).to_order(ScanOrder::ColumnMajor)))
        }
    }

    /// Compressed byte RLE (always column-major).
    pub fn to_bytes_rle(&self) -> Result<BytesRle> {
        match self {
            Mask::BytesRle(b) => Ok(b.clone()),
            _ => rle::compress(&self.to_f_array_rle()?),
        }
    }

    /// Row-major dense raster.
    pub fn to_c_mask(&self) -> Result<Raster> {
        match self {
            Mask::CMask(m) => Ok(m.clone()),
            Mask::FMask(m) => Ok(m.to_order(ScanOrder::RowMajor)),
            _ => Ok(rle::decode(&self.to_array_rle()?).to_order(ScanOrder::RowMajor)),
        }
    }

    /// Column-major dense raster.
    pub fn to_f_mask(&self) -> Result<Raster> {
        match self {
            Mask::FMask(m) => Ok(m.clone()),
            Mask::CMask(m) => Ok(m.to_order(ScanOrder::ColumnMajor)),
            _ => Ok(rle::decode(&self.to_array_rle()?).to_order(ScanOrder::ColumnMajor)),
        }
    }

    /// Number of foreground pixels.
    pub fn area(&self) -> Result<u64> {
        Ok(ops::area(&self.to_array_rle()?))
    }

    /// Foreground bounding box `[x, y, w, h]`.
    pub fn bbox(&self) -> Result<[f64; 4]> {
        Ok(ops::to_bbox(&self.to_array_rle()?))
    }

    /// Intersection over union with another mask of the same canvas.
    pub fn iou(&self, other: &Mask) -> Result<f64> {
        ops::iou(&self.to_f_array_rle()?, &other.to_f_array_rle()?)
    }

    /// Union of several masks (any mix of representations).
    pub fn union(masks: &[Mask]) -> Result<Mask> {
        let rles: Vec<Rle> = masks
            .iter()
            .map(|m| m.to_f_array_rle())
            .collect::<Result<_>>()?;
        Ok(Mask::ArrayRle(ops::union(&rles)?))
    }

    /// Intersection of several masks (any mix of representations).
    pub fn intersection(masks: &[Mask]) -> Result<Mask> {
        let rles: Vec<Rle> = masks
            .iter()
            .map(|m| m.to_f_array_rle())
            .collect::<Result<_>>()?;
        Ok(Mask::ArrayRle(ops::intersection(&rles)?))
    }

    /// Translate by `(dx, dy)` onto a canvas of `new_shape` (defaults to
    /// the current shape), staying in encoding space.
    pub fn translate(&self, offset: (i64, i64), new_shape: Option<(u32, u32)>) -> Result<Mask> {
        Ok(Mask::ArrayRle(rle_translate(
            &self.to_array_rle()?,
            offset,
            new_shape,
        )?))
    }

    /// Extract the tight foreground patch: translate by the negated bbox
    /// origin onto a bbox-sized canvas.
    pub fn crop_to_bbox(&self) -> Result<Mask> {
        let [x, y, w, h] = self.bbox()?;
        self.translate((-(x as i64), -(y as i64)), Some((h as u32, w as u32)))
    }
}

/// Mask record as exchanged on the wire: `{"size": [H, W], "counts": ...}`
/// where `counts` is either the compressed byte string or a plain integer
/// list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskRecord {
    /// Canvas dimensions as `[height, width]`.
    pub size: [u32; 2],
    pub counts: RecordCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordCounts {
    Bytes(String),
    Array(Vec<u32>),
}

impl MaskRecord {
    /// Record carrying the compressed byte form.
    pub fn compressed(mask: &Mask) -> Result<MaskRecord> {
        let b = mask.to_bytes_rle()?;
        Ok(MaskRecord {
            size: [b.h, b.w],
            counts: RecordCounts::Bytes(b.counts),
        })
    }

    /// Record carrying plain integer counts (column-major).
    pub fn uncompressed(mask: &Mask) -> Result<MaskRecord> {
        let r = mask.to_f_array_rle()?;
        Ok(MaskRecord {
            size: [r.h, r.w],
            counts: RecordCounts::Array(r.counts),
        })
    }

    /// Interpret the record as a mask. Integer counts are validated against
    /// the declared size immediately; byte counts are validated when first
    /// decompressed.
    pub fn to_mask(&self) -> Result<Mask> {
        let [h, w] = self.size;
        match &self.counts {
            RecordCounts::Bytes(s) => Ok(Mask::BytesRle(BytesRle {
                h,
                w,
                counts: s.clone(),
            })),
            RecordCounts::Array(counts) => {
                let rle = Rle {
                    h,
                    w,
                    order: ScanOrder::ColumnMajor,
                    counts: counts.clone(),
                };
                rle.validate()?;
                Ok(Mask::ArrayRle(rle))
            }
        }
    }
}

impl std::str::FromStr for MaskFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<MaskFormat> {
        match s {
            "bytes_rle" => Ok(MaskFormat::BytesRle),
            "array_rle" => Ok(MaskFormat::ArrayRle),
            "c_mask" => Ok(MaskFormat::CMask),
            "f_mask" => Ok(MaskFormat::FMask),
            other => Err(Error::InvalidFormat(format!(
                "unknown mask format '{other}'"
            ))),
        }
    }
}
