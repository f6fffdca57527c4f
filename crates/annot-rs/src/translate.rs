//! In-encoding-space translation of RLE masks.
//!
//! Shifts the foreground of a mask by an integer pixel offset and re-homes
//! it on a (possibly resized) canvas by rewriting run boundaries. The mask
//! is never expanded to a dense raster, so the cost scales with the number
//! of runs rather than the canvas area.

use crate::error::Result;
use crate::rle::{Rle, ScanOrder};

/// Translate a mask by `(dx, dy)` pixels onto a canvas of `new_shape`
/// (`(h, w)`, defaulting to the original shape).
///
/// Foreground runs are split at major-line boundaries, shifted, clipped
/// against the new canvas, and re-linearized. A run segment wholly off one
/// side of the canvas is dropped; a segment straddling an edge is clamped
/// into range. Translating an all-background mask, or pushing every run
/// off-canvas, yields an all-background encoding of the new shape.
pub fn rle_translate(rle: &Rle, offset: (i64, i64), new_shape: Option<(u32, u32)>) -> Result<Rle> {
    rle.validate()?;

    let (new_h, new_w) = new_shape.unwrap_or((rle.h, rle.w));
    let (dx, dy) = offset;

    // "Lines" are the stretches of contiguous pixels in the scan order:
    // columns for column-major, rows for row-major. The offset splits into
    // a line component and an in-line component accordingly.
    let line_len = rle.order.line_len(rle.h, rle.w) as i64;
    let new_line_len = rle.order.line_len(new_h, new_w) as i64;
    let (new_n_lines, line_off, pos_off) = match rle.order {
        ScanOrder::ColumnMajor => (new_w as i64, dx, dy),
        ScanOrder::RowMajor => (new_h as i64, dy, dx),
    };

    let total = new_h as u64 * new_w as u64;
    let mut bounds: Vec<(u64, u64)> = Vec::new();

    if line_len > 0 && new_line_len > 0 {
        let mut idx: i64 = 0;
        for (i, &c) in rle.counts.iter().enumerate() {
            let c = c as i64;
            if i % 2 == 1 && c > 0 {
                // Split the run into per-line segments so the shift and the
                // clip can be evaluated independently per line.
                let mut s = idx;
                let end = idx + c;
                while s < end {
                    let line = s / line_len;
                    let line_end = (line + 1) * line_len;
                    let hi = end.min(line_end);

                    let new_line = line + line_off;
                    let mut lo_pos = s - line * line_len + pos_off;
                    let mut hi_pos = hi - line * line_len + pos_off;
                    s = hi;

                    if new_line < 0 || new_line >= new_n_lines {
                        continue;
                    }
                    // Wholly off one side of the line: drop. Straddling a
                    // boundary: clamp, never drop.
                    if hi_pos <= 0 || lo_pos >= new_line_len {
                        continue;
                    }
                    lo_pos = lo_pos.max(0);
                    hi_pos = hi_pos.min(new_line_len);

                    let start = (new_line * new_line_len + lo_pos) as u64;
                    let stop = (new_line * new_line_len + hi_pos) as u64;
                    bounds.push((start, stop));
                }
            }
            idx += c;
        }
    }

    bounds.sort_unstable();

    // Rejoin segments left adjacent by the per-line split or by clamping.
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(bounds.len());
    for (start, stop) in bounds {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(stop),
            _ => merged.push((start, stop)),
        }
    }

    let mut counts: Vec<u32> = Vec::with_capacity(2 * merged.len() + 1);
    let mut cursor = 0u64;
    for (start, stop) in merged {
        counts.push((start - cursor) as u32);
        counts.push((stop - start) as u32);
        cursor = stop;
    }
    if counts.is_empty() || cursor < total {
        counts.push((total - cursor) as u32);
    }

    Ok(Rle {
        h: new_h,
        w: new_w,
        order: rle.order,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::ops::area;
    use crate::rle::{decode, encode, Raster, ScanOrder};

    fn raster_from_rows(h: u32, w: u32, order: ScanOrder, rows: &[&[u8]]) -> Raster {
        let mut raster = Raster::zeros(h, w, order);
        for (y, row) in rows.iter().enumerate() {
            for (x, &v) in row.iter().enumerate() {
                if v != 0 {
                    raster.set(x as u32, y as u32, 1);
                }
            }
        }
        raster
    }

    /// Dense reference translation used to cross-check the run-space result.
    fn brute_force(
        raster: &Raster,
        (dx, dy): (i64, i64),
        (new_h, new_w): (u32, u32),
        order: ScanOrder,
    ) -> Raster {
        let mut out = Raster::zeros(new_h, new_w, order);
        for y in 0..raster.h {
            for x in 0..raster.w {
                if raster.get(x, y) != 0 {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx >= 0 && ny >= 0 && nx < new_w as i64 && ny < new_h as i64 {
                        out.set(nx as u32, ny as u32, 1);
                    }
                }
            }
        }
        out
    }

    fn check_against_brute_force(
        raster: &Raster,
        offset: (i64, i64),
        new_shape: (u32, u32),
    ) {
        let rle = encode(raster);
        let moved = rle_translate(&rle, offset, Some(new_shape)).unwrap();
        moved.validate().unwrap();
        let expected = brute_force(raster, offset, new_shape, raster.order);
        assert_eq!(decode(&moved), expected, "offset {offset:?} -> {new_shape:?}");
    }

    #[test]
    fn identity_translation_preserves_mask() {
        let raster = raster_from_rows(
            4,
            5,
            ScanOrder::ColumnMajor,
            &[
                &[0, 1, 1, 0, 0],
                &[0, 1, 1, 0, 1],
                &[0, 0, 0, 0, 1],
                &[1, 0, 0, 0, 0],
            ],
        );
        let rle = encode(&raster);
        let moved = rle_translate(&rle, (0, 0), None).unwrap();
        assert_eq!(decode(&moved), raster);
    }

    #[test]
    fn shift_into_larger_canvas() {
        let raster = raster_from_rows(
            2,
            2,
            ScanOrder::ColumnMajor,
            &[&[1, 1], &[0, 1]],
        );
        let rle = encode(&raster);
        let moved = rle_translate(&rle, (1, 2), Some((5, 5))).unwrap();
        let out = decode(&moved);
        assert_eq!(area(&moved), 3);
        assert_eq!(out.get(1, 2), 1);
        assert_eq!(out.get(2, 2), 1);
        assert_eq!(out.get(2, 3), 1);
        assert_eq!(out.get(1, 3), 0);
    }

    #[test]
    fn negative_offset_clips_at_origin() {
        let raster = raster_from_rows(
            3,
            3,
            ScanOrder::ColumnMajor,
            &[&[1, 1, 0], &[1, 1, 0], &[0, 0, 1]],
        );
        check_against_brute_force(&raster, (-1, -1), (3, 3));
    }

    #[test]
    fn offset_past_canvas_yields_all_background() {
        let full = Raster::new(4, 4, ScanOrder::ColumnMajor, vec![1; 16]).unwrap();
        let rle = encode(&full);
        for offset in [(5i64, 0i64), (0, 5), (-5, 0), (0, -5), (9, 9)] {
            let moved = rle_translate(&rle, offset, Some((4, 4))).unwrap();
            assert_eq!(moved.counts, vec![16], "offset {offset:?}");
        }
    }

    #[test]
    fn all_background_stays_all_background() {
        let rle = encode(&Raster::zeros(3, 4, ScanOrder::RowMajor));
        let moved = rle_translate(&rle, (2, -1), Some((6, 2))).unwrap();
        assert_eq!(moved.counts, vec![12]);
        assert_eq!((moved.h, moved.w), (6, 2));
    }

    #[test]
    fn shrinking_canvas_clips_instead_of_failing() {
        let full = Raster::new(6, 6, ScanOrder::ColumnMajor, vec![1; 36]).unwrap();
        check_against_brute_force(&full, (0, 0), (3, 3));
        check_against_brute_force(&full, (-2, 1), (3, 3));
    }

    #[test]
    fn straddling_run_is_clamped_not_dropped() {
        // A full column shifted half off the top keeps its lower half.
        let raster = raster_from_rows(
            4,
            3,
            ScanOrder::ColumnMajor,
            &[&[0, 1, 0], &[0, 1, 0], &[0, 1, 0], &[0, 1, 0]],
        );
        let rle = encode(&raster);
        let moved = rle_translate(&rle, (0, -2), None).unwrap();
        let out = decode(&moved);
        assert_eq!(area(&moved), 2);
        assert_eq!(out.get(1, 0), 1);
        assert_eq!(out.get(1, 1), 1);
        assert_eq!(out.get(1, 2), 0);
    }

    #[test]
    fn row_major_translation_matches_brute_force() {
        let raster = raster_from_rows(
            4,
            5,
            ScanOrder::RowMajor,
            &[
                &[1, 1, 0, 0, 1],
                &[0, 1, 1, 0, 1],
                &[0, 0, 0, 0, 0],
                &[1, 0, 1, 1, 1],
            ],
        );
        for offset in [(0i64, 0i64), (2, 1), (-1, 2), (-3, -3), (4, 0)] {
            check_against_brute_force(&raster, offset, (4, 5));
            check_against_brute_force(&raster, offset, (6, 7));
            check_against_brute_force(&raster, offset, (2, 3));
        }
    }

    #[test]
    fn multi_line_run_splits_correctly() {
        // Foreground spanning three whole columns as a single run.
        let rle = Rle {
            h: 3,
            w: 5,
            order: ScanOrder::ColumnMajor,
            counts: vec![3, 9, 3],
        };
        let moved = rle_translate(&rle, (1, 1), Some((4, 5))).unwrap();
        let out = decode(&moved);
        for x in 2..5u32 {
            assert_eq!(out.get(x, 0), 0);
            for y in 1..4u32 {
                assert_eq!(out.get(x, y), 1, "({x},{y})");
            }
        }
        assert_eq!(area(&moved), 9);
    }

    #[test]
    fn rejects_inconsistent_run_sum() {
        let rle = Rle {
            h: 3,
            w: 3,
            order: ScanOrder::ColumnMajor,
            counts: vec![2, 2],
        };
        let err = rle_translate(&rle, (0, 0), None).unwrap_err();
        assert!(matches!(err, Error::MalformedEncoding(_)));
    }

    #[test]
    fn zero_sized_target_canvas() {
        let raster = Raster::new(2, 2, ScanOrder::ColumnMajor, vec![1; 4]).unwrap();
        let rle = encode(&raster);
        let moved = rle_translate(&rle, (0, 0), Some((0, 3))).unwrap();
        assert_eq!(moved.counts, vec![0]);
        moved.validate().unwrap();
    }
}
