//! Set operations over run-length encoded masks.
//!
//! Everything here walks run boundaries directly; a mask is never expanded
//! to a dense raster.

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::rle::Rle;

fn check_compatible(a: &Rle, b: &Rle) -> Result<()> {
    if (a.h, a.w) != (b.h, b.w) {
        return Err(Error::shape_mismatch((a.h, a.w), (b.h, b.w)));
    }
    if a.order != b.order {
        return Err(Error::order_mismatch(a.order, b.order));
    }
    Ok(())
}

/// Union of one or more masks sharing a canvas.
pub fn union(rles: &[Rle]) -> Result<Rle> {
    merge(rles, false)
}

/// Intersection of one or more masks sharing a canvas.
pub fn intersection(rles: &[Rle]) -> Result<Rle> {
    merge(rles, true)
}

/// Merge multiple masks with union (`intersect=false`) or intersection
/// (`intersect=true`).
pub fn merge(rles: &[Rle], intersect: bool) -> Result<Rle> {
    let first = rles.first().ok_or(Error::EmptyInput)?;
    for rle in &rles[1..] {
        check_compatible(first, rle)?;
    }
    let mut result = first.clone();
    for rle in &rles[1..] {
        result = merge_two(&result, rle, intersect);
    }
    Ok(result)
}

/// Two-stream run merge. Walks both count sequences in lockstep, emitting a
/// new run whenever the combined value changes.
fn merge_two(a: &Rle, b: &Rle, intersect: bool) -> Rle {
    let n = a.total();

    let mut counts: Vec<u32> = Vec::new();
    let mut ca = 0u64; // remaining in current run of a
    let mut cb = 0u64;
    let mut va = false;
    let mut vb = false;
    let mut ai = 0usize;
    let mut bi = 0usize;
    let mut total = 0u64;
    let mut v_prev: Option<bool> = None;

    while total < n {
        // Refill either stream, skipping zero-length runs.
        while ca == 0 && ai < a.counts.len() {
            ca = a.counts[ai] as u64;
            va = ai % 2 == 1;
            ai += 1;
        }
        while cb == 0 && bi < b.counts.len() {
            cb = b.counts[bi] as u64;
            vb = bi % 2 == 1;
            bi += 1;
        }

        let step = if ca > 0 && cb > 0 {
            ca.min(cb)
        } else if ca > 0 {
            ca
        } else if cb > 0 {
            cb
        } else {
            break;
        };

        let v = if intersect { va && vb } else { va || vb };

        match v_prev {
            Some(prev) if prev == v => {
                if let Some(last) = counts.last_mut() {
                    *last += step as u32;
                }
            }
            _ => {
                if counts.is_empty() && v {
                    counts.push(0);
                }
                counts.push(step as u32);
            }
        }
        v_prev = Some(v);

        if ca > 0 {
            ca -= step;
        }
        if cb > 0 {
            cb -= step;
        }
        total += step;
    }

    if counts.is_empty() {
        counts.push(n as u32);
    }

    Rle {
        h: a.h,
        w: a.w,
        order: a.order,
        counts,
    }
}

/// Number of foreground pixels: the sum of odd-indexed runs.
pub fn area(rle: &Rle) -> u64 {
    rle.counts
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, &c)| c as u64)
        .sum()
}

/// Foreground areas of a batch of masks.
pub fn areas(rles: &[Rle]) -> Vec<u64> {
    rles.iter().map(area).collect()
}

/// Bounding box `[x, y, w, h]` of the foreground, derived from run
/// positions. Matches the box of the decoded raster exactly; all-background
/// masks yield `[0, 0, 0, 0]`.
pub fn to_bbox(rle: &Rle) -> [f64; 4] {
    let line_len = rle.order.line_len(rle.h, rle.w);
    if line_len == 0 || rle.counts.is_empty() {
        return [0.0, 0.0, 0.0, 0.0];
    }

    let mut min_line = usize::MAX;
    let mut max_line = 0usize; // exclusive
    let mut min_pos = line_len;
    let mut max_pos = 0usize; // exclusive
    let mut has_any = false;

    let mut cc = 0usize;
    for (i, &c) in rle.counts.iter().enumerate() {
        let c = c as usize;
        if i % 2 == 1 && c > 0 {
            has_any = true;
            let start = cc;
            let end = cc + c - 1; // inclusive
            let l1 = start / line_len;
            let p1 = start % line_len;
            let l2 = end / line_len;
            let p2 = end % line_len;

            min_line = min_line.min(l1);
            max_line = max_line.max(l2 + 1);
            if l1 != l2 {
                // A run crossing a line boundary covers the full minor
                // extent of every line in between.
                min_pos = 0;
                max_pos = line_len;
            } else {
                min_pos = min_pos.min(p1);
                max_pos = max_pos.max(p2 + 1);
            }
        }
        cc += c;
    }

    if !has_any {
        return [0.0, 0.0, 0.0, 0.0];
    }

    let (x, y, bw, bh) = match rle.order {
        // Lines are columns: line index is x, in-line position is y.
        crate::rle::ScanOrder::ColumnMajor => (
            min_line,
            min_pos,
            max_line - min_line,
            max_pos - min_pos,
        ),
        // Lines are rows: line index is y, in-line position is x.
        crate::rle::ScanOrder::RowMajor => (
            min_pos,
            min_line,
            max_pos - min_pos,
            max_line - min_line,
        ),
    };
    [x as f64, y as f64, bw as f64, bh as f64]
}

/// Bounding boxes of a batch of masks.
pub fn bboxes(rles: &[Rle]) -> Vec<[f64; 4]> {
    rles.iter().map(to_bbox).collect()
}

/// Intersection area of two masks without allocating the merged encoding.
fn intersection_area(a: &Rle, b: &Rle) -> u64 {
    let n = a.total();
    let mut ca = 0u64;
    let mut cb = 0u64;
    let mut va = false;
    let mut vb = false;
    let mut ai = 0usize;
    let mut bi = 0usize;
    let mut total = 0u64;
    let mut inter = 0u64;

    while total < n {
        while ca == 0 && ai < a.counts.len() {
            ca = a.counts[ai] as u64;
            va = ai % 2 == 1;
            ai += 1;
        }
        while cb == 0 && bi < b.counts.len() {
            cb = b.counts[bi] as u64;
            vb = bi % 2 == 1;
            bi += 1;
        }

        let step = if ca > 0 && cb > 0 {
            ca.min(cb)
        } else if ca > 0 {
            ca
        } else if cb > 0 {
            cb
        } else {
            break;
        };

        if va && vb {
            inter += step;
        }

        if ca > 0 {
            ca -= step;
        }
        if cb > 0 {
            cb -= step;
        }
        total += step;
    }

    inter
}

/// Intersection over union of two masks. A degenerate `0/0` is 0, never NaN.
pub fn iou(a: &Rle, b: &Rle) -> Result<f64> {
    check_compatible(a, b)?;
    let inter = intersection_area(a, b) as f64;
    let uni = area(a) as f64 + area(b) as f64 - inter;
    if uni == 0.0 {
        Ok(0.0)
    } else {
        Ok(inter / uni)
    }
}

/// Pairwise IoU between two batches of masks, as a `dt.len()` x `gt.len()`
/// matrix. Rows are computed in parallel.
pub fn iou_matrix(dt: &[Rle], gt: &[Rle]) -> Result<Vec<Vec<f64>>> {
    if dt.is_empty() || gt.is_empty() {
        return Ok(vec![vec![]; dt.len()]);
    }
    for a in dt {
        check_compatible(&dt[0], a)?;
    }
    for b in gt {
        check_compatible(&dt[0], b)?;
    }

    let dt_areas: Vec<u64> = areas(dt);
    let gt_areas: Vec<u64> = areas(gt);

    Ok((0..dt.len())
        .into_par_iter()
        .map(|i| {
            let da = dt_areas[i] as f64;
            (0..gt.len())
                .map(|j| {
                    let inter = intersection_area(&dt[i], &gt[j]) as f64;
                    let uni = da + gt_areas[j] as f64 - inter;
                    if uni == 0.0 {
                        0.0
                    } else {
                        inter / uni
                    }
                })
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rle::{decode, encode, Raster, ScanOrder};

    fn f_rle(h: u32, w: u32, data: Vec<u8>) -> Rle {
        encode(&Raster::new(h, w, ScanOrder::ColumnMajor, data).unwrap())
    }

    #[test]
    fn union_two_masks() {
        let a = f_rle(3, 4, vec![0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0]);
        let b = f_rle(3, 4, vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 0]);
        let merged = union(&[a, b]).unwrap();
        assert_eq!(
            decode(&merged).data,
            vec![0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 1, 0]
        );
    }

    #[test]
    fn intersection_two_masks() {
        let a = f_rle(3, 4, vec![0, 0, 0, 1, 1, 1, 1, 1, 0, 0, 0, 0]);
        let b = f_rle(3, 4, vec![0, 0, 0, 0, 1, 1, 1, 1, 1, 0, 0, 0]);
        let merged = intersection(&[a, b]).unwrap();
        assert_eq!(
            decode(&merged).data,
            vec![0, 0, 0, 0, 1, 1, 1, 1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn union_of_one_is_identity() {
        let a = f_rle(3, 4, vec![0, 1, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0]);
        let merged = union(std::slice::from_ref(&a)).unwrap();
        assert_eq!(area(&merged), area(&a));
        assert_eq!(decode(&merged), decode(&a));
    }

    #[test]
    fn union_of_disjoint_intersection_is_empty() {
        let a = f_rle(2, 2, vec![1, 0, 0, 0]);
        let b = f_rle(2, 2, vec![0, 0, 0, 1]);
        let merged = intersection(&[a, b]).unwrap();
        assert_eq!(area(&merged), 0);
        assert_eq!(merged.counts, vec![4]);
    }

    #[test]
    fn merge_rejects_empty_input() {
        assert!(matches!(union(&[]), Err(Error::EmptyInput)));
    }

    #[test]
    fn merge_rejects_shape_mismatch() {
        let a = f_rle(2, 2, vec![1, 0, 0, 0]);
        let b = f_rle(2, 3, vec![0, 0, 0, 1, 0, 0]);
        assert!(matches!(union(&[a, b]), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn merge_rejects_order_mismatch() {
        let a = f_rle(2, 2, vec![1, 0, 0, 0]);
        let mut b = f_rle(2, 2, vec![0, 0, 0, 1]);
        b.order = ScanOrder::RowMajor;
        assert!(matches!(union(&[a, b]), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn area_counts_foreground() {
        let a = f_rle(3, 4, vec![0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0]);
        assert_eq!(area(&a), 5);
    }

    #[test]
    fn bbox_column_major() {
        // Col 0: [0,0,0], col 1: [1,1,1], col 2: [0,0,1], col 3: [1,0,0]
        let a = f_rle(3, 4, vec![0, 0, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0]);
        assert_eq!(to_bbox(&a), [1.0, 0.0, 3.0, 3.0]);
    }

    #[test]
    fn bbox_row_major_matches_pixels() {
        // Rows: [0 0 0 0] / [0 1 1 0] / [0 0 1 0]
        let data = vec![0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 1, 0];
        let raster = Raster::new(3, 4, ScanOrder::RowMajor, data).unwrap();
        let rle = encode(&raster);
        assert_eq!(to_bbox(&rle), [1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn bbox_of_empty_mask_is_zero() {
        let a = f_rle(5, 5, vec![0; 25]);
        assert_eq!(to_bbox(&a), [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn bbox_run_spanning_lines_covers_full_minor_extent() {
        // One run covering all of column 1 and all of column 2.
        let rle = Rle {
            h: 3,
            w: 4,
            order: ScanOrder::ColumnMajor,
            counts: vec![3, 6, 3],
        };
        assert_eq!(to_bbox(&rle), [1.0, 0.0, 2.0, 3.0]);
    }

    #[test]
    fn iou_basic() {
        let a = f_rle(3, 4, vec![0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0]);
        let b = f_rle(3, 4, vec![0, 0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0]);
        // intersection = 2, union = 3 + 3 - 2 = 4
        assert!((iou(&a, &b).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn iou_is_symmetric() {
        let a = f_rle(3, 4, vec![0, 1, 0, 1, 1, 1, 0, 0, 1, 1, 0, 0]);
        let b = f_rle(3, 4, vec![1, 1, 0, 0, 1, 0, 0, 1, 1, 0, 0, 1]);
        assert_eq!(iou(&a, &b).unwrap(), iou(&b, &a).unwrap());
    }

    #[test]
    fn iou_of_two_empty_masks_is_zero() {
        let a = f_rle(3, 4, vec![0; 12]);
        let b = f_rle(3, 4, vec![0; 12]);
        assert_eq!(iou(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn iou_matrix_shape_and_values() {
        let a = f_rle(3, 4, vec![0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0]);
        let b = f_rle(3, 4, vec![0, 0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0]);
        let m = iou_matrix(&[a.clone(), b.clone()], &[a.clone(), b.clone()]).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].len(), 2);
        assert!((m[0][0] - 1.0).abs() < 1e-12);
        assert!((m[0][1] - 0.5).abs() < 1e-12);
        assert_eq!(m[0][1], m[1][0]);
    }
}
