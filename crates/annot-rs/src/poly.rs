//! Rasterization of polygons and boxes directly into column-major RLE.
//!
//! The polygon scan matches the de-facto COCO rasterization exactly
//! (5x coordinate upsampling, Bresenham-style edge walking, column-boundary
//! crossing detection, differential encoding) so areas and encodings agree
//! with annotations produced by that toolchain.

use crate::error::Result;
use crate::ops;
use crate::rle::{Rle, ScanOrder};

const UPSAMPLE: f64 = 5.0;

/// Rasterize a single polygon given as a flat `[x0, y0, x1, y1, ...]` list.
///
/// Polygons with fewer than three vertices have no interior and yield an
/// all-background mask.
pub fn from_polygon(xy: &[f64], h: u32, w: u32) -> Rle {
    let k = xy.len() / 2;
    if k < 3 {
        return Rle::empty(h, w, ScanOrder::ColumnMajor);
    }

    let (u, v) = walk_edges(xy, k);
    let (bx, by) = column_crossings(&u, &v, h, w);
    crossings_to_rle(&bx, &by, h, w)
}

/// Upsample the vertices and walk every edge one pixel step at a time,
/// producing a dense boundary point list in upsampled coordinates.
fn walk_edges(xy: &[f64], k: usize) -> (Vec<i32>, Vec<i32>) {
    let mut x_int: Vec<i32> = Vec::with_capacity(k + 1);
    let mut y_int: Vec<i32> = Vec::with_capacity(k + 1);
    for j in 0..k {
        x_int.push((UPSAMPLE * xy[j * 2] + 0.5) as i32);
        y_int.push((UPSAMPLE * xy[j * 2 + 1] + 0.5) as i32);
    }
    x_int.push(x_int[0]);
    y_int.push(y_int[0]);

    let mut m_total = 0usize;
    for j in 0..k {
        m_total += (x_int[j] - x_int[j + 1])
            .unsigned_abs()
            .max((y_int[j] - y_int[j + 1]).unsigned_abs()) as usize
            + 1;
    }

    let mut u: Vec<i32> = Vec::with_capacity(m_total);
    let mut v: Vec<i32> = Vec::with_capacity(m_total);

    for j in 0..k {
        let mut xs = x_int[j];
        let mut xe = x_int[j + 1];
        let mut ys = y_int[j];
        let mut ye = y_int[j + 1];
        let dx = (xe - xs).unsigned_abs() as i32;
        let dy = (ys - ye).unsigned_abs() as i32;
        // Walk in the direction of the dominant axis, flipping so the loop
        // always steps forward.
        let flip = (dx >= dy && xs > xe) || (dx < dy && ys > ye);
        if flip {
            std::mem::swap(&mut xs, &mut xe);
            std::mem::swap(&mut ys, &mut ye);
        }
        let slope: f64 = if dx >= dy {
            if dx == 0 {
                0.0
            } else {
                (ye - ys) as f64 / dx as f64
            }
        } else if dy == 0 {
            0.0
        } else {
            (xe - xs) as f64 / dy as f64
        };
        if dx >= dy {
            for d in 0..=dx {
                let t = if flip { dx - d } else { d };
                u.push(t + xs);
                v.push((ys as f64 + slope * t as f64 + 0.5) as i32);
            }
        } else {
            for d in 0..=dy {
                let t = if flip { dy - d } else { d };
                v.push(t + ys);
                u.push((xs as f64 + slope * t as f64 + 0.5) as i32);
            }
        }
    }

    (u, v)
}

/// Detect where the boundary walk crosses a column edge and downsample the
/// crossing points back to pixel coordinates.
fn column_crossings(u: &[i32], v: &[i32], h: u32, w: u32) -> (Vec<i32>, Vec<i32>) {
    let h_s = h as i64;
    let w_s = w as i64;
    let m = u.len();
    let mut bx: Vec<i32> = Vec::with_capacity(m);
    let mut by: Vec<i32> = Vec::with_capacity(m);

    for j in 1..m {
        if u[j] == u[j - 1] {
            continue;
        }
        let xd_raw = if u[j] < u[j - 1] { u[j] } else { u[j] - 1 };
        let xd: f64 = (xd_raw as f64 + 0.5) / UPSAMPLE - 0.5;
        if xd != xd.floor() || xd < 0.0 || xd > (w_s - 1) as f64 {
            continue;
        }
        let yd_raw = if v[j] < v[j - 1] { v[j] } else { v[j - 1] };
        let mut yd: f64 = (yd_raw as f64 + 0.5) / UPSAMPLE - 0.5;
        yd = yd.clamp(0.0, h_s as f64).ceil();
        bx.push(xd as i32);
        by.push(yd as i32);
    }

    (bx, by)
}

/// Turn column-crossing points into alternating run counts by sorting their
/// flat indices and differencing, then folding away zero-length runs.
fn crossings_to_rle(bx: &[i32], by: &[i32], h: u32, w: u32) -> Rle {
    let mut a: Vec<u32> = Vec::with_capacity(bx.len() + 1);
    for j in 0..bx.len() {
        a.push((bx[j] as u32) * h + (by[j] as u32));
    }
    a.push(h * w);
    a.sort_unstable();

    let mut prev = 0u32;
    for val in a.iter_mut() {
        let t = *val;
        *val = t - prev;
        prev = t;
    }

    let mut counts: Vec<u32> = Vec::with_capacity(a.len());
    let mut i = 0usize;
    if !a.is_empty() {
        counts.push(a[0]);
        i = 1;
    }
    while i < a.len() {
        if a[i] > 0 {
            counts.push(a[i]);
            i += 1;
        } else {
            // A zero-length run cancels the transition; fold the following
            // count into the previous run.
            i += 1;
            if i < a.len() {
                if let Some(last) = counts.last_mut() {
                    *last += a[i];
                }
                i += 1;
            }
        }
    }

    Rle {
        h,
        w,
        order: ScanOrder::ColumnMajor,
        counts,
    }
}

/// Rasterize several polygons belonging to one object and union them.
///
/// An empty polygon list yields an all-background mask rather than an
/// error; annotation records routinely carry empty segment lists.
pub fn from_polygons(polygons: &[Vec<f64>], h: u32, w: u32) -> Result<Rle> {
    if polygons.is_empty() {
        return Ok(Rle::empty(h, w, ScanOrder::ColumnMajor));
    }
    let rles: Vec<Rle> = polygons.iter().map(|p| from_polygon(p, h, w)).collect();
    ops::union(&rles)
}

/// Build the RLE of an axis-aligned `[x, y, w, h]` box analytically.
///
/// Every covered column carries the same run pattern, so the counts can be
/// written out directly without touching pixels.
pub fn from_bbox(bb: &[f64; 4], h: u32, w: u32) -> Rle {
    let xs = bb[0].max(0.0).floor() as u32;
    let ys = bb[1].max(0.0).floor() as u32;
    let xe = (((bb[0] + bb[2]).ceil()).max(0.0) as u32).min(w);
    let ye = (((bb[1] + bb[3]).ceil()).max(0.0) as u32).min(h);

    if xs >= xe || ys >= ye {
        return Rle::empty(h, w, ScanOrder::ColumnMajor);
    }

    let col_ones = ye - ys;
    let num_cols = xe - xs;
    let gap = h - col_ones; // trailing zeros of one column + leading of the next

    let mut counts = Vec::with_capacity(2 * num_cols as usize + 2);
    counts.push(xs * h + ys);
    counts.push(col_ones);
    for _ in 1..num_cols {
        counts.push(gap);
        counts.push(col_ones);
    }
    let trailing = (w - xe) * h + (h - ye);
    if trailing > 0 {
        counts.push(trailing);
    }

    Rle {
        h,
        w,
        order: ScanOrder::ColumnMajor,
        counts,
    }
}
