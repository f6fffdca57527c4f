//! Non-maximum suppression over detection candidate sets.
//!
//! Inputs are caller-owned parallel slices: `tlbr` boxes
//! (`[x1, y1, x2, y2]`), scores, and optional class ids. Both variants
//! return a subset of the original indices, sorted by descending score with
//! ties broken by ascending index, and never mutate their inputs.
//!
//! The greedy variant is the classic O(N^2) loop. The divide-and-conquer
//! variant recursively partitions the spatial extent into quadrants so the
//! pairwise cost stays bounded on dense detection sets, then repairs the
//! seams between partitions with an extra suppression pass.

use log::debug;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Tuning for the divide-and-conquer variant.
#[derive(Debug, Clone)]
pub struct DaqParams {
    /// Partitions at or below this size run plain greedy suppression.
    pub stop_size: usize,
    /// Hard recursion cap; degenerate spatial distributions bottom out here.
    pub max_depth: u32,
    /// Maximum box extent, used to size the seam margin around cut lines.
    /// Inferred from the boxes when absent.
    pub diameter: Option<f64>,
}

impl Default for DaqParams {
    fn default() -> Self {
        DaqParams {
            stop_size: 2048,
            max_depth: 12,
            diameter: None,
        }
    }
}

/// Which suppression algorithm to run.
#[derive(Debug, Clone)]
pub enum NmsMethod {
    Greedy,
    Daq(DaqParams),
}

/// Suppress overlapping detections.
///
/// `bias` selects the box-area convention: 0 treats coordinates as
/// continuous (`w = x2 - x1`), 1 as inclusive pixel grids
/// (`w = x2 - x1 + 1`). A box is discarded only when its IoU with a kept
/// box is strictly greater than `thresh`, so `thresh = 0` keeps every
/// non-overlapping box. When `classes` is given, suppression only applies
/// between boxes sharing a class id.
pub fn non_max_suppression(
    tlbr: &[[f64; 4]],
    scores: &[f64],
    thresh: f64,
    bias: f64,
    classes: Option<&[i64]>,
    method: &NmsMethod,
) -> Result<Vec<usize>> {
    if scores.len() != tlbr.len() {
        return Err(Error::LengthMismatch {
            name: "scores",
            expected: tlbr.len(),
            got: scores.len(),
        });
    }
    if let Some(classes) = classes {
        if classes.len() != tlbr.len() {
            return Err(Error::LengthMismatch {
                name: "classes",
                expected: tlbr.len(),
                got: classes.len(),
            });
        }
    }

    let run = |idxs: &[usize]| -> Vec<usize> {
        match method {
            NmsMethod::Greedy => greedy_on(tlbr, scores, thresh, bias, idxs),
            NmsMethod::Daq(params) => daq_on(tlbr, scores, thresh, bias, idxs, params),
        }
    };

    let mut keep = match classes {
        None => {
            let all: Vec<usize> = (0..tlbr.len()).collect();
            run(&all)
        }
        Some(classes) => {
            // Suppression is class-local: partition and run independently.
            let mut by_class: std::collections::BTreeMap<i64, Vec<usize>> = Default::default();
            for (i, &c) in classes.iter().enumerate() {
                by_class.entry(c).or_default().push(i);
            }
            by_class
                .values()
                .flat_map(|idxs| run(idxs))
                .collect()
        }
    };

    sort_by_score(&mut keep, scores);
    Ok(keep)
}

/// Greedy suppression over the full candidate set.
pub fn greedy_nms(tlbr: &[[f64; 4]], scores: &[f64], thresh: f64, bias: f64) -> Result<Vec<usize>> {
    non_max_suppression(tlbr, scores, thresh, bias, None, &NmsMethod::Greedy)
}

/// Divide-and-conquer suppression over the full candidate set.
pub fn daq_nms(
    tlbr: &[[f64; 4]],
    scores: &[f64],
    thresh: f64,
    bias: f64,
    params: &DaqParams,
) -> Result<Vec<usize>> {
    non_max_suppression(
        tlbr,
        scores,
        thresh,
        bias,
        None,
        &NmsMethod::Daq(params.clone()),
    )
}

fn sort_by_score(idxs: &mut [usize], scores: &[f64]) {
    idxs.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });
}

/// IoU under the inclusive-pixel area convention selected by `bias`.
///
/// Intersection extents are clamped at zero; raw box areas are not, and a
/// degenerate union maps to 0 rather than NaN or infinity.
fn pair_iou(a: &[f64; 4], b: &[f64; 4], bias: f64) -> f64 {
    let area_a = (a[2] - a[0] + bias) * (a[3] - a[1] + bias);
    let area_b = (b[2] - b[0] + bias) * (b[3] - b[1] + bias);

    let iw = (a[2].min(b[2]) - a[0].max(b[0]) + bias).max(0.0);
    let ih = (a[3].min(b[3]) - a[1].max(b[1]) + bias).max(0.0);
    let inter = iw * ih;

    let union = area_a + area_b - inter;
    if union == 0.0 {
        return 0.0;
    }
    let ovr = inter / union;
    if ovr.is_finite() {
        ovr
    } else {
        0.0
    }
}

/// Greedy pass restricted to a subset of indices. Returns original indices.
fn greedy_on(
    tlbr: &[[f64; 4]],
    scores: &[f64],
    thresh: f64,
    bias: f64,
    idxs: &[usize],
) -> Vec<usize> {
    let mut order: Vec<usize> = idxs.to_vec();
    sort_by_score(&mut order, scores);

    let mut keep = Vec::new();
    let mut suppressed = vec![false; order.len()];
    for i in 0..order.len() {
        if suppressed[i] {
            continue;
        }
        let a = order[i];
        keep.push(a);
        for j in (i + 1)..order.len() {
            if suppressed[j] {
                continue;
            }
            // Suppress on strictly-greater overlap only: thresh = 0 must
            // not wipe out disjoint boxes.
            if pair_iou(&tlbr[a], &tlbr[order[j]], bias) > thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn box_center(b: &[f64; 4]) -> (f64, f64) {
    ((b[0] + b[2]) * 0.5, (b[1] + b[3]) * 0.5)
}

fn max_extent(tlbr: &[[f64; 4]], idxs: &[usize]) -> f64 {
    idxs.iter()
        .map(|&i| {
            let b = &tlbr[i];
            (b[2] - b[0]).abs().max((b[3] - b[1]).abs())
        })
        .fold(0.0, f64::max)
}

fn daq_on(
    tlbr: &[[f64; 4]],
    scores: &[f64],
    thresh: f64,
    bias: f64,
    idxs: &[usize],
    params: &DaqParams,
) -> Vec<usize> {
    let diameter = params
        .diameter
        .unwrap_or_else(|| max_extent(tlbr, idxs));
    daq_recurse(tlbr, scores, thresh, bias, idxs, 0, diameter, params)
}

#[allow(clippy::too_many_arguments)]
fn daq_recurse(
    tlbr: &[[f64; 4]],
    scores: &[f64],
    thresh: f64,
    bias: f64,
    idxs: &[usize],
    depth: u32,
    diameter: f64,
    params: &DaqParams,
) -> Vec<usize> {
    if idxs.len() <= params.stop_size || depth >= params.max_depth {
        return greedy_on(tlbr, scores, thresh, bias, idxs);
    }

    // Cut at the midpoint of the box-center extent on both axes.
    let centers: Vec<(f64, f64)> = idxs.iter().map(|&i| box_center(&tlbr[i])).collect();
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for &(cx, cy) in &centers {
        min_x = min_x.min(cx);
        max_x = max_x.max(cx);
        min_y = min_y.min(cy);
        max_y = max_y.max(cy);
    }
    let cut_x = (min_x + max_x) * 0.5;
    let cut_y = (min_y + max_y) * 0.5;

    let mut quads: [Vec<usize>; 4] = Default::default();
    for (&i, &(cx, cy)) in idxs.iter().zip(&centers) {
        let q = usize::from(cx > cut_x) * 2 + usize::from(cy > cut_y);
        quads[q].push(i);
    }

    // A degenerate split (all centers coincide) cannot make progress.
    if quads.iter().any(|q| q.len() == idxs.len()) {
        return greedy_on(tlbr, scores, thresh, bias, idxs);
    }

    debug!(
        "daq split depth={} n={} quads=[{}, {}, {}, {}]",
        depth,
        idxs.len(),
        quads[0].len(),
        quads[1].len(),
        quads[2].len(),
        quads[3].len()
    );

    // Quadrants are data-independent; recurse in parallel, keeping the
    // deterministic quadrant order in the collected result.
    let kept_per_quad: Vec<Vec<usize>> = quads
        .par_iter()
        .map(|q| daq_recurse(tlbr, scores, thresh, bias, q, depth + 1, diameter, params))
        .collect();

    // Local passes cannot see across the cut lines, so near-duplicates
    // split over a seam both survive. Any overlapping cross-quadrant pair
    // has both centers within `diameter` of the line separating them, so a
    // greedy re-pass over the seam band restores those suppressions.
    let mut keep: Vec<usize> = Vec::new();
    let mut seam: Vec<usize> = Vec::new();
    for &i in kept_per_quad.iter().flatten() {
        let (cx, cy) = box_center(&tlbr[i]);
        if (cx - cut_x).abs() <= diameter || (cy - cut_y).abs() <= diameter {
            seam.push(i);
        } else {
            keep.push(i);
        }
    }
    debug!("daq merge depth={} seam={}", depth, seam.len());
    keep.extend(greedy_on(tlbr, scores, thresh, bias, &seam));
    keep
}
