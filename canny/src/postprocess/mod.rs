//! Host-only edge extraction on the complete magnitude and gradient planes:
//! non-maximum suppression followed by hysteresis thresholding.

use common::parallel::par_rows_mut;
use log::debug;
use rayon::prelude::*;

use crate::plane::{Geometry, Plane};


pub const NOEDGE: u8 = 255;
pub const POSSIBLE_EDGE: u8 = 128;
pub const EDGE: u8 = 0;

const HISTOGRAM_BINS: usize = 1 << 15;

/// Keeps pixels whose magnitude is a local maximum along the gradient,
/// interpolating the two neighbours in the gradient direction.
///
/// Border rows and columns are always [`NOEDGE`].
pub fn non_max_suppression(
    magnitude: &Plane<i16>,
    delta_x: &Plane<i16>,
    delta_y: &Plane<i16>,
) -> Plane<u8> {
    let geometry = magnitude.geometry();
    assert_eq!(delta_x.geometry(), geometry, "gradient x shape differs");
    assert_eq!(delta_y.geometry(), geometry, "gradient y shape differs");

    let mut result = Plane::filled(geometry, NOEDGE);
    let Geometry { rows, cols } = geometry;
    if rows < 3 || cols < 3 {
        return result;
    }

    par_rows_mut(result.data_mut(), cols, 0).for_each(|(start, chunk)| {
        for (r, out_row) in (start..).zip(chunk.chunks_exact_mut(cols)) {
            if r == 0 || r == rows - 1 {
                continue;
            }
            for (c, out) in out_row.iter_mut().enumerate().take(cols - 1).skip(1) {
                *out = classify(magnitude, delta_x.get(r, c), delta_y.get(r, c), r, c);
            }
        }
    });

    result
}

fn classify(magnitude: &Plane<i16>, gx: i16, gy: i16, r: usize, c: usize) -> u8 {
    let m00 = magnitude.get(r, c) as i32;
    if m00 == 0 {
        return NOEDGE;
    }

    let at = |dr: isize, dc: isize| -> i32 {
        magnitude.get((r as isize + dr) as usize, (c as isize + dc) as usize) as i32
    };
    let xperp = -(gx as f32) / m00 as f32;
    let yperp = gy as f32 / m00 as f32;
    let (gx, gy) = (gx as i32, gy as i32);

    // Returns (a * xperp + b * yperp) for the interpolated neighbour on each side.
    let weigh = |a: i32, b: i32| (a as f32) * xperp + (b as f32) * yperp;

    let (mag1, mag2) = match (gx >= 0, gy >= 0) {
        (true, true) if gx >= gy => {
            let (l1, l2, r1, r2) = (at(0, -1), at(-1, -1), at(0, 1), at(1, 1));
            (weigh(m00 - l1, l2 - l1), weigh(m00 - r1, r2 - r1))
        }
        (true, true) => {
            let (l1, l2, r1, r2) = (at(-1, 0), at(-1, -1), at(1, 0), at(1, 1));
            (weigh(l1 - l2, l1 - m00), weigh(r1 - r2, r1 - m00))
        }
        (true, false) if gx >= -gy => {
            let (l1, l2, r1, r2) = (at(0, -1), at(1, -1), at(0, 1), at(-1, 1));
            (weigh(m00 - l1, l1 - l2), weigh(m00 - r1, r1 - r2))
        }
        (true, false) => {
            let (l1, l2, r1, r2) = (at(1, 0), at(1, -1), at(-1, 0), at(-1, 1));
            (weigh(l1 - l2, m00 - l1), weigh(r1 - r2, m00 - r1))
        }
        (false, true) if -gx >= gy => {
            let (l1, l2, r1, r2) = (at(0, 1), at(-1, 1), at(0, -1), at(1, -1));
            (weigh(l1 - m00, l2 - l1), weigh(r1 - m00, r2 - r1))
        }
        (false, true) => {
            let (l1, l2, r1, r2) = (at(-1, 0), at(-1, 1), at(1, 0), at(1, -1));
            (weigh(l2 - l1, l1 - m00), weigh(r2 - r1, r1 - m00))
        }
        (false, false) if -gx > -gy => {
            let (l1, l2, r1, r2) = (at(0, 1), at(1, 1), at(0, -1), at(-1, -1));
            (weigh(l1 - m00, l1 - l2), weigh(r1 - m00, r1 - r2))
        }
        (false, false) => {
            let (l1, l2, r1, r2) = (at(1, 0), at(1, 1), at(-1, 0), at(-1, -1));
            (weigh(l2 - l1, m00 - l1), weigh(r2 - r1, m00 - r1))
        }
    };

    if mag1 > 0.0 || mag2 > 0.0 || mag2 == 0.0 {
        NOEDGE
    } else {
        POSSIBLE_EDGE
    }
}

/// Promotes suppressed candidates to edges.
///
/// The high threshold is the magnitude below which a `high` fraction of the
/// candidates fall, the low threshold is `low` times the high one. Every
/// candidate at or above the high threshold seeds an edge that grows through
/// 8-connected candidates whose magnitude exceeds the low threshold.
pub fn apply_hysteresis(magnitude: &Plane<i16>, nms: &Plane<u8>, low: f32, high: f32) -> Plane<u8> {
    let geometry = magnitude.geometry();
    assert_eq!(nms.geometry(), geometry, "suppressed plane shape differs");
    let Geometry { rows, cols } = geometry;

    let mut edges = Plane::filled(geometry, NOEDGE);
    if rows < 3 || cols < 3 {
        return edges;
    }
    for r in 1..rows - 1 {
        for c in 1..cols - 1 {
            if nms.get(r, c) == POSSIBLE_EDGE {
                edges.set(r, c, POSSIBLE_EDGE);
            }
        }
    }

    let mut histogram = vec![0usize; HISTOGRAM_BINS];
    for (&e, &m) in edges.data().iter().zip(magnitude.data()) {
        if e == POSSIBLE_EDGE {
            histogram[m.max(0) as usize] += 1;
        }
    }
    let (high_threshold, low_threshold) = thresholds(&histogram, low, high);
    debug!(
        "Hysteresis thresholds: high {}, low {}",
        high_threshold, low_threshold
    );

    let mut stack = Vec::new();
    for pos in 0..geometry.len() {
        if edges.data()[pos] == POSSIBLE_EDGE && magnitude.data()[pos] as i32 >= high_threshold {
            edges.data_mut()[pos] = EDGE;
            stack.push(pos);
            follow_edges(&mut edges, magnitude, low_threshold, &mut stack);
        }
    }

    edges
        .data_mut()
        .par_iter_mut()
        .filter(|e| **e != EDGE)
        .for_each(|e| *e = NOEDGE);

    edges
}

/// `(high, low)` magnitude thresholds from the candidate histogram.
fn thresholds(histogram: &[usize], low: f32, high: f32) -> (i32, i32) {
    let mut maximum_mag = 0i32;
    let mut num_edges = 0usize;
    for (m, &count) in histogram.iter().enumerate().skip(1) {
        if count != 0 {
            maximum_mag = m as i32;
        }
        num_edges += count;
    }
    let high_count = (num_edges as f32 * high + 0.5) as usize;

    let mut r = 1i32;
    let mut num_edges = histogram[1];
    while r < maximum_mag - 1 && num_edges < high_count {
        r += 1;
        num_edges += histogram[r as usize];
    }

    let high_threshold = r;
    let low_threshold = (high_threshold as f32 * low + 0.5) as i32;
    (high_threshold, low_threshold)
}

fn follow_edges(edges: &mut Plane<u8>, magnitude: &Plane<i16>, low: i32, stack: &mut Vec<usize>) {
    const NEIGHBOURS: [(isize, isize); 8] = [
        (0, 1),
        (-1, 1),
        (-1, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
    ];
    let Geometry { rows, cols } = edges.geometry();

    while let Some(pos) = stack.pop() {
        let (r, c) = ((pos / cols) as isize, (pos % cols) as isize);
        for (dr, dc) in NEIGHBOURS {
            let (nr, nc) = (r + dr, c + dc);
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if edges.get(nr, nc) == POSSIBLE_EDGE && magnitude.get(nr, nc) as i32 > low {
                edges.set(nr, nc, EDGE);
                stack.push(nr * cols + nc);
            }
        }
    }
}
