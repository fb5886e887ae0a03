//! Host agent lanes: the host row range is cut into row chunks that run on the
//! rayon pool, each chunk handled by the configured [`StageWorker`].

use std::ops::Range;

use common::parallel::{par_rows2_mut, par_rows_mut};
use rayon::prelude::*;

use crate::plane::Geometry;

use super::scalar::magnitude_from_squared;
use super::StageWorker;

pub fn smooth(
    worker: &dyn StageWorker,
    image: &[u8],
    geometry: Geometry,
    rows: Range<usize>,
    out: &mut [i16],
) {
    if rows.is_empty() {
        return;
    }
    let width = geometry.cols;
    par_rows_mut(out, width, rows.start).for_each(|(start, chunk)| {
        let chunk_rows = start..start + chunk.len() / width;
        worker.smooth_rows(image, geometry, chunk_rows, chunk);
    });
}

pub fn derivative(
    worker: &dyn StageWorker,
    smoothed: &[i16],
    geometry: Geometry,
    rows: Range<usize>,
    delta_x: &mut [i16],
    delta_y: &mut [i16],
) {
    if rows.is_empty() {
        return;
    }
    let width = geometry.cols;
    par_rows2_mut(delta_x, delta_y, width, rows.start).for_each(|(start, (dx, dy))| {
        let chunk_rows = start..start + dx.len() / width;
        worker.derivative_rows(smoothed, geometry, chunk_rows, dx, dy);
    });
}

pub fn magnitude_squared(
    worker: &dyn StageWorker,
    delta_x: &[i16],
    delta_y: &[i16],
    geometry: Geometry,
    rows: Range<usize>,
    out: &mut [u32],
) {
    if rows.is_empty() {
        return;
    }
    let width = geometry.cols;
    par_rows_mut(out, width, rows.start).for_each(|(start, chunk)| {
        let chunk_rows = start..start + chunk.len() / width;
        worker.magnitude_squared_rows(delta_x, delta_y, geometry, chunk_rows, chunk);
    });
}

/// Rounded square root of every squared magnitude.
pub fn magnitude(magnitude_squared: &[u32], out: &mut [i16]) {
    assert_eq!(magnitude_squared.len(), out.len());
    out.par_iter_mut()
        .zip(magnitude_squared.par_iter())
        .for_each(|(out, &mag_sq)| *out = magnitude_from_squared(mag_sq));
}
