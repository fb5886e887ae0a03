//! 128-bit SIMD executor with runtime dispatch:
//! - SSE2 on x86_64
//! - NEON on aarch64
//! - Scalar fallback on other platforms
//!
//! Output is bit-identical to [`ScalarWorker`](super::ScalarWorker). The
//! horizontal blur runs over a zero-padded row together with a 0/1 validity
//! row, so taps outside the image add exactly `+0.0` to both the dot product
//! and the weight sum. Products and sums are never fused, and the vertical
//! finish goes through [`kernel::boost_round`] lane by lane.

use std::ops::Range;

#[cfg(target_arch = "x86_64")]
use common::cpu_features;

use crate::kernel::{self, RADIUS, WINDOW};
use crate::plane::Geometry;

use super::scalar::{magnitude_squared, vertical_neighbours};
use super::StageWorker;

#[cfg(target_arch = "x86_64")]
mod sse;

#[cfg(target_arch = "aarch64")]
mod neon;

#[derive(Debug, Clone, Copy, Default)]
pub struct VectorWorker;

impl StageWorker for VectorWorker {
    fn name(&self) -> &'static str {
        "vector"
    }

    fn smooth_rows(&self, image: &[u8], geometry: Geometry, rows: Range<usize>, out: &mut [i16]) {
        let Geometry {
            rows: height,
            cols: width,
        } = geometry;
        if rows.is_empty() || width == 0 {
            return;
        }
        debug_assert_eq!(out.len(), rows.len() * width);

        let halo = kernel::gaussian_halo(rows.clone(), height);
        let mut temp = vec![0.0f32; halo.len() * width];
        let mut padded = PaddedRow::new(width);
        for (r, temp_row) in halo.clone().zip(temp.chunks_exact_mut(width)) {
            padded.load(&image[r * width..(r + 1) * width]);
            blur_row_x(&padded, temp_row);
        }

        for (r, out_row) in rows.zip(out.chunks_exact_mut(width)) {
            let taps = ColumnTaps::new(r, height, halo.start, width);
            blur_column(&temp, &taps, out_row);
        }
    }

    fn derivative_rows(
        &self,
        smoothed: &[i16],
        geometry: Geometry,
        rows: Range<usize>,
        delta_x: &mut [i16],
        delta_y: &mut [i16],
    ) {
        let Geometry {
            rows: height,
            cols: width,
        } = geometry;
        if rows.is_empty() || width == 0 {
            return;
        }

        for (r, (dx_row, dy_row)) in rows.zip(
            delta_x
                .chunks_exact_mut(width)
                .zip(delta_y.chunks_exact_mut(width)),
        ) {
            let row = &smoothed[r * width..(r + 1) * width];
            if width < 2 {
                dx_row.fill(0);
            } else {
                difference(&row[2..], &row[..width - 2], &mut dx_row[1..width - 1]);
                dx_row[0] = row[1].wrapping_sub(row[0]);
                dx_row[width - 1] = row[width - 1].wrapping_sub(row[width - 2]);
            }

            match vertical_neighbours(r, height) {
                None => dy_row.fill(0),
                Some((above, below)) => difference(
                    &smoothed[below * width..(below + 1) * width],
                    &smoothed[above * width..(above + 1) * width],
                    dy_row,
                ),
            }
        }
    }

    fn magnitude_squared_rows(
        &self,
        delta_x: &[i16],
        delta_y: &[i16],
        geometry: Geometry,
        rows: Range<usize>,
        out: &mut [u32],
    ) {
        let span = geometry.row_span(rows);
        magnitude_squared_span(&delta_x[span.clone()], &delta_y[span], out);
    }
}

/// One image row as f32, padded with `RADIUS` zeros on each side.
struct PaddedRow {
    values: Vec<f32>,
    valid: Vec<f32>,
}

impl PaddedRow {
    fn new(width: usize) -> Self {
        let mut valid = vec![0.0f32; width + 2 * RADIUS];
        valid[RADIUS..RADIUS + width].fill(1.0);
        Self {
            values: vec![0.0f32; width + 2 * RADIUS],
            valid,
        }
    }

    fn load(&mut self, row: &[u8]) {
        for (dst, &px) in self.values[RADIUS..RADIUS + row.len()].iter_mut().zip(row) {
            *dst = px as f32;
        }
    }
}

/// Vertical taps of one output row: `(offset of the temp row, weight)` pairs
/// in ascending row order, and their weight sum.
struct ColumnTaps {
    terms: [(usize, f32); WINDOW],
    len: usize,
    sum: f32,
}

impl ColumnTaps {
    fn new(r: usize, height: usize, halo_start: usize, width: usize) -> Self {
        let taps = kernel::taps();
        let mut terms = [(0usize, 0.0f32); WINDOW];
        let mut len = 0;
        let mut sum = 0.0f32;
        for (k, &tap) in taps.iter().enumerate() {
            let rr = r as isize + k as isize - RADIUS as isize;
            if rr >= 0 && (rr as usize) < height {
                terms[len] = ((rr as usize - halo_start) * width, tap);
                len += 1;
                sum += tap;
            }
        }
        Self { terms, len, sum }
    }

    #[inline]
    fn terms(&self) -> &[(usize, f32)] {
        &self.terms[..self.len]
    }
}

fn blur_row_x(padded: &PaddedRow, out: &mut [f32]) {
    #[cfg(target_arch = "x86_64")]
    {
        if cpu_features::has_sse2() {
            unsafe {
                sse::blur_row_x_sse2(&padded.values, &padded.valid, out);
            }
            return;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        unsafe {
            neon::blur_row_x_neon(&padded.values, &padded.valid, out);
        }
        return;
    }

    #[allow(unreachable_code)]
    blur_row_x_tail(&padded.values, &padded.valid, out, 0);
}

fn blur_column(temp: &[f32], taps: &ColumnTaps, out: &mut [i16]) {
    #[cfg(target_arch = "x86_64")]
    {
        if cpu_features::has_sse2() {
            unsafe {
                sse::blur_column_sse2(temp, taps, out);
            }
            return;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        unsafe {
            neon::blur_column_neon(temp, taps, out);
        }
        return;
    }

    #[allow(unreachable_code)]
    blur_column_tail(temp, taps, out, 0);
}

/// `out = lhs - rhs`, wrapping.
fn difference(lhs: &[i16], rhs: &[i16], out: &mut [i16]) {
    #[cfg(target_arch = "x86_64")]
    {
        if cpu_features::has_sse2() {
            unsafe {
                sse::difference_sse2(lhs, rhs, out);
            }
            return;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        unsafe {
            neon::difference_neon(lhs, rhs, out);
        }
        return;
    }

    #[allow(unreachable_code)]
    difference_tail(lhs, rhs, out, 0);
}

fn magnitude_squared_span(delta_x: &[i16], delta_y: &[i16], out: &mut [u32]) {
    #[cfg(target_arch = "x86_64")]
    {
        if cpu_features::has_sse2() {
            unsafe {
                sse::magnitude_squared_sse2(delta_x, delta_y, out);
            }
            return;
        }
    }

    #[cfg(target_arch = "aarch64")]
    {
        unsafe {
            neon::magnitude_squared_neon(delta_x, delta_y, out);
        }
        return;
    }

    #[allow(unreachable_code)]
    magnitude_squared_tail(delta_x, delta_y, out, 0);
}

// Scalar tails, also the whole computation when no vector unit is present.

fn blur_row_x_tail(values: &[f32], valid: &[f32], out: &mut [f32], start: usize) {
    let taps = kernel::taps();
    for (c, out) in out.iter_mut().enumerate().skip(start) {
        let mut dot = 0.0f32;
        let mut sum = 0.0f32;
        for (k, &tap) in taps.iter().enumerate() {
            dot += values[c + k] * tap;
            sum += valid[c + k] * tap;
        }
        *out = dot / sum;
    }
}

fn blur_column_tail(temp: &[f32], taps: &ColumnTaps, out: &mut [i16], start: usize) {
    for (c, out) in out.iter_mut().enumerate().skip(start) {
        let mut dot = 0.0f32;
        for &(offset, tap) in taps.terms() {
            dot += temp[offset + c] * tap;
        }
        *out = kernel::boost_round(dot, taps.sum);
    }
}

fn difference_tail(lhs: &[i16], rhs: &[i16], out: &mut [i16], start: usize) {
    for ((out, &a), &b) in out.iter_mut().zip(lhs).zip(rhs).skip(start) {
        *out = a.wrapping_sub(b);
    }
}

fn magnitude_squared_tail(delta_x: &[i16], delta_y: &[i16], out: &mut [u32], start: usize) {
    for ((out, &dx), &dy) in out.iter_mut().zip(delta_x).zip(delta_y).skip(start) {
        *out = magnitude_squared(dx, dy);
    }
}
