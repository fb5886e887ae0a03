//! Scalar reference implementation. Every other executor must match it bit for bit.

use std::ops::Range;

use crate::kernel::{self, RADIUS};
use crate::plane::Geometry;

use super::StageWorker;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarWorker;

impl StageWorker for ScalarWorker {
    fn name(&self) -> &'static str {
        "scalar"
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
        for (r, temp_row) in halo.clone().zip(temp.chunks_exact_mut(width)) {
            blur_row_x(&image[r * width..(r + 1) * width], temp_row);
        }

        let taps = kernel::taps();
        for (r, out_row) in rows.zip(out.chunks_exact_mut(width)) {
            for (c, out) in out_row.iter_mut().enumerate() {
                let mut dot = 0.0f32;
                let mut sum = 0.0f32;
                for (k, &tap) in taps.iter().enumerate() {
                    let rr = r as isize + k as isize - RADIUS as isize;
                    if rr >= 0 && (rr as usize) < height {
                        dot += temp[(rr as usize - halo.start) * width + c] * tap;
                        sum += tap;
                    }
                }
                *out = kernel::boost_round(dot, sum);
            }
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
                dx_row[0] = row[1].wrapping_sub(row[0]);
                for c in 1..width - 1 {
                    dx_row[c] = row[c + 1].wrapping_sub(row[c - 1]);
                }
                dx_row[width - 1] = row[width - 1].wrapping_sub(row[width - 2]);
            }

            match vertical_neighbours(r, height) {
                None => dy_row.fill(0),
                Some((above, below)) => {
                    let above = &smoothed[above * width..(above + 1) * width];
                    let below = &smoothed[below * width..(below + 1) * width];
                    for (dy, (&b, &a)) in dy_row.iter_mut().zip(below.iter().zip(above)) {
                        *dy = b.wrapping_sub(a);
                    }
                }
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
        for ((out, &dx), &dy) in out
            .iter_mut()
            .zip(&delta_x[span.clone()])
            .zip(&delta_y[span])
        {
            *out = magnitude_squared(dx, dy);
        }
    }
}

/// Horizontal pass over one image row. Taps falling outside the row are
/// dropped from both the dot product and the weight sum.
pub(crate) fn blur_row_x(row: &[u8], out: &mut [f32]) {
    let taps = kernel::taps();
    let width = row.len();
    for (c, out) in out.iter_mut().enumerate() {
        let mut dot = 0.0f32;
        let mut sum = 0.0f32;
        for (k, &tap) in taps.iter().enumerate() {
            let cc = c as isize + k as isize - RADIUS as isize;
            if cc >= 0 && (cc as usize) < width {
                dot += row[cc as usize] as f32 * tap;
                sum += tap;
            }
        }
        *out = dot / sum;
    }
}

/// Rows differenced for `dy` at row `r`, `None` for single-row images.
#[inline]
pub(crate) fn vertical_neighbours(r: usize, height: usize) -> Option<(usize, usize)> {
    if height < 2 {
        None
    } else if r == 0 {
        Some((0, 1))
    } else if r == height - 1 {
        Some((height - 2, height - 1))
    } else {
        Some((r - 1, r + 1))
    }
}

#[inline]
pub fn magnitude_squared(dx: i16, dy: i16) -> u32 {
    let dx = dx as i32;
    let dy = dy as i32;
    (dx * dx) as u32 + (dy * dy) as u32
}

/// `trunc(sqrt(mag_sq) + 0.5)`, saturating at `i16::MAX`.
#[inline]
pub fn magnitude_from_squared(mag_sq: u32) -> i16 {
    ((mag_sq as f64).sqrt() + 0.5) as i16
}
