//! Gaussian smoothing kernel and the halo arithmetic that goes with it.

use std::ops::Range;
use std::sync::OnceLock;

/// Standard deviation of the smoothing kernel.
pub const SIGMA: f32 = 2.5;

/// Taps on each side of the center: `ceil(2.5 * SIGMA)`.
pub const RADIUS: usize = 7;

/// Window size: `1 + 2 * RADIUS`.
pub const WINDOW: usize = 2 * RADIUS + 1;

/// Fixed-point scale applied to smoothed values before they are stored as i16.
pub const BOOST_BLUR_FACTOR: f64 = 90.0;

const _: () = assert!(WINDOW == 15);

static KERNEL: OnceLock<[f32; WINDOW]> = OnceLock::new();

/// Normalized 1D Gaussian taps, index `RADIUS` is the center.
#[inline]
pub fn taps() -> &'static [f32; WINDOW] {
    KERNEL.get_or_init(build_taps)
}

/// `e` and `2π` are the truncated literals `2.71828` and `6.2831853`, and
/// `sigma²`, the offsets and the running sum are f32. Smoothed planes depend
/// on the last bit of every tap.
fn build_taps() -> [f32; WINDOW] {
    let sigma_sq = (SIGMA * SIGMA) as f64;
    let norm = SIGMA as f64 * 6.2831853f64.sqrt();

    let mut taps = [0.0f32; WINDOW];
    let mut sum = 0.0f32;
    for (i, tap) in taps.iter_mut().enumerate() {
        let x = (i as i32 - RADIUS as i32) as f32;
        let fx = (2.71828f64.powf(-0.5 * x as f64 * x as f64 / sigma_sq) / norm) as f32;
        *tap = fx;
        sum += fx;
    }
    for tap in taps.iter_mut() {
        *tap /= sum;
    }
    taps
}

/// Fixed-point rounding of the vertical pass.
///
/// Computed in f64 so every executor rounds the same way.
#[inline]
pub fn boost_round(dot: f32, sum: f32) -> i16 {
    ((dot as f64) * BOOST_BLUR_FACTOR / (sum as f64) + 0.5) as i16
}

/// Rows of the horizontal pass needed to smooth `rows`.
#[inline]
pub fn gaussian_halo(rows: Range<usize>, total_rows: usize) -> Range<usize> {
    rows.start.saturating_sub(RADIUS)..(rows.end + RADIUS).min(total_rows)
}

/// Rows of the smoothed plane needed to differentiate `rows`.
#[inline]
pub fn derivative_halo(rows: Range<usize>, total_rows: usize) -> Range<usize> {
    rows.start.saturating_sub(1)..(rows.end + 1).min(total_rows)
}
