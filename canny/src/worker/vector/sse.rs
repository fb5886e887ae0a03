//! SSE2 kernels. Four f32 or eight i16 lanes per step, scalar tails.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

use crate::kernel::{self, WINDOW};

use super::ColumnTaps;

/// Horizontal blur of a padded row.
///
/// # Safety
/// Caller must ensure SSE2 is available. `values` and `valid` must hold
/// `out.len() + WINDOW - 1` elements.
#[target_feature(enable = "sse2")]
pub(super) unsafe fn blur_row_x_sse2(values: &[f32], valid: &[f32], out: &mut [f32]) {
    unsafe {
        let taps = kernel::taps();
        let width = out.len();
        assert!(values.len() >= width + WINDOW - 1 && valid.len() == values.len());

        let mut c = 0;
        while c + 4 <= width {
            let mut dot = _mm_setzero_ps();
            let mut sum = _mm_setzero_ps();
            for (k, &tap) in taps.iter().enumerate() {
                let weight = _mm_set1_ps(tap);
                let px = _mm_loadu_ps(values.as_ptr().add(c + k));
                let ok = _mm_loadu_ps(valid.as_ptr().add(c + k));
                dot = _mm_add_ps(dot, _mm_mul_ps(px, weight));
                sum = _mm_add_ps(sum, _mm_mul_ps(ok, weight));
            }
            _mm_storeu_ps(out.as_mut_ptr().add(c), _mm_div_ps(dot, sum));
            c += 4;
        }

        super::blur_row_x_tail(values, valid, out, c);
    }
}

/// Vertical blur of one output row, four columns per step.
///
/// # Safety
/// Caller must ensure SSE2 is available. Every term offset plus `out.len()`
/// must lie within `temp`.
#[target_feature(enable = "sse2")]
pub(super) unsafe fn blur_column_sse2(temp: &[f32], taps: &ColumnTaps, out: &mut [i16]) {
    unsafe {
        let width = out.len();
        assert!(taps.terms().iter().all(|&(offset, _)| offset + width <= temp.len()));

        let mut lanes = [0.0f32; 4];
        let mut c = 0;
        while c + 4 <= width {
            let mut dot = _mm_setzero_ps();
            for &(offset, tap) in taps.terms() {
                let v = _mm_loadu_ps(temp.as_ptr().add(offset + c));
                dot = _mm_add_ps(dot, _mm_mul_ps(v, _mm_set1_ps(tap)));
            }
            _mm_storeu_ps(lanes.as_mut_ptr(), dot);
            for (out, &dot) in out[c..c + 4].iter_mut().zip(&lanes) {
                *out = kernel::boost_round(dot, taps.sum);
            }
            c += 4;
        }

        super::blur_column_tail(temp, taps, out, c);
    }
}

/// # Safety
/// Caller must ensure SSE2 is available.
#[target_feature(enable = "sse2")]
pub(super) unsafe fn difference_sse2(lhs: &[i16], rhs: &[i16], out: &mut [i16]) {
    unsafe {
        let n = out.len();
        assert!(lhs.len() >= n && rhs.len() >= n);

        let mut i = 0;
        while i + 8 <= n {
            let a = _mm_loadu_si128(lhs.as_ptr().add(i) as *const __m128i);
            let b = _mm_loadu_si128(rhs.as_ptr().add(i) as *const __m128i);
            _mm_storeu_si128(out.as_mut_ptr().add(i) as *mut __m128i, _mm_sub_epi16(a, b));
            i += 8;
        }

        super::difference_tail(lhs, rhs, out, i);
    }
}

/// Interleaves dx/dy so `pmaddwd` yields `dx² + dy²` per lane. The only i32
/// overflow (both -32768) wraps to `0x8000_0000`, which is the correct u32.
///
/// # Safety
/// Caller must ensure SSE2 is available.
#[target_feature(enable = "sse2")]
pub(super) unsafe fn magnitude_squared_sse2(delta_x: &[i16], delta_y: &[i16], out: &mut [u32]) {
    unsafe {
        let n = out.len();
        assert!(delta_x.len() >= n && delta_y.len() >= n);

        let mut i = 0;
        while i + 8 <= n {
            let dx = _mm_loadu_si128(delta_x.as_ptr().add(i) as *const __m128i);
            let dy = _mm_loadu_si128(delta_y.as_ptr().add(i) as *const __m128i);
            let lo = _mm_unpacklo_epi16(dx, dy);
            let hi = _mm_unpackhi_epi16(dx, dy);
            let dst = out.as_mut_ptr().add(i);
            _mm_storeu_si128(dst as *mut __m128i, _mm_madd_epi16(lo, lo));
            _mm_storeu_si128(dst.add(4) as *mut __m128i, _mm_madd_epi16(hi, hi));
            i += 8;
        }

        super::magnitude_squared_tail(delta_x, delta_y, out, i);
    }
}
