//! NEON kernels, mirroring the SSE2 ones.

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

use crate::kernel::{self, WINDOW};

use super::ColumnTaps;

/// # Safety
/// `values` and `valid` must hold `out.len() + WINDOW - 1` elements.
#[target_feature(enable = "neon")]
pub(super) unsafe fn blur_row_x_neon(values: &[f32], valid: &[f32], out: &mut [f32]) {
    unsafe {
        let taps = kernel::taps();
        let width = out.len();
        assert!(values.len() >= width + WINDOW - 1 && valid.len() == values.len());

        let mut c = 0;
        while c + 4 <= width {
            let mut dot = vdupq_n_f32(0.0);
            let mut sum = vdupq_n_f32(0.0);
            for (k, &tap) in taps.iter().enumerate() {
                let weight = vdupq_n_f32(tap);
                let px = vld1q_f32(values.as_ptr().add(c + k));
                let ok = vld1q_f32(valid.as_ptr().add(c + k));
                dot = vaddq_f32(dot, vmulq_f32(px, weight));
                sum = vaddq_f32(sum, vmulq_f32(ok, weight));
            }
            vst1q_f32(out.as_mut_ptr().add(c), vdivq_f32(dot, sum));
            c += 4;
        }

        super::blur_row_x_tail(values, valid, out, c);
    }
}

/// # Safety
/// Every term offset plus `out.len()` must lie within `temp`.
#[target_feature(enable = "neon")]
pub(super) unsafe fn blur_column_neon(temp: &[f32], taps: &ColumnTaps, out: &mut [i16]) {
    unsafe {
        let width = out.len();
        assert!(taps.terms().iter().all(|&(offset, _)| offset + width <= temp.len()));

        let mut lanes = [0.0f32; 4];
        let mut c = 0;
        while c + 4 <= width {
            let mut dot = vdupq_n_f32(0.0);
            for &(offset, tap) in taps.terms() {
                let v = vld1q_f32(temp.as_ptr().add(offset + c));
                dot = vaddq_f32(dot, vmulq_f32(v, vdupq_n_f32(tap)));
            }
            vst1q_f32(lanes.as_mut_ptr(), dot);
            for (out, &dot) in out[c..c + 4].iter_mut().zip(&lanes) {
                *out = kernel::boost_round(dot, taps.sum);
            }
            c += 4;
        }

        super::blur_column_tail(temp, taps, out, c);
    }
}

/// # Safety
/// NEON must be available (always true on aarch64).
#[target_feature(enable = "neon")]
pub(super) unsafe fn difference_neon(lhs: &[i16], rhs: &[i16], out: &mut [i16]) {
    unsafe {
        let n = out.len();
        assert!(lhs.len() >= n && rhs.len() >= n);

        let mut i = 0;
        while i + 8 <= n {
            let a = vld1q_s16(lhs.as_ptr().add(i));
            let b = vld1q_s16(rhs.as_ptr().add(i));
            vst1q_s16(out.as_mut_ptr().add(i), vsubq_s16(a, b));
            i += 8;
        }

        super::difference_tail(lhs, rhs, out, i);
    }
}

/// Widening multiply-accumulate, the i32 wrap of `2 * 32768²` reads back as
/// the correct u32.
///
/// # Safety
/// NEON must be available (always true on aarch64).
#[target_feature(enable = "neon")]
pub(super) unsafe fn magnitude_squared_neon(delta_x: &[i16], delta_y: &[i16], out: &mut [u32]) {
    unsafe {
        let n = out.len();
        assert!(delta_x.len() >= n && delta_y.len() >= n);

        let mut i = 0;
        while i + 8 <= n {
            let dx = vld1q_s16(delta_x.as_ptr().add(i));
            let dy = vld1q_s16(delta_y.as_ptr().add(i));
            let dx_lo = vget_low_s16(dx);
            let dy_lo = vget_low_s16(dy);
            let lo = vmlal_s16(vmull_s16(dx_lo, dx_lo), dy_lo, dy_lo);
            let hi = vmlal_high_s16(vmull_high_s16(dx, dx), dy, dy);
            let dst = out.as_mut_ptr().add(i);
            vst1q_u32(dst, vreinterpretq_u32_s32(lo));
            vst1q_u32(dst.add(4), vreinterpretq_u32_s32(hi));
            i += 8;
        }

        super::magnitude_squared_tail(delta_x, delta_y, out, i);
    }
}
