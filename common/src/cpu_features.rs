//! CPU feature detection for runtime SIMD dispatch.
//!
//! Detection runs once and is cached, callers should use these helpers
//! instead of `is_x86_feature_detected!` in hot loops. NEON is mandatory on
//! aarch64 and is selected with `cfg` alone.

use std::sync::OnceLock;

/// Vector extensions the row workers know how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorFeatures {
    pub sse2: bool,
}

static FEATURES: OnceLock<VectorFeatures> = OnceLock::new();

#[cfg(target_arch = "x86_64")]
fn detect() -> VectorFeatures {
    VectorFeatures {
        sse2: is_x86_feature_detected!("sse2"),
    }
}

#[cfg(not(target_arch = "x86_64"))]
fn detect() -> VectorFeatures {
    VectorFeatures { sse2: false }
}

/// Cached feature flags (detected on first call).
#[inline]
pub fn get() -> VectorFeatures {
    *FEATURES.get_or_init(detect)
}

#[inline]
pub fn has_sse2() -> bool {
    get().sse2
}
