pub mod cpu_features;
pub mod file_format;
pub mod log_setup;
pub mod parallel;
pub mod test_utils;

pub const EPSILON: f64 = 1e-6;
