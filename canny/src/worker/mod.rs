//! Row-range executors for the three partitioned stages.
//!
//! Every method computes exactly the rows in `rows` of a `geometry`-shaped
//! image. Inputs are whole planes (indexed with absolute rows), outputs hold
//! only the requested rows.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::plane::Geometry;

pub mod host;
pub mod scalar;
pub mod vector;

#[cfg(test)]
mod tests;

pub use scalar::ScalarWorker;
pub use vector::VectorWorker;

pub trait StageWorker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Separable Gaussian blur with edge renormalization, boosted to i16.
    fn smooth_rows(&self, image: &[u8], geometry: Geometry, rows: Range<usize>, out: &mut [i16]);

    /// Central differences, one-sided on the borders.
    fn derivative_rows(
        &self,
        smoothed: &[i16],
        geometry: Geometry,
        rows: Range<usize>,
        delta_x: &mut [i16],
        delta_y: &mut [i16],
    );

    /// `dx² + dy²` per pixel.
    fn magnitude_squared_rows(
        &self,
        delta_x: &[i16],
        delta_y: &[i16],
        geometry: Geometry,
        rows: Range<usize>,
        out: &mut [u32],
    );
}

/// Which executor an agent runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    #[default]
    Vector,
    Scalar,
}

impl WorkerKind {
    pub fn worker(self) -> &'static dyn StageWorker {
        match self {
            WorkerKind::Vector => &VectorWorker,
            WorkerKind::Scalar => &ScalarWorker,
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.worker().name())
    }
}
