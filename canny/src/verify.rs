//! Verification mode: the whole pipeline recomputed by the scalar worker on a
//! single agent, diffed plane by plane against the split run.

use log::{info, warn};
use rayon::prelude::*;

use crate::plane::{Geometry, Plane};
use crate::stage::StageCode;
use crate::worker::{host, ScalarWorker, StageWorker};

/// Every intermediate plane of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlanes {
    pub smoothed: Plane<i16>,
    pub delta_x: Plane<i16>,
    pub delta_y: Plane<i16>,
    pub magnitude_squared: Plane<u32>,
    pub magnitude: Plane<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffReport {
    pub max_abs_diff: u64,
    pub mse: f64,
    pub mismatches: usize,
    /// `(row, col)` of the first differing pixel in row-major order.
    pub first_mismatch: Option<(usize, usize)>,
}

impl DiffReport {
    pub fn is_exact(&self) -> bool {
        self.mismatches == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageDiff {
    pub stage: StageCode,
    pub plane: &'static str,
    pub diff: DiffReport,
}

/// Serial scalar reference over the full image.
pub fn reference_stages(image: &Plane<u8>) -> StagePlanes {
    let geometry = image.geometry();
    let all = 0..geometry.rows;
    let worker = ScalarWorker;

    let mut smoothed = Plane::new(geometry);
    worker.smooth_rows(image.data(), geometry, all.clone(), smoothed.data_mut());

    let mut delta_x = Plane::new(geometry);
    let mut delta_y = Plane::new(geometry);
    worker.derivative_rows(
        smoothed.data(),
        geometry,
        all.clone(),
        delta_x.data_mut(),
        delta_y.data_mut(),
    );

    let mut magnitude_squared = Plane::new(geometry);
    worker.magnitude_squared_rows(
        delta_x.data(),
        delta_y.data(),
        geometry,
        all,
        magnitude_squared.data_mut(),
    );

    let mut magnitude = Plane::new(geometry);
    host::magnitude(magnitude_squared.data(), magnitude.data_mut());

    StagePlanes {
        smoothed,
        delta_x,
        delta_y,
        magnitude_squared,
        magnitude,
    }
}

pub fn diff_planes<T>(actual: &Plane<T>, expected: &Plane<T>) -> DiffReport
where
    T: Copy + Into<i64> + Send + Sync,
{
    let geometry: Geometry = actual.geometry();
    assert_eq!(
        geometry,
        expected.geometry(),
        "Cannot diff planes of different shapes"
    );

    let pairs = || actual.data().par_iter().zip(expected.data().par_iter());

    let (max_abs_diff, sum_sq, mismatches) = pairs()
        .map(|(&a, &e)| {
            let d = (a.into() - e.into()).unsigned_abs();
            (d, (d as f64) * (d as f64), (d != 0) as usize)
        })
        .reduce(
            || (0u64, 0.0f64, 0usize),
            |x, y| (x.0.max(y.0), x.1 + y.1, x.2 + y.2),
        );

    let first_mismatch = if mismatches == 0 {
        None
    } else {
        pairs()
            .position_first(|(&a, &e)| a.into() != e.into())
            .map(|i| (i / geometry.cols, i % geometry.cols))
    };

    let len = geometry.len();
    DiffReport {
        max_abs_diff,
        mse: if len == 0 { 0.0 } else { sum_sq / len as f64 },
        mismatches,
        first_mismatch,
    }
}

/// Diffs every plane and logs a warning per mismatch. Never fails.
pub fn compare(actual: &StagePlanes, expected: &StagePlanes) -> Vec<StageDiff> {
    let diffs = vec![
        StageDiff {
            stage: StageCode::Gaussian,
            plane: "smoothed",
            diff: diff_planes(&actual.smoothed, &expected.smoothed),
        },
        StageDiff {
            stage: StageCode::Derivative,
            plane: "delta_x",
            diff: diff_planes(&actual.delta_x, &expected.delta_x),
        },
        StageDiff {
            stage: StageCode::Derivative,
            plane: "delta_y",
            diff: diff_planes(&actual.delta_y, &expected.delta_y),
        },
        StageDiff {
            stage: StageCode::Magnitude,
            plane: "magnitude_squared",
            diff: diff_planes(&actual.magnitude_squared, &expected.magnitude_squared),
        },
        StageDiff {
            stage: StageCode::Magnitude,
            plane: "magnitude",
            diff: diff_planes(&actual.magnitude, &expected.magnitude),
        },
    ];

    for d in &diffs {
        if d.diff.is_exact() {
            info!("Verified {} {}: exact", d.stage, d.plane);
        } else {
            warn!(
                "Verification mismatch in {} {}: {} pixels, max |diff| {}, mse {:.4}, first at {:?}",
                d.stage,
                d.plane,
                d.diff.mismatches,
                d.diff.max_abs_diff,
                d.diff.mse,
                d.diff.first_mismatch
            );
        }
    }

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_planes_are_exact() {
        let plane = Plane::filled(Geometry::new(3, 4), 17i16);
        let report = diff_planes(&plane, &plane);
        assert!(report.is_exact());
        assert_eq!(report.max_abs_diff, 0);
        assert_eq!(report.mse, 0.0);
        assert_eq!(report.first_mismatch, None);
    }

    #[test]
    fn reports_max_mse_and_first_mismatch() {
        let geometry = Geometry::new(2, 3);
        let expected = Plane::from_vec(geometry, vec![0u32, 0, 0, 0, 0, 0]).unwrap();
        let actual = Plane::from_vec(geometry, vec![0u32, 0, 0, 2, 0, 4]).unwrap();

        let report = diff_planes(&actual, &expected);
        assert_eq!(report.max_abs_diff, 4);
        assert_eq!(report.mismatches, 2);
        assert!((report.mse - 20.0 / 6.0).abs() < common::EPSILON);
        assert_eq!(report.first_mismatch, Some((1, 0)));
    }

    #[test]
    fn handles_negative_differences() {
        let geometry = Geometry::new(1, 2);
        let a = Plane::from_vec(geometry, vec![i16::MIN, 5]).unwrap();
        let b = Plane::from_vec(geometry, vec![i16::MAX, 5]).unwrap();
        assert_eq!(diff_planes(&a, &b).max_abs_diff, 65535);
    }

    #[test]
    fn reference_of_flat_image() {
        let image = Plane::filled(Geometry::new(6, 5), 10u8);
        let planes = reference_stages(&image);
        assert!(planes.smoothed.data().iter().all(|&v| v == 900));
        assert!(planes.delta_x.data().iter().all(|&v| v == 0));
        assert!(planes.delta_y.data().iter().all(|&v| v == 0));
        assert!(planes.magnitude.data().iter().all(|&v| v == 0));

        let diffs = compare(&planes, &planes);
        assert_eq!(diffs.len(), 5);
        assert!(diffs.iter().all(|d| d.diff.is_exact()));
    }
}
