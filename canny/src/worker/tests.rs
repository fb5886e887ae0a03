use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::scalar::{magnitude_from_squared, magnitude_squared};
use super::*;

const WORKERS: [WorkerKind; 2] = [WorkerKind::Scalar, WorkerKind::Vector];

fn random_image(rng: &mut StdRng, geometry: Geometry) -> Vec<u8> {
    (0..geometry.len()).map(|_| rng.random::<u8>()).collect()
}

fn random_i16(rng: &mut StdRng, len: usize) -> Vec<i16> {
    (0..len).map(|_| rng.random::<i16>()).collect()
}

fn smooth_all(worker: &dyn StageWorker, image: &[u8], geometry: Geometry) -> Vec<i16> {
    let mut out = vec![0i16; geometry.len()];
    worker.smooth_rows(image, geometry, 0..geometry.rows, &mut out);
    out
}

fn derivative_all(
    worker: &dyn StageWorker,
    smoothed: &[i16],
    geometry: Geometry,
) -> (Vec<i16>, Vec<i16>) {
    let mut dx = vec![0i16; geometry.len()];
    let mut dy = vec![0i16; geometry.len()];
    worker.derivative_rows(smoothed, geometry, 0..geometry.rows, &mut dx, &mut dy);
    (dx, dy)
}

#[test]
fn flat_image_smooths_to_boosted_value() {
    let geometry = Geometry::new(11, 23);
    for value in [0u8, 1, 37, 128, 255] {
        let image = vec![value; geometry.len()];
        let expected = (value as f64 * 90.0 + 0.5) as i16;
        for kind in WORKERS {
            let smoothed = smooth_all(kind.worker(), &image, geometry);
            assert!(
                smoothed.iter().all(|&v| v == expected),
                "{kind} smoothed {value} incorrectly"
            );
        }
    }
}

#[test]
fn point_spreads_evenly() {
    let geometry = Geometry::new(9, 9);
    let mut image = vec![0u8; geometry.len()];
    image[4 * 9 + 4] = 255;

    for kind in WORKERS {
        let s = smooth_all(kind.worker(), &image, geometry);
        for r in 0..9 {
            for c in 0..9 {
                let here = s[r * 9 + c] as i32;
                assert!((here - s[c * 9 + r] as i32).abs() <= 1, "{kind} at ({r}, {c})");
                assert!((here - s[r * 9 + (8 - c)] as i32).abs() <= 1, "{kind} at ({r}, {c})");
            }
        }
        for c in 0..4 {
            assert!(s[4 * 9 + c] < s[4 * 9 + c + 1], "{kind} not peaked");
        }
    }
}

#[test]
fn horizontal_ramp_derivative() {
    let geometry = Geometry::new(5, 10);
    let ramp: Vec<i16> = (0..geometry.len()).map(|i| (i % 10) as i16).collect();

    for kind in WORKERS {
        let (dx, dy) = derivative_all(kind.worker(), &ramp, geometry);
        for r in 0..5 {
            let row = &dx[r * 10..(r + 1) * 10];
            assert_eq!(row[0], 1, "{kind}");
            assert_eq!(row[9], 1, "{kind}");
            assert!(row[1..9].iter().all(|&v| v == 2), "{kind}: {row:?}");
        }
        assert!(dy.iter().all(|&v| v == 0), "{kind}");
    }
}

#[test]
fn vertical_ramp_derivative() {
    let geometry = Geometry::new(7, 3);
    let ramp: Vec<i16> = (0..geometry.len()).map(|i| (i / 3) as i16 * 5).collect();

    for kind in WORKERS {
        let (dx, dy) = derivative_all(kind.worker(), &ramp, geometry);
        assert!(dx.iter().all(|&v| v == 0), "{kind}");
        assert_eq!(&dy[..3], &[5, 5, 5]);
        assert!(dy[3..18].iter().all(|&v| v == 10), "{kind}: {dy:?}");
        assert_eq!(&dy[18..], &[5, 5, 5]);
    }
}

#[test]
fn degenerate_shapes_have_zero_gradient() {
    let column = Geometry::new(4, 1);
    let row = Geometry::new(1, 4);
    let data = vec![3i16, 9, -4, 12];

    for kind in WORKERS {
        let (dx, dy) = derivative_all(kind.worker(), &data, column);
        assert_eq!(dx, vec![0; 4]);
        assert_eq!(dy, vec![6, -7, 3, 16]);

        let (dx, dy) = derivative_all(kind.worker(), &data, row);
        assert_eq!(dx, vec![6, -7, 3, 16]);
        assert_eq!(dy, vec![0; 4]);
    }
}

#[test]
fn derivative_wraps_on_overflow() {
    let geometry = Geometry::new(1, 3);
    let data = vec![i16::MIN, 0, i16::MAX];
    for kind in WORKERS {
        let (dx, _) = derivative_all(kind.worker(), &data, geometry);
        assert_eq!(dx, vec![i16::MIN, -1, i16::MAX], "{kind}");
    }
}

#[test]
fn magnitude_squared_extremes() {
    assert_eq!(magnitude_squared(3, 4), 25);
    assert_eq!(magnitude_squared(i16::MIN, i16::MIN), 1 << 31);
    assert_eq!(magnitude_squared(i16::MAX, i16::MIN), 32767 * 32767 + (1 << 30));

    assert_eq!(magnitude_from_squared(25), 5);
    assert_eq!(magnitude_from_squared(2), 1);
    assert_eq!(magnitude_from_squared(3), 2);
    assert_eq!(magnitude_from_squared(0), 0);
    assert_eq!(magnitude_from_squared(1 << 31), i16::MAX);

    let geometry = Geometry::new(2, 9);
    let dx = vec![i16::MIN; geometry.len()];
    let dy: Vec<i16> = (0..geometry.len() as i16).map(|i| i - 9).collect();
    for kind in WORKERS {
        let mut out = vec![0u32; geometry.len()];
        kind.worker()
            .magnitude_squared_rows(&dx, &dy, geometry, 0..2, &mut out);
        for (i, &v) in out.iter().enumerate() {
            assert_eq!(v, magnitude_squared(dx[i], dy[i]), "{kind} at {i}");
        }
    }
}

#[test]
fn vector_matches_scalar_on_random_images() {
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let shapes = [(1, 1), (1, 17), (17, 1), (3, 4), (8, 8), (16, 15), (31, 33), (64, 7)];

    for (rows, cols) in shapes {
        let geometry = Geometry::new(rows, cols);
        let image = random_image(&mut rng, geometry);

        let scalar = smooth_all(&ScalarWorker, &image, geometry);
        let vector = smooth_all(&VectorWorker, &image, geometry);
        assert_eq!(scalar, vector, "smoothing differs for {geometry}");

        let gradients = random_i16(&mut rng, geometry.len());
        assert_eq!(
            derivative_all(&ScalarWorker, &gradients, geometry),
            derivative_all(&VectorWorker, &gradients, geometry),
            "derivative differs for {geometry}"
        );

        let dy = random_i16(&mut rng, geometry.len());
        let mut scalar_mag = vec![0u32; geometry.len()];
        let mut vector_mag = vec![0u32; geometry.len()];
        ScalarWorker.magnitude_squared_rows(&gradients, &dy, geometry, 0..rows, &mut scalar_mag);
        VectorWorker.magnitude_squared_rows(&gradients, &dy, geometry, 0..rows, &mut vector_mag);
        assert_eq!(scalar_mag, vector_mag, "magnitude differs for {geometry}");
    }
}

#[test]
fn row_ranges_reproduce_full_image() {
    let mut rng = StdRng::seed_from_u64(7);
    let geometry = Geometry::new(19, 13);
    let image = random_image(&mut rng, geometry);
    let full = smooth_all(&ScalarWorker, &image, geometry);
    let (full_dx, full_dy) = derivative_all(&ScalarWorker, &full, geometry);

    for kind in WORKERS {
        let worker = kind.worker();
        for start in 0..geometry.rows {
            for end in start + 1..=geometry.rows {
                let span = geometry.row_span(start..end);

                let mut smoothed = vec![0i16; span.len()];
                worker.smooth_rows(&image, geometry, start..end, &mut smoothed);
                assert_eq!(smoothed, full[span.clone()], "{kind} smooth {start}..{end}");

                let mut dx = vec![0i16; span.len()];
                let mut dy = vec![0i16; span.len()];
                worker.derivative_rows(&full, geometry, start..end, &mut dx, &mut dy);
                assert_eq!(dx, full_dx[span.clone()], "{kind} dx {start}..{end}");
                assert_eq!(dy, full_dy[span], "{kind} dy {start}..{end}");
            }
        }
    }
}

#[test]
fn host_lanes_match_serial_worker() {
    let mut rng = StdRng::seed_from_u64(99);
    let geometry = Geometry::new(57, 41);
    let image = random_image(&mut rng, geometry);
    let full = smooth_all(&ScalarWorker, &image, geometry);
    let (full_dx, full_dy) = derivative_all(&ScalarWorker, &full, geometry);

    let rows = 20..57;
    let span = geometry.row_span(rows.clone());
    for kind in WORKERS {
        let worker = kind.worker();

        let mut smoothed = vec![0i16; span.len()];
        host::smooth(worker, &image, geometry, rows.clone(), &mut smoothed);
        assert_eq!(smoothed, full[span.clone()], "{kind}");

        let mut dx = vec![0i16; span.len()];
        let mut dy = vec![0i16; span.len()];
        host::derivative(worker, &full, geometry, rows.clone(), &mut dx, &mut dy);
        assert_eq!(dx, full_dx[span.clone()], "{kind}");
        assert_eq!(dy, full_dy[span.clone()], "{kind}");

        let mut mag_sq = vec![0u32; span.len()];
        host::magnitude_squared(worker, &full_dx, &full_dy, geometry, rows.clone(), &mut mag_sq);
        for (i, &v) in mag_sq.iter().enumerate() {
            let at = span.start + i;
            assert_eq!(v, magnitude_squared(full_dx[at], full_dy[at]));
        }
    }
}

#[test]
fn host_lanes_skip_empty_range() {
    let geometry = Geometry::new(4, 4);
    let image = vec![10u8; geometry.len()];
    let mut out: Vec<i16> = Vec::new();
    host::smooth(&VectorWorker, &image, geometry, 4..4, &mut out);
    assert!(out.is_empty());
}

#[test]
fn worker_kind_parses_from_config_names() {
    let kind: WorkerKind = serde_json::from_str("\"scalar\"").unwrap();
    assert_eq!(kind, WorkerKind::Scalar);
    assert_eq!(WorkerKind::default(), WorkerKind::Vector);
    assert_eq!(WorkerKind::Vector.to_string(), "vector");
}
