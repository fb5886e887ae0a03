use canny::error::SetupError;
use canny::pgm::{load_pgm, save_pgm};
use canny::postprocess::{EDGE, NOEDGE};
use canny::worker::scalar::magnitude_from_squared;
use canny::{
    detect_edges, EdgeDetection, Error, Geometry, Partition, PipelineConfig, Plane, StageCode,
    StagePartitions, WorkerKind,
};
use common::test_utils::test_output_path;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn image_from(rows: usize, cols: usize, f: impl Fn(usize, usize) -> u8) -> Plane<u8> {
    let data = (0..rows * cols).map(|i| f(i / cols, i % cols)).collect();
    Plane::from_vec(Geometry::new(rows, cols), data).unwrap()
}

fn random_image(rows: usize, cols: usize, seed: u64) -> Plane<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..rows * cols).map(|_| rng.random::<u8>()).collect();
    Plane::from_vec(Geometry::new(rows, cols), data).unwrap()
}

fn config(gaussian: u8, derivative: u8, magnitude: u8) -> PipelineConfig {
    PipelineConfig {
        partitions: StagePartitions {
            gaussian: Partition::new(gaussian).unwrap(),
            derivative: Partition::new(derivative).unwrap(),
            magnitude: Partition::new(magnitude).unwrap(),
        },
        ..PipelineConfig::default()
    }
}

async fn run(image: &Plane<u8>, config: &PipelineConfig) -> EdgeDetection {
    detect_edges(image, config).await.unwrap()
}

#[tokio::test]
async fn bright_column_same_edges_host_only_and_remote_only() {
    let image = image_from(8, 8, |_, c| if c == 4 { 255 } else { 0 });

    let host_only = run(&image, &config(100, 100, 100)).await;
    let remote_only = run(&image, &config(0, 0, 0)).await;

    assert_eq!(host_only.planes, remote_only.planes);
    assert_eq!(host_only.nms, remote_only.nms);
    assert_eq!(host_only.edges, remote_only.edges);
    assert!(host_only
        .edges
        .data()
        .iter()
        .all(|&v| v == EDGE || v == NOEDGE));
}

#[tokio::test]
async fn even_split_does_not_diverge_from_host_only() {
    let image = random_image(37, 23, 11);

    let split = run(&image, &config(50, 50, 50)).await;
    let host_only = run(&image, &config(100, 100, 100)).await;

    let cols = image.cols();
    let planes = [
        (&split.planes.smoothed, &host_only.planes.smoothed),
        (&split.planes.delta_x, &host_only.planes.delta_x),
        (&split.planes.delta_y, &host_only.planes.delta_y),
        (&split.planes.magnitude, &host_only.planes.magnitude),
    ];
    for (a, b) in planes {
        for (r, (ra, rb)) in a.data().chunks(cols).zip(b.data().chunks(cols)).enumerate() {
            assert_eq!(ra, rb, "row {r} diverged");
        }
    }
    assert_eq!(
        split.planes.magnitude_squared,
        host_only.planes.magnitude_squared
    );
    assert_eq!(split.edges, host_only.edges);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn split_run_on_multi_thread_runtime() {
    let image = random_image(33, 19, 5);

    let split = run(&image, &config(50, 30, 70)).await;
    let host_only = run(&image, &config(100, 100, 100)).await;

    assert_eq!(split.planes, host_only.planes);
    assert_eq!(split.edges, host_only.edges);
}

#[tokio::test]
async fn mixed_partitions_verify_exactly() {
    let image = random_image(29, 41, 3);
    let mut config = config(20, 70, 45);
    config.verify = true;
    config.host_worker = WorkerKind::Vector;
    config.remote_worker = WorkerKind::Vector;

    let detection = run(&image, &config).await;
    let verification = &detection.report.verification;
    assert_eq!(verification.len(), 5);
    for diff in verification {
        assert!(diff.diff.is_exact(), "{} {} diverged", diff.stage, diff.plane);
    }

    let gaussian = detection.report.timing(StageCode::Gaussian).unwrap();
    assert_eq!(gaussian.split.unwrap().split, 29 * 80 / 100);
}

#[tokio::test]
async fn flat_image_smooths_to_boosted_value() {
    let image = image_from(13, 9, |_, _| 100);
    let detection = run(&image, &PipelineConfig::default()).await;

    assert!(detection.planes.smoothed.data().iter().all(|&v| v == 9000));
    assert!(detection.planes.magnitude.data().iter().all(|&v| v == 0));
    assert!(detection.edges.data().iter().all(|&v| v == NOEDGE));
}

#[tokio::test]
async fn ramp_has_constant_interior_gradient() {
    let image = image_from(10, 40, |_, c| c as u8);
    let detection = run(&image, &config(30, 60, 50)).await;

    let delta_x = &detection.planes.delta_x;
    for r in 0..10 {
        for c in 8..32 {
            let dx = delta_x.get(r, c);
            assert!((dx - 180).abs() <= 1, "dx {dx} at ({r}, {c})");
        }
    }
}

#[tokio::test]
async fn magnitude_is_rounded_norm() {
    let image = random_image(16, 16, 99);
    let detection = run(&image, &config(30, 30, 30)).await;
    let planes = &detection.planes;

    for i in 0..image.geometry().len() {
        let dx = planes.delta_x.data()[i] as i64;
        let dy = planes.delta_y.data()[i] as i64;
        let squared = (dx * dx + dy * dy) as u32;
        assert_eq!(planes.magnitude_squared.data()[i], squared);
        let expected = ((squared as f64).sqrt() + 0.5) as i16;
        assert_eq!(planes.magnitude.data()[i], expected);
        assert_eq!(magnitude_from_squared(squared), expected);
    }
}

#[tokio::test]
async fn vertical_step_becomes_a_connected_edge() {
    let image = image_from(32, 32, |_, c| if c < 16 { 0 } else { 200 });
    let detection = run(&image, &PipelineConfig::default()).await;
    let edges = &detection.edges;

    for r in 8..24 {
        assert!(
            edges.get(r, 15) == EDGE || edges.get(r, 16) == EDGE,
            "row {r} lost the step"
        );
        for c in 0..8 {
            assert_eq!(edges.get(r, c), NOEDGE);
        }
    }
}

#[tokio::test]
async fn writeback_round_trip_is_clean() {
    let image = random_image(7, 9, 5);
    let mut config = config(50, 50, 50);
    config.writeback = true;

    let detection = run(&image, &config).await;
    let writeback = detection.report.writeback.unwrap();
    assert!(writeback.is_clean(), "{} mismatches", writeback.mismatches);
    assert_eq!(detection.report.timings[1].stage, StageCode::Writeback);
}

#[tokio::test]
async fn zero_sized_image_is_rejected() {
    let image = Plane::<u8>::new(Geometry::new(0, 5));
    let err = detect_edges(&image, &PipelineConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Setup(SetupError::EmptyImage(_))), "{err}");
}

#[tokio::test]
async fn single_row_and_single_column_images() {
    for geometry in [Geometry::new(1, 12), Geometry::new(12, 1)] {
        let image = image_from(geometry.rows, geometry.cols, |r, c| (r * 20 + c * 20) as u8);
        let split = run(&image, &config(50, 50, 50)).await;
        let host_only = run(&image, &config(100, 100, 100)).await;
        assert_eq!(split.planes, host_only.planes, "{geometry}");
        assert!(split.edges.data().iter().all(|&v| v == NOEDGE));
    }
}

#[tokio::test]
async fn edge_map_survives_pgm_round_trip() {
    let image = image_from(20, 20, |r, c| if r + c < 20 { 30 } else { 220 });
    let detection = run(&image, &PipelineConfig::default()).await;

    let path = test_output_path("pipeline_edges.pgm");
    save_pgm(&path, &detection.edges).unwrap();
    assert_eq!(load_pgm(&path).unwrap(), detection.edges);
}
