use std::sync::Arc;

use strum::IntoEnumIterator;

use super::*;
use crate::coherency::{AgentBuffers, BufferIndex, SharedPool};
use crate::partition::Partition;
use crate::plane::Geometry;
use crate::worker::{ScalarWorker, StageWorker, WorkerKind};

fn pool(rows: usize, cols: usize) -> Arc<SharedPool> {
    SharedPool::new(Geometry::new(rows, cols)).unwrap()
}

async fn handshake(channel: &mut Accelerator, pool: &SharedPool) {
    for descriptor in pool.descriptors() {
        channel.register_buffer(descriptor).unwrap();
    }
    assert_eq!(channel.await_completion().await.unwrap(), StageCode::Init);
}

#[test]
fn handshake_completes_in_order() {
    let pool = pool(3, 3);
    let mut handshake = Handshake::default();

    let mut table = None;
    for index in BufferIndex::iter() {
        match handshake.register(pool.descriptor(index)).unwrap() {
            HandshakeProgress::Pending { registered } => {
                assert_eq!(registered, index.position() + 1);
            }
            HandshakeProgress::Complete(t) => table = Some(t),
        }
    }

    assert!(handshake.is_complete());
    let table = table.expect("handshake never completed");
    for index in BufferIndex::iter() {
        assert_eq!(table.get(index), pool.descriptor(index));
    }
}

#[test]
fn handshake_rejects_out_of_order_descriptor() {
    let pool = pool(3, 3);
    let mut handshake = Handshake::default();
    handshake
        .register(pool.descriptor(BufferIndex::Geometry))
        .unwrap();

    let err = handshake
        .register(pool.descriptor(BufferIndex::Smoothed))
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelError::OutOfOrder {
            expected: BufferIndex::Image,
            received: BufferIndex::Smoothed
        }
    ));
}

#[test]
fn handshake_rejects_duplicates() {
    let pool = pool(3, 3);
    let mut handshake = Handshake::default();
    handshake
        .register(pool.descriptor(BufferIndex::Geometry))
        .unwrap();
    assert!(matches!(
        handshake.register(pool.descriptor(BufferIndex::Geometry)),
        Err(ChannelError::DuplicateBuffer(BufferIndex::Geometry))
    ));

    let mut handshake = Handshake::default();
    for d in pool.descriptors() {
        handshake.register(d).unwrap();
    }
    assert!(matches!(
        handshake.register(pool.descriptor(BufferIndex::MagnitudeSquared)),
        Err(ChannelError::DuplicateBuffer(BufferIndex::MagnitudeSquared))
    ));
}

#[tokio::test]
async fn accelerator_signals_init_after_handshake() {
    let pool = pool(4, 6);
    let mut channel = Accelerator::spawn(pool.clone(), WorkerKind::Scalar);
    handshake(&mut channel, &pool).await;
    channel.shutdown().await.unwrap();
}

#[tokio::test]
async fn accelerator_fails_on_out_of_order_handshake() {
    let pool = pool(4, 6);
    let mut channel = Accelerator::spawn(pool.clone(), WorkerKind::Scalar);

    channel
        .register_buffer(pool.descriptor(BufferIndex::Image))
        .unwrap();
    let err = channel.await_completion().await.unwrap_err();
    assert!(matches!(err, ChannelError::RemoteFault(_)), "{err}");

    channel.shutdown().await.unwrap();
}

#[tokio::test]
async fn accelerator_rejects_commands_before_handshake() {
    let pool = pool(2, 2);
    let mut channel = Accelerator::spawn(pool.clone(), WorkerKind::Scalar);

    channel
        .trigger(StageCommand::Gaussian(Partition::EVEN))
        .unwrap();
    let err = channel.await_completion().await.unwrap_err();
    assert!(matches!(err, ChannelError::RemoteFault(_)), "{err}");

    channel.shutdown().await.unwrap();
}

#[tokio::test]
async fn accelerator_smooths_its_rows_only() {
    let pool = pool(10, 12);
    let geometry = pool.geometry();
    let mut host = AgentBuffers::attach(&pool, geometry, |i| pool.descriptor(i)).unwrap();
    let image: Vec<u8> = (0..geometry.len()).map(|i| (i * 37 % 251) as u8).collect();
    host.image.rows_mut(0..10).copy_from_slice(&image);
    host.image.publish(0..10);

    let mut channel = Accelerator::spawn(pool.clone(), WorkerKind::Vector);
    handshake(&mut channel, &pool).await;

    let partition = Partition::new(30).unwrap();
    channel.trigger(StageCommand::Gaussian(partition)).unwrap();
    assert_eq!(
        channel.await_completion().await.unwrap(),
        StageCode::Gaussian
    );

    let mut expected = vec![0i16; geometry.len()];
    ScalarWorker.smooth_rows(&image, geometry, 0..10, &mut expected);

    let split = partition.split(10).split;
    let smoothed = host.smoothed.acquire_all();
    assert_eq!(
        &smoothed.as_slice()[..split * 12],
        &expected[..split * 12]
    );
    assert!(smoothed.as_slice()[split * 12..].iter().all(|&v| v == 0));

    channel.shutdown().await.unwrap();
}

#[tokio::test]
async fn empty_remote_range_still_completes() {
    let pool = pool(5, 5);
    let mut channel = Accelerator::spawn(pool.clone(), WorkerKind::Scalar);
    handshake(&mut channel, &pool).await;

    for command in [
        StageCommand::Gaussian(Partition::HOST_ONLY),
        StageCommand::Derivative(Partition::HOST_ONLY),
        StageCommand::Magnitude(Partition::HOST_ONLY),
    ] {
        channel.trigger(command).unwrap();
        assert_eq!(channel.await_completion().await.unwrap(), command.code());
    }

    channel.shutdown().await.unwrap();
}

#[tokio::test]
async fn writeback_increments_every_pixel() {
    let pool = pool(3, 4);
    let geometry = pool.geometry();
    let mut host = AgentBuffers::attach(&pool, geometry, |i| pool.descriptor(i)).unwrap();
    let pixels: Vec<u8> = vec![0, 1, 2, 254, 255, 128, 7, 9, 200, 100, 50, 25];
    host.scratch.rows_mut(0..3).copy_from_slice(&pixels);
    host.scratch.publish(0..3);

    let mut channel = Accelerator::spawn(pool.clone(), WorkerKind::Scalar);
    handshake(&mut channel, &pool).await;
    channel.trigger(StageCommand::Writeback).unwrap();
    assert_eq!(
        channel.await_completion().await.unwrap(),
        StageCode::Writeback
    );

    let returned = host.scratch.acquire_all();
    let expected: Vec<u8> = pixels.iter().map(|p| p.wrapping_add(1)).collect();
    assert_eq!(returned.as_slice(), expected.as_slice());

    channel.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_is_idempotent_and_disconnects() {
    let pool = pool(2, 3);
    let mut channel = Accelerator::spawn(pool.clone(), WorkerKind::Scalar);
    handshake(&mut channel, &pool).await;

    channel.shutdown().await.unwrap();
    channel.shutdown().await.unwrap();
    assert!(matches!(
        channel.trigger(StageCommand::Writeback),
        Err(ChannelError::Disconnected)
    ));
    assert!(matches!(
        channel.await_completion().await,
        Err(ChannelError::Disconnected)
    ));
}
