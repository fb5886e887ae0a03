use std::path::PathBuf;

use crate::coherency::BufferIndex;
use crate::plane::Geometry;
use crate::stage::{PipelineState, StageCode};

/// Failures while sizing or attaching buffers. Fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Image has zero size ({0})")]
    EmptyImage(Geometry),
    #[error("Shared arena size overflows for a {0} image")]
    ArenaOverflow(Geometry),
    #[error("Buffer {index} needs {expected} bytes, descriptor has {actual}")]
    BufferSizeMismatch {
        index: BufferIndex,
        expected: usize,
        actual: usize,
    },
    #[error("Buffer {index} stores {expected}-byte elements, attached as {actual}-byte")]
    ElementSizeMismatch {
        index: BufferIndex,
        expected: usize,
        actual: usize,
    },
    #[error("Descriptor for {index} lies outside the shared arena")]
    OutOfArena { index: BufferIndex },
    #[error("Plane data has {actual} elements, a {geometry} plane needs {}", .geometry.len())]
    PlaneSizeMismatch { geometry: Geometry, actual: usize },
    #[error("Image is {actual}, pipeline was set up for {expected}")]
    GeometryMismatch { expected: Geometry, actual: Geometry },
}

/// Failures of the link to the remote agent. Fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Remote agent is unreachable")]
    Disconnected,
    #[error("Remote command queue is full")]
    QueueFull,
    #[error("Handshake expected buffer {expected}, received {received}")]
    OutOfOrder {
        expected: BufferIndex,
        received: BufferIndex,
    },
    #[error("Buffer {0} registered twice")]
    DuplicateBuffer(BufferIndex),
    #[error("Command {0} received before the handshake completed")]
    NotReady(StageCode),
    #[error("Expected completion of {expected}, received {received}")]
    UnexpectedCompletion {
        expected: StageCode,
        received: StageCode,
    },
    #[error("Remote agent failed: {0}")]
    RemoteFault(String),
    #[error("Remote agent thread failed to join")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Percentage {0} is outside 0..=100")]
    PercentageOutOfRange(u8),
    #[error("Hysteresis threshold {name} = {value} is outside [0, 1]")]
    ThresholdOutOfRange { name: &'static str, value: f32 },
    #[error("Failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Format(#[from] common::file_format::FileExtensionError),
    #[error(transparent)]
    Parse(#[from] common::file_format::SerdeFormatError),
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to decode image {path}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to create {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode image {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Image {0} is too large for the PGM encoder")]
    TooLarge(Geometry),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Invalid stage transition {from} -> {to}")]
    Transition {
        from: PipelineState,
        to: PipelineState,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
