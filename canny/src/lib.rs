//! Canny edge detection split by rows between the host and a remote
//! accelerator agent that share one memory arena.

pub mod coherency;
pub mod config;
pub mod error;
pub mod kernel;
pub mod orchestrator;
pub mod partition;
pub mod pgm;
pub mod plane;
pub mod postprocess;
pub mod remote;
pub mod stage;
pub mod verify;
pub mod worker;

pub use config::{HysteresisThresholds, PipelineConfig, StagePartitions};
pub use error::{Error, Result};
pub use orchestrator::{detect_edges, EdgeDetection, Orchestrator, RunReport};
pub use partition::{Partition, RowSplit};
pub use plane::{Geometry, Plane};
pub use stage::{StageCode, StageCommand};
pub use verify::StagePlanes;
pub use worker::WorkerKind;
