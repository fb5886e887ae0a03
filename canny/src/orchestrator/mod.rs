//! Drives one run through the stage state machine.
//!
//! Every compute stage follows the same rendezvous: trigger the remote over
//! its rows, compute the host rows and publish them, wait for the single
//! completion signal, then acquire the remote rows.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::coherency::{AgentBuffers, SharedPool};
use crate::config::PipelineConfig;
use crate::error::{ChannelError, Result, SetupError};
use crate::kernel;
use crate::partition::{Partition, RowSplit};
use crate::plane::{Geometry, Plane};
use crate::postprocess::{apply_hysteresis, non_max_suppression};
use crate::remote::{Accelerator, RemoteChannel};
use crate::stage::{PipelineState, StageCode, StageCommand};
use crate::verify::{self, StageDiff, StagePlanes};
use crate::worker::{host, StageWorker};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: StageCode,
    /// `None` for stages that are not row-partitioned.
    pub split: Option<RowSplit>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritebackReport {
    /// Pixels that did not come back as `pixel + 1`.
    pub mismatches: usize,
}

impl WritebackReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub geometry: Geometry,
    pub timings: Vec<StageTiming>,
    pub writeback: Option<WritebackReport>,
    pub verification: Vec<StageDiff>,
}

impl RunReport {
    pub fn total_elapsed(&self) -> Duration {
        self.timings.iter().map(|t| t.elapsed).sum()
    }

    pub fn timing(&self, stage: StageCode) -> Option<&StageTiming> {
        self.timings.iter().find(|t| t.stage == stage)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} image", self.geometry)?;
        for timing in &self.timings {
            write!(f, ", {} {:?}", timing.stage, timing.elapsed)?;
            if let Some(split) = timing.split {
                write!(f, " ({})", split)?;
            }
        }
        if let Some(writeback) = self.writeback {
            write!(f, ", writeback mismatches {}", writeback.mismatches)?;
        }
        if !self.verification.is_empty() {
            let exact = self.verification.iter().all(|d| d.diff.is_exact());
            write!(f, ", verification {}", if exact { "exact" } else { "diverged" })?;
        }
        Ok(())
    }
}

/// Result of [`detect_edges`].
#[derive(Debug, Clone)]
pub struct EdgeDetection {
    pub planes: StagePlanes,
    pub nms: Plane<u8>,
    /// [`EDGE`](crate::postprocess::EDGE) on edges, [`NOEDGE`](crate::postprocess::NOEDGE) elsewhere.
    pub edges: Plane<u8>,
    pub report: RunReport,
}

/// Host side of a run. Owns the remote channel and the host buffer caches.
pub struct Orchestrator<C: RemoteChannel> {
    geometry: Geometry,
    state: PipelineState,
    config: PipelineConfig,
    channel: C,
    pool: Arc<SharedPool>,
    host_worker: &'static dyn StageWorker,
    buffers: AgentBuffers,
    timings: Vec<StageTiming>,
    writeback: Option<WritebackReport>,
}

impl<C: RemoteChannel> fmt::Debug for Orchestrator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("geometry", &self.geometry)
            .field("state", &self.state)
            .field("host_worker", &self.host_worker.name())
            .finish_non_exhaustive()
    }
}

impl<C: RemoteChannel> Orchestrator<C> {
    /// `buffers` must be attached to `pool`.
    pub fn new(
        pool: Arc<SharedPool>,
        buffers: AgentBuffers,
        channel: C,
        config: PipelineConfig,
    ) -> Self {
        Self {
            geometry: pool.geometry(),
            state: PipelineState::Init,
            host_worker: config.host_worker.worker(),
            config,
            channel,
            pool,
            buffers,
            timings: Vec::new(),
            writeback: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs every stage and stops the remote agent. On failure the remote is
    /// shut down before the error is returned.
    pub async fn run(mut self, image: &Plane<u8>) -> Result<(StagePlanes, RunReport)> {
        match self.run_stages(image).await {
            Ok(planes) => {
                let report = RunReport {
                    geometry: self.geometry,
                    timings: std::mem::take(&mut self.timings),
                    writeback: self.writeback,
                    verification: Vec::new(),
                };
                Ok((planes, report))
            }
            Err(err) => {
                error!("Pipeline aborted in state {}: {}", self.state, err);
                if let Err(shutdown_err) = self.channel.shutdown().await {
                    error!("Failed to stop the remote agent: {}", shutdown_err);
                }
                Err(err)
            }
        }
    }

    async fn run_stages(&mut self, image: &Plane<u8>) -> Result<StagePlanes> {
        if image.geometry() != self.geometry {
            return Err(SetupError::GeometryMismatch {
                expected: self.geometry,
                actual: image.geometry(),
            }
            .into());
        }

        self.init(image).await?;
        if self.config.writeback {
            self.writeback(image).await?;
        }
        self.gaussian().await?;
        self.derivative().await?;
        let magnitude = self.magnitude().await?;

        let planes = StagePlanes {
            smoothed: self.buffers.smoothed.acquire_all().to_plane(),
            delta_x: self.buffers.delta_x.acquire_all().to_plane(),
            delta_y: self.buffers.delta_y.acquire_all().to_plane(),
            magnitude_squared: self.buffers.magnitude_squared.acquire_all().to_plane(),
            magnitude,
        };

        self.delete().await?;
        Ok(planes)
    }

    async fn init(&mut self, image: &Plane<u8>) -> Result<()> {
        let started = Instant::now();
        let all = 0..self.geometry.rows;
        self.buffers
            .image
            .rows_mut(all.clone())
            .copy_from_slice(image.data());
        self.buffers.image.publish(all);

        for descriptor in self.pool.descriptors() {
            self.channel.register_buffer(descriptor)?;
        }
        self.expect_completion(StageCode::Init).await?;

        self.record(StageCode::Init, None, started);
        Ok(())
    }

    async fn writeback(&mut self, image: &Plane<u8>) -> Result<()> {
        self.state.advance(PipelineState::Writeback)?;
        let started = Instant::now();
        let all = 0..self.geometry.rows;

        self.buffers
            .scratch
            .rows_mut(all.clone())
            .copy_from_slice(image.data());
        self.buffers.scratch.publish(all);

        self.channel.trigger(StageCommand::Writeback)?;
        self.expect_completion(StageCode::Writeback).await?;

        let returned = self.buffers.scratch.acquire_all();
        let mismatches = returned
            .as_slice()
            .iter()
            .zip(image.data())
            .filter(|(&back, &sent)| back != sent.wrapping_add(1))
            .count();
        if mismatches != 0 {
            warn!(
                "Writeback returned {} of {} pixels altered unexpectedly",
                mismatches,
                self.geometry.len()
            );
        }
        self.writeback = Some(WritebackReport { mismatches });

        self.record(StageCode::Writeback, None, started);
        Ok(())
    }

    async fn gaussian(&mut self) -> Result<()> {
        self.state.advance(PipelineState::Gaussian)?;
        let started = Instant::now();
        let split = self.trigger_split(StageCommand::Gaussian, self.config.partitions.gaussian)?;

        let rows = split.host_rows();
        if !rows.is_empty() {
            let (worker, geometry, buffers) = (self.host_worker, self.geometry, &mut self.buffers);
            host_compute(|| {
                let halo = kernel::gaussian_halo(rows.clone(), geometry.rows);
                let image = buffers.image.acquire(halo);
                host::smooth(
                    worker,
                    image.as_slice(),
                    geometry,
                    rows.clone(),
                    buffers.smoothed.rows_mut(rows.clone()),
                );
                buffers.smoothed.publish(rows);
            });
        }

        self.expect_completion(StageCode::Gaussian).await?;
        self.buffers.smoothed.acquire(split.remote_rows());

        self.record(StageCode::Gaussian, Some(split), started);
        Ok(())
    }

    async fn derivative(&mut self) -> Result<()> {
        self.state.advance(PipelineState::Derivative)?;
        let started = Instant::now();
        let split =
            self.trigger_split(StageCommand::Derivative, self.config.partitions.derivative)?;

        let rows = split.host_rows();
        if !rows.is_empty() {
            let (worker, geometry, buffers) = (self.host_worker, self.geometry, &mut self.buffers);
            host_compute(|| {
                let halo = kernel::derivative_halo(rows.clone(), geometry.rows);
                let smoothed = buffers.smoothed.acquire(halo);
                host::derivative(
                    worker,
                    smoothed.as_slice(),
                    geometry,
                    rows.clone(),
                    buffers.delta_x.rows_mut(rows.clone()),
                    buffers.delta_y.rows_mut(rows.clone()),
                );
                buffers.delta_x.publish(rows.clone());
                buffers.delta_y.publish(rows);
            });
        }

        self.expect_completion(StageCode::Derivative).await?;
        self.buffers.delta_x.acquire(split.remote_rows());
        self.buffers.delta_y.acquire(split.remote_rows());

        self.record(StageCode::Derivative, Some(split), started);
        Ok(())
    }

    /// Squared magnitudes are split between the agents; the square root runs
    /// on the host over the whole plane after the rendezvous.
    async fn magnitude(&mut self) -> Result<Plane<i16>> {
        self.state.advance(PipelineState::Magnitude)?;
        let started = Instant::now();
        let split =
            self.trigger_split(StageCommand::Magnitude, self.config.partitions.magnitude)?;

        let rows = split.host_rows();
        if !rows.is_empty() {
            let (worker, geometry, buffers) = (self.host_worker, self.geometry, &mut self.buffers);
            host_compute(|| {
                let delta_x = buffers.delta_x.acquire(rows.clone());
                let delta_y = buffers.delta_y.acquire(rows.clone());
                host::magnitude_squared(
                    worker,
                    delta_x.as_slice(),
                    delta_y.as_slice(),
                    geometry,
                    rows.clone(),
                    buffers.magnitude_squared.rows_mut(rows.clone()),
                );
                buffers.magnitude_squared.publish(rows);
            });
        }

        self.expect_completion(StageCode::Magnitude).await?;
        let magnitude_squared = self.buffers.magnitude_squared.acquire(split.remote_rows());

        let mut magnitude = Plane::new(self.geometry);
        host_compute(|| host::magnitude(magnitude_squared.as_slice(), magnitude.data_mut()));

        self.record(StageCode::Magnitude, Some(split), started);
        Ok(magnitude)
    }

    async fn delete(&mut self) -> Result<()> {
        self.state.advance(PipelineState::Delete)?;
        let started = Instant::now();
        self.channel.shutdown().await?;
        self.state.advance(PipelineState::Finished)?;
        self.record(StageCode::Delete, None, started);
        Ok(())
    }

    fn trigger_split(
        &mut self,
        command: fn(Partition) -> StageCommand,
        partition: Partition,
    ) -> Result<RowSplit> {
        let split = partition.split(self.geometry.rows);
        self.channel.trigger(command(partition))?;
        Ok(split)
    }

    async fn expect_completion(&mut self, expected: StageCode) -> Result<()> {
        let received = self.channel.await_completion().await?;
        if received != expected {
            return Err(ChannelError::UnexpectedCompletion { expected, received }.into());
        }
        Ok(())
    }

    fn record(&mut self, stage: StageCode, split: Option<RowSplit>, started: Instant) {
        let elapsed = started.elapsed();
        match split {
            Some(split) => info!("{} finished in {:?} ({})", stage, elapsed, split),
            None => info!("{} finished in {:?}", stage, elapsed),
        }
        self.timings.push(StageTiming {
            stage,
            split,
            elapsed,
        });
    }
}

/// Runs host row work on the current task. On a multi-thread runtime the
/// worker thread is handed off first so other tasks keep running; a
/// current-thread runtime has no other worker to hand off to.
pub(crate) fn host_compute<R>(work: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

/// Runs the full detector on `image` with a freshly spawned remote agent.
///
/// Must be called within a tokio runtime.
pub async fn detect_edges(image: &Plane<u8>, config: &PipelineConfig) -> Result<EdgeDetection> {
    config.validate()?;
    let geometry = image.geometry();
    info!(
        "Detecting edges on a {} image, partitions {}/{}/{}, host {} remote {}",
        geometry,
        config.partitions.gaussian,
        config.partitions.derivative,
        config.partitions.magnitude,
        config.host_worker,
        config.remote_worker
    );

    let pool = SharedPool::new(geometry)?;
    let buffers = AgentBuffers::attach(&pool, geometry, |index| pool.descriptor(index))?;
    let channel = Accelerator::spawn(pool.clone(), config.remote_worker);
    let orchestrator = Orchestrator::new(pool, buffers, channel, config.clone());

    let (planes, mut report) = orchestrator.run(image).await?;

    if config.verify {
        let reference = verify::reference_stages(image);
        report.verification = verify::compare(&planes, &reference);
    }

    let started = Instant::now();
    let nms = non_max_suppression(&planes.magnitude, &planes.delta_x, &planes.delta_y);
    let edges = apply_hysteresis(
        &planes.magnitude,
        &nms,
        config.hysteresis.low,
        config.hysteresis.high,
    );
    info!("Post-processing finished in {:?}", started.elapsed());

    Ok(EdgeDetection {
        planes,
        nms,
        edges,
        report,
    })
}
