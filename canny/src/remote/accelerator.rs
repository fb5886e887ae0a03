use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use crate::coherency::{AgentBuffers, BufferIndex, SharedPool};
use crate::error::{ChannelError, SetupError};
use crate::kernel;
use crate::plane::Geometry;
use crate::stage::{StageCode, StageCommand};
use crate::worker::{StageWorker, WorkerKind};

use super::handshake::{BufferTable, Handshake, HandshakeProgress};
use super::{BufferDescriptor, RemoteChannel, RemoteEvent, RemoteMessage};

const QUEUE_DEPTH: usize = 16;

/// Remote agent running on its own blocking thread, attached to the shared
/// pool through the descriptors it receives in the handshake.
#[derive(Debug)]
pub struct Accelerator {
    commands: Option<mpsc::Sender<RemoteMessage>>,
    events: mpsc::Receiver<RemoteEvent>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Accelerator {
    /// Starts the agent thread. Must be called within a tokio runtime.
    pub fn spawn(pool: Arc<SharedPool>, worker: WorkerKind) -> Self {
        let (commands, command_rx) = mpsc::channel(QUEUE_DEPTH);
        let (event_tx, events) = mpsc::channel(QUEUE_DEPTH);
        let thread_handle = tokio::task::spawn_blocking(move || {
            remote_loop(pool, worker, command_rx, event_tx);
        });

        Self {
            commands: Some(commands),
            events,
            thread_handle: Some(thread_handle),
        }
    }

    fn send(&self, msg: RemoteMessage) -> Result<(), ChannelError> {
        let commands = self.commands.as_ref().ok_or(ChannelError::Disconnected)?;
        commands.try_send(msg).map_err(|err| match err {
            TrySendError::Full(_) => ChannelError::QueueFull,
            TrySendError::Closed(_) => ChannelError::Disconnected,
        })
    }
}

impl RemoteChannel for Accelerator {
    fn register_buffer(&mut self, descriptor: BufferDescriptor) -> Result<(), ChannelError> {
        debug!(
            "Registering {} at offset {:#x}, {} bytes",
            descriptor.index, descriptor.address, descriptor.size_bytes
        );
        self.send(RemoteMessage::Register(descriptor))
    }

    fn trigger(&mut self, command: StageCommand) -> Result<(), ChannelError> {
        debug!("Triggering remote {:?}", command);
        self.send(RemoteMessage::Command(command))
    }

    async fn await_completion(&mut self) -> Result<StageCode, ChannelError> {
        match self.events.recv().await {
            Some(RemoteEvent::Completed(code)) => {
                debug!("Remote completed {}", code);
                Ok(code)
            }
            Some(RemoteEvent::Failed(reason)) => Err(ChannelError::RemoteFault(reason)),
            None => Err(ChannelError::Disconnected),
        }
    }

    async fn shutdown(&mut self) -> Result<(), ChannelError> {
        if let Some(commands) = self.commands.take() {
            let delete = RemoteMessage::Command(StageCommand::Delete);
            if commands.send(delete).await.is_err() {
                debug!("Remote agent already stopped");
            }
        }
        // Unblocks the agent if it is still trying to report.
        self.events.close();

        if let Some(thread_handle) = self.thread_handle.take() {
            thread_handle.await?;
        }
        Ok(())
    }
}

impl Drop for Accelerator {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            error!("Accelerator dropped while its thread is still running; call shutdown() first");
        }
    }
}

fn remote_loop(
    pool: Arc<SharedPool>,
    worker: WorkerKind,
    mut commands: mpsc::Receiver<RemoteMessage>,
    events: mpsc::Sender<RemoteEvent>,
) {
    let mut handshake = Handshake::default();
    let mut agent: Option<RemoteAgent> = None;

    while let Some(msg) = commands.blocking_recv() {
        let outcome: Result<StageCode, String> = match msg {
            RemoteMessage::Register(descriptor) => match handshake.register(descriptor) {
                Ok(HandshakeProgress::Pending { registered }) => {
                    debug!("Remote registered {} of {}", registered, BufferIndex::COUNT);
                    continue;
                }
                Ok(HandshakeProgress::Complete(table)) => {
                    match RemoteAgent::attach(&pool, &table, worker) {
                        Ok(attached) => {
                            agent = Some(attached);
                            Ok(StageCode::Init)
                        }
                        Err(err) => Err(err.to_string()),
                    }
                }
                Err(err) => Err(err.to_string()),
            },
            RemoteMessage::Command(StageCommand::Delete) => {
                debug!("Remote agent received delete");
                break;
            }
            RemoteMessage::Command(command) => match agent.as_mut() {
                Some(agent) => Ok(agent.execute(command)),
                None => Err(ChannelError::NotReady(command.code()).to_string()),
            },
        };

        let event = match outcome {
            Ok(code) => RemoteEvent::Completed(code),
            Err(reason) => {
                error!("Remote agent fault: {}", reason);
                RemoteEvent::Failed(reason)
            }
        };
        let fatal = matches!(event, RemoteEvent::Failed(_));
        if events.blocking_send(event).is_err() || fatal {
            break;
        }
    }

    debug!("Remote agent stopped");
}

struct RemoteAgent {
    geometry: Geometry,
    worker: &'static dyn StageWorker,
    buffers: AgentBuffers,
}

impl RemoteAgent {
    fn attach(
        pool: &Arc<SharedPool>,
        table: &BufferTable,
        kind: WorkerKind,
    ) -> Result<Self, SetupError> {
        let geometry = pool.read_geometry(&table.get(BufferIndex::Geometry))?;
        let buffers = AgentBuffers::attach(pool, geometry, |index| table.get(index))?;
        info!("Remote agent attached to a {} image, {} worker", geometry, kind);

        Ok(Self {
            geometry,
            worker: kind.worker(),
            buffers,
        })
    }

    fn execute(&mut self, command: StageCommand) -> StageCode {
        let started = Instant::now();
        let rows = command
            .partition()
            .map(|p| p.split(self.geometry.rows).remote_rows())
            .unwrap_or(0..self.geometry.rows);

        match command {
            StageCommand::Writeback => self.writeback(),
            StageCommand::Gaussian(_) => self.gaussian(rows.clone()),
            StageCommand::Derivative(_) => self.derivative(rows.clone()),
            StageCommand::Magnitude(_) => self.magnitude_squared(rows.clone()),
            StageCommand::Delete => {}
        }

        debug!(
            "Remote {} over rows {:?} took {:?}",
            command.code(),
            rows,
            started.elapsed()
        );
        command.code()
    }

    fn writeback(&mut self) {
        let all = 0..self.geometry.rows;
        self.buffers.scratch.acquire(all.clone());
        for px in self.buffers.scratch.rows_mut(all.clone()) {
            *px = px.wrapping_add(1);
        }
        self.buffers.scratch.publish(all);
    }

    fn gaussian(&mut self, rows: Range<usize>) {
        if rows.is_empty() {
            return;
        }
        let halo = kernel::gaussian_halo(rows.clone(), self.geometry.rows);
        let image = self.buffers.image.acquire(halo);
        self.worker.smooth_rows(
            image.as_slice(),
            self.geometry,
            rows.clone(),
            self.buffers.smoothed.rows_mut(rows.clone()),
        );
        self.buffers.smoothed.publish(rows);
    }

    fn derivative(&mut self, rows: Range<usize>) {
        if rows.is_empty() {
            return;
        }
        let halo = kernel::derivative_halo(rows.clone(), self.geometry.rows);
        let smoothed = self.buffers.smoothed.acquire(halo);
        self.worker.derivative_rows(
            smoothed.as_slice(),
            self.geometry,
            rows.clone(),
            self.buffers.delta_x.rows_mut(rows.clone()),
            self.buffers.delta_y.rows_mut(rows.clone()),
        );
        self.buffers.delta_x.publish(rows.clone());
        self.buffers.delta_y.publish(rows);
    }

    fn magnitude_squared(&mut self, rows: Range<usize>) {
        if rows.is_empty() {
            return;
        }
        let delta_x = self.buffers.delta_x.acquire(rows.clone());
        let delta_y = self.buffers.delta_y.acquire(rows.clone());
        self.worker.magnitude_squared_rows(
            delta_x.as_slice(),
            delta_y.as_slice(),
            self.geometry,
            rows.clone(),
            self.buffers.magnitude_squared.rows_mut(rows.clone()),
        );
        self.buffers.magnitude_squared.publish(rows);
    }
}
