//! Link between the orchestrator and the remote agent.
//!
//! The host registers every shared buffer once, then drives each stage with
//! a non-blocking [`RemoteChannel::trigger`] followed by exactly one
//! [`RemoteChannel::await_completion`].

use std::future::Future;

use crate::error::ChannelError;
use crate::stage::{StageCode, StageCommand};

pub use crate::coherency::BufferDescriptor;

mod accelerator;
mod handshake;

#[cfg(test)]
mod tests;

pub use accelerator::Accelerator;
pub use handshake::{BufferTable, Handshake, HandshakeProgress};

/// Messages travelling host -> remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMessage {
    Register(BufferDescriptor),
    Command(StageCommand),
}

/// Messages travelling remote -> host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    Completed(StageCode),
    Failed(String),
}

pub trait RemoteChannel: Send {
    /// Sends one handshake descriptor. Descriptors go out in `BufferIndex` order.
    fn register_buffer(&mut self, descriptor: BufferDescriptor) -> Result<(), ChannelError>;

    /// Starts a stage on the remote agent without waiting for it.
    fn trigger(&mut self, command: StageCommand) -> Result<(), ChannelError>;

    /// Waits for the next completion signal.
    fn await_completion(
        &mut self,
    ) -> impl Future<Output = Result<StageCode, ChannelError>> + Send;

    /// Sends the termination trigger and waits for the agent to stop.
    /// Never waits for a completion signal.
    fn shutdown(&mut self) -> impl Future<Output = Result<(), ChannelError>> + Send;
}
