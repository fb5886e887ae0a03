use strum_macros::{Display, EnumCount, EnumIter, FromRepr};

use crate::error::Error;
use crate::partition::Partition;

/// Completion signal sent by the remote agent.
///
/// Numeric values are part of the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, FromRepr)]
#[repr(u32)]
pub enum StageCode {
    Init = 0,
    Delete = 1,
    Writeback = 2,
    Gaussian = 3,
    Derivative = 4,
    Magnitude = 5,
}

impl StageCode {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::from_repr(code)
    }
}

/// Trigger sent to the remote agent. Compute stages carry their partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageCommand {
    Writeback,
    Gaussian(Partition),
    Derivative(Partition),
    Magnitude(Partition),
    Delete,
}

impl StageCommand {
    pub fn code(&self) -> StageCode {
        match self {
            StageCommand::Writeback => StageCode::Writeback,
            StageCommand::Gaussian(_) => StageCode::Gaussian,
            StageCommand::Derivative(_) => StageCode::Derivative,
            StageCommand::Magnitude(_) => StageCode::Magnitude,
            StageCommand::Delete => StageCode::Delete,
        }
    }

    pub fn partition(&self) -> Option<Partition> {
        match *self {
            StageCommand::Gaussian(p) | StageCommand::Derivative(p) | StageCommand::Magnitude(p) => {
                Some(p)
            }
            StageCommand::Writeback | StageCommand::Delete => None,
        }
    }
}

/// Orchestrator position in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum PipelineState {
    Init,
    Writeback,
    Gaussian,
    Derivative,
    Magnitude,
    Delete,
    Finished,
}

impl PipelineState {
    /// Forward-only transitions. Writeback is the only state that may be skipped.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        use PipelineState::*;

        matches!(
            (self, next),
            (Init, Writeback)
                | (Init, Gaussian)
                | (Writeback, Gaussian)
                | (Gaussian, Derivative)
                | (Derivative, Magnitude)
                | (Magnitude, Delete)
                | (Delete, Finished)
        )
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<(), Error> {
        if !self.can_advance_to(next) {
            return Err(Error::Transition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}
