use crate::coherency::{BufferDescriptor, BufferIndex};
use crate::error::ChannelError;

/// Remote side of buffer registration. One instance per run.
#[derive(Debug, Default)]
pub struct Handshake {
    received: Vec<BufferDescriptor>,
}

#[derive(Debug)]
pub enum HandshakeProgress {
    Pending { registered: usize },
    Complete(BufferTable),
}

/// Every registered descriptor, indexed by [`BufferIndex`].
#[derive(Debug, Clone)]
pub struct BufferTable {
    descriptors: Vec<BufferDescriptor>,
}

impl BufferTable {
    pub fn get(&self, index: BufferIndex) -> BufferDescriptor {
        self.descriptors[index.position()]
    }
}

impl Handshake {
    pub fn is_complete(&self) -> bool {
        self.received.len() == BufferIndex::COUNT
    }

    /// Accepts the next descriptor. Descriptors must arrive in `BufferIndex`
    /// order, each exactly once.
    pub fn register(
        &mut self,
        descriptor: BufferDescriptor,
    ) -> Result<HandshakeProgress, ChannelError> {
        if self.received.iter().any(|d| d.index == descriptor.index) {
            return Err(ChannelError::DuplicateBuffer(descriptor.index));
        }

        let expected = BufferIndex::from_repr(self.received.len() as u8)
            .ok_or(ChannelError::DuplicateBuffer(descriptor.index))?;
        if descriptor.index != expected {
            return Err(ChannelError::OutOfOrder {
                expected,
                received: descriptor.index,
            });
        }

        self.received.push(descriptor);
        if self.is_complete() {
            Ok(HandshakeProgress::Complete(BufferTable {
                descriptors: self.received.clone(),
            }))
        } else {
            Ok(HandshakeProgress::Pending {
                registered: self.received.len(),
            })
        }
    }
}
