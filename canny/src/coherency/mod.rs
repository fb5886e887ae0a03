//! Shared-memory arena and per-agent buffer caches.
//!
//! Every agent works on a private cache of each buffer. Writes stay in the
//! cache until [`SharedBuffer::publish`] copies rows into the arena, and an
//! agent only sees rows written by the other agent after
//! [`SharedBuffer::acquire`] pulls them back. `acquire` is the only read path.

use std::mem::size_of;
use std::ops::Range;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use log::debug;
use parking_lot::RwLock;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumCount, EnumIter, FromRepr};

use crate::error::SetupError;
use crate::plane::{Geometry, Plane};


/// Arena offsets are aligned to a cache line on every supported target.
const ARENA_ALIGNMENT: usize = 128;

/// Buffers registered with the remote agent, in handshake order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumCount, FromRepr,
)]
#[repr(u8)]
pub enum BufferIndex {
    Geometry = 0,
    Image = 1,
    Scratch = 2,
    Smoothed = 3,
    DeltaX = 4,
    DeltaY = 5,
    MagnitudeSquared = 6,
}

impl BufferIndex {
    pub const COUNT: usize = <Self as strum::EnumCount>::COUNT;

    pub fn position(self) -> usize {
        self as usize
    }

    pub fn element_size(self) -> usize {
        match self {
            BufferIndex::Geometry => size_of::<u32>(),
            BufferIndex::Image | BufferIndex::Scratch => size_of::<u8>(),
            BufferIndex::Smoothed | BufferIndex::DeltaX | BufferIndex::DeltaY => size_of::<i16>(),
            BufferIndex::MagnitudeSquared => size_of::<u32>(),
        }
    }

    fn size_bytes(self, geometry: Geometry) -> Option<usize> {
        match self {
            BufferIndex::Geometry => Some(size_of::<GeometryHeader>()),
            _ => geometry
                .rows
                .checked_mul(geometry.cols)?
                .checked_mul(self.element_size()),
        }
    }
}

/// `(address, size)` pair handed to the remote agent during the handshake.
/// The address is a byte offset into the shared arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub index: BufferIndex,
    pub address: usize,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct GeometryHeader {
    rows: u32,
    cols: u32,
}

/// Memory both agents can reach. Only touched through `publish` and `acquire`.
#[derive(Debug)]
pub struct SharedPool {
    geometry: Geometry,
    descriptors: Vec<BufferDescriptor>,
    arena: RwLock<Vec<u8>>,
}

fn align_up(offset: usize) -> Option<usize> {
    Some(offset.checked_add(ARENA_ALIGNMENT - 1)? & !(ARENA_ALIGNMENT - 1))
}

impl SharedPool {
    /// Lays out every buffer for `geometry` and writes the geometry header.
    pub fn new(geometry: Geometry) -> Result<Arc<Self>, SetupError> {
        if geometry.is_empty() {
            return Err(SetupError::EmptyImage(geometry));
        }
        let overflow = || SetupError::ArenaOverflow(geometry);

        let header = GeometryHeader {
            rows: u32::try_from(geometry.rows).map_err(|_| overflow())?,
            cols: u32::try_from(geometry.cols).map_err(|_| overflow())?,
        };

        let mut descriptors = Vec::with_capacity(BufferIndex::COUNT);
        let mut offset = 0usize;
        for index in BufferIndex::iter() {
            let size_bytes = index.size_bytes(geometry).ok_or_else(overflow)?;
            descriptors.push(BufferDescriptor {
                index,
                address: offset,
                size_bytes,
            });
            offset = offset
                .checked_add(size_bytes)
                .and_then(align_up)
                .ok_or_else(overflow)?;
        }

        let mut arena = vec![0u8; offset];
        let header_bytes = bytemuck::bytes_of(&header);
        let header_at = descriptors[BufferIndex::Geometry.position()].address;
        arena[header_at..header_at + header_bytes.len()].copy_from_slice(header_bytes);

        debug!("Shared arena of {} bytes for a {} image", offset, geometry);

        Ok(Arc::new(Self {
            geometry,
            descriptors,
            arena: RwLock::new(arena),
        }))
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn arena_len(&self) -> usize {
        self.arena.read().len()
    }

    /// Address and size of `index`, the host side of buffer registration.
    pub fn descriptor(&self, index: BufferIndex) -> BufferDescriptor {
        self.descriptors[index.position()]
    }

    pub fn descriptors(&self) -> impl Iterator<Item = BufferDescriptor> + '_ {
        self.descriptors.iter().copied()
    }

    /// Reads the geometry header through a registered descriptor.
    pub fn read_geometry(&self, descriptor: &BufferDescriptor) -> Result<Geometry, SetupError> {
        let expected = size_of::<GeometryHeader>();
        if descriptor.index != BufferIndex::Geometry || descriptor.size_bytes != expected {
            return Err(SetupError::BufferSizeMismatch {
                index: descriptor.index,
                expected,
                actual: descriptor.size_bytes,
            });
        }

        let arena = self.arena.read();
        let bytes = descriptor
            .address
            .checked_add(expected)
            .and_then(|end| arena.get(descriptor.address..end))
            .ok_or(SetupError::OutOfArena {
                index: descriptor.index,
            })?;
        let header: GeometryHeader = bytemuck::pod_read_unaligned(bytes);

        Ok(Geometry::new(header.rows as usize, header.cols as usize))
    }

    fn write_bytes(&self, address: usize, bytes: &[u8]) {
        let mut arena = self.arena.write();
        arena[address..address + bytes.len()].copy_from_slice(bytes);
    }

    fn read_bytes(&self, address: usize, out: &mut [u8]) {
        let arena = self.arena.read();
        out.copy_from_slice(&arena[address..address + out.len()]);
    }
}

/// One agent's cached view of a shared buffer.
#[derive(Debug)]
pub struct SharedBuffer<T> {
    pool: Arc<SharedPool>,
    descriptor: BufferDescriptor,
    geometry: Geometry,
    cache: Vec<T>,
}

impl<T: Pod> SharedBuffer<T> {
    pub fn attach(
        pool: Arc<SharedPool>,
        descriptor: BufferDescriptor,
        geometry: Geometry,
    ) -> Result<Self, SetupError> {
        let index = descriptor.index;
        let element_size = size_of::<T>();
        if element_size != index.element_size() {
            return Err(SetupError::ElementSizeMismatch {
                index,
                expected: index.element_size(),
                actual: element_size,
            });
        }

        let expected = geometry
            .len()
            .checked_mul(element_size)
            .ok_or(SetupError::ArenaOverflow(geometry))?;
        if descriptor.size_bytes != expected {
            return Err(SetupError::BufferSizeMismatch {
                index,
                expected,
                actual: descriptor.size_bytes,
            });
        }

        let fits = descriptor
            .address
            .checked_add(expected)
            .is_some_and(|end| end <= pool.arena_len());
        if !fits {
            return Err(SetupError::OutOfArena { index });
        }

        Ok(Self {
            pool,
            descriptor,
            geometry,
            cache: vec![T::zeroed(); geometry.len()],
        })
    }

    pub fn index(&self) -> BufferIndex {
        self.descriptor.index
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Local write access. Nothing reaches the arena until `publish`.
    pub fn rows_mut(&mut self, rows: Range<usize>) -> &mut [T] {
        self.check_rows(&rows);
        let span = self.geometry.row_span(rows);
        &mut self.cache[span]
    }

    /// Flushes cached `rows` to the arena.
    pub fn publish(&self, rows: Range<usize>) {
        if rows.is_empty() {
            return;
        }
        self.check_rows(&rows);
        let span = self.geometry.row_span(rows);
        let address = self.descriptor.address + span.start * size_of::<T>();
        self.pool
            .write_bytes(address, bytemuck::cast_slice(&self.cache[span]));
    }

    /// Refreshes `rows` from the arena and grants read access to the cache.
    pub fn acquire(&mut self, rows: Range<usize>) -> Acquired<'_, T> {
        if !rows.is_empty() {
            self.check_rows(&rows);
            let span = self.geometry.row_span(rows.clone());
            let address = self.descriptor.address + span.start * size_of::<T>();
            self.pool
                .read_bytes(address, bytemuck::cast_slice_mut(&mut self.cache[span]));
        }

        Acquired {
            cache: &self.cache,
            rows,
            geometry: self.geometry,
        }
    }

    pub fn acquire_all(&mut self) -> Acquired<'_, T> {
        self.acquire(0..self.geometry.rows)
    }

    fn check_rows(&self, rows: &Range<usize>) {
        assert!(
            rows.start <= rows.end && rows.end <= self.geometry.rows,
            "rows {:?} out of bounds for {} buffer with {} rows",
            rows,
            self.descriptor.index,
            self.geometry.rows
        );
    }
}

/// Read access granted by [`SharedBuffer::acquire`].
///
/// The view spans the whole cached plane, not only [`Acquired::rows`]. Stage
/// inputs combine rows this agent computed, rows refreshed by this call and
/// halo rows refreshed by an earlier `acquire`, so the workers index the plane
/// with absolute rows. Only the refreshed rows reflect the other agent's
/// latest publish; every other row holds what this agent last wrote or
/// acquired. Even `acquire(0..0)` grants such a view without refreshing
/// anything.
#[derive(Debug)]
pub struct Acquired<'a, T> {
    cache: &'a [T],
    rows: Range<usize>,
    geometry: Geometry,
}

impl<'a, T: Copy> Acquired<'a, T> {
    pub fn as_slice(&self) -> &'a [T] {
        self.cache
    }

    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    pub fn row(&self, r: usize) -> &'a [T] {
        &self.cache[self.geometry.row_span(r..r + 1)]
    }

    pub fn to_plane(&self) -> Plane<T> {
        Plane::from_raw(self.geometry, self.cache.to_vec())
    }
}

/// Every data buffer of one agent, attached to the same pool.
#[derive(Debug)]
pub struct AgentBuffers {
    pub image: SharedBuffer<u8>,
    pub scratch: SharedBuffer<u8>,
    pub smoothed: SharedBuffer<i16>,
    pub delta_x: SharedBuffer<i16>,
    pub delta_y: SharedBuffer<i16>,
    pub magnitude_squared: SharedBuffer<u32>,
}

impl AgentBuffers {
    /// Attaches using descriptors resolved by `descriptor`. The host resolves
    /// them from the pool, the remote from its handshake table.
    pub fn attach<F>(
        pool: &Arc<SharedPool>,
        geometry: Geometry,
        descriptor: F,
    ) -> Result<Self, SetupError>
    where
        F: Fn(BufferIndex) -> BufferDescriptor,
    {
        Ok(Self {
            image: SharedBuffer::attach(pool.clone(), descriptor(BufferIndex::Image), geometry)?,
            scratch: SharedBuffer::attach(pool.clone(), descriptor(BufferIndex::Scratch), geometry)?,
            smoothed: SharedBuffer::attach(
                pool.clone(),
                descriptor(BufferIndex::Smoothed),
                geometry,
            )?,
            delta_x: SharedBuffer::attach(pool.clone(), descriptor(BufferIndex::DeltaX), geometry)?,
            delta_y: SharedBuffer::attach(pool.clone(), descriptor(BufferIndex::DeltaY), geometry)?,
            magnitude_squared: SharedBuffer::attach(
                pool.clone(),
                descriptor(BufferIndex::MagnitudeSquared),
                geometry,
            )?,
        })
    }
}
