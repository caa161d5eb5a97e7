//! A fixed 32³ cube of voxels: the atomic unit of loading, generation and network transfer.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::coordinates::{AbsChunkPos, InChunkPos, CHUNK_DIM3Z};
use crate::voxel::blockdata::BlockData;
use crate::voxel::generator;

/// Minimum time between a chunk's last request and its eligibility for retirement.
pub const RETENTION_WINDOW: Duration = Duration::from_secs(10);

/// A chunk's contents serialized for the wire or the disk: length 1 for a monotone
/// chunk, [`CHUNK_DIM3Z`] for a dense one.
pub type ChunkBlob = Vec<BlockData>;

/// Error installing serialized contents into a chunk.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum ChunkBlobError {
    /// The blob length was neither 1 nor the full chunk volume.
    #[error("Invalid chunk blob length {0}, expected 1 or {dim3z}", dim3z = CHUNK_DIM3Z)]
    InvalidLength(usize),
}

/// Error accessing a chunk's voxels.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum ChunkAccessError {
    /// The chunk is a placeholder still waiting for remote contents; writes are rejected.
    #[error("Chunk {0} is still loading, writes are rejected")]
    StillLoading(AbsChunkPos),
}

/// Load state of a chunk.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ChunkState {
    /// Placeholder inserted while contents are awaited from a remote authority; reads as air.
    Loading,
    /// Contents are present and mutable.
    Ready,
}

/// Block storage of one chunk: either every cell shares a single value (monotone), or a
/// dense array of [`CHUNK_DIM3Z`] cells.
///
/// The monotone form materializes into the dense form on the first write of a *different*
/// value; writing the shared value back keeps the compressed representation.
#[derive(Clone, Eq, PartialEq)]
pub enum ChunkStorage {
    /// All cells hold this single value.
    Monotone(BlockData),
    /// One value per cell, indexed by [`InChunkPos::as_index`].
    Dense(Box<[BlockData; CHUNK_DIM3Z]>),
}

impl ChunkStorage {
    /// Reads the cell at the given position.
    #[inline]
    pub fn get(&self, pos: InChunkPos) -> BlockData {
        match self {
            ChunkStorage::Monotone(value) => *value,
            ChunkStorage::Dense(cells) => cells[pos.as_index()],
        }
    }

    /// Writes the cell at the given position, materializing dense storage if needed.
    pub fn set(&mut self, pos: InChunkPos, value: BlockData) {
        match self {
            ChunkStorage::Monotone(shared) => {
                if *shared == value {
                    return;
                }
                let mut cells = bytemuck::zeroed_box::<[BlockData; CHUNK_DIM3Z]>();
                cells.fill(*shared);
                cells[pos.as_index()] = value;
                *self = ChunkStorage::Dense(cells);
            }
            ChunkStorage::Dense(cells) => cells[pos.as_index()] = value,
        }
    }

    /// Replaces every cell with the given value, dropping any dense array.
    pub fn fill(&mut self, value: BlockData) {
        *self = ChunkStorage::Monotone(value);
    }

    /// Serializes to a canonical blob: length 1 when every cell is equal (even if the
    /// storage happens to be dense), full volume otherwise.
    pub fn export(&self) -> ChunkBlob {
        match self {
            ChunkStorage::Monotone(value) => vec![*value],
            ChunkStorage::Dense(cells) => {
                let first = cells[0];
                if cells.iter().all(|c| *c == first) {
                    vec![first]
                } else {
                    cells.to_vec()
                }
            }
        }
    }

    /// Deserializes a blob produced by [`Self::export`].
    pub fn from_blob(blob: &[BlockData]) -> Result<Self, ChunkBlobError> {
        match blob.len() {
            1 => Ok(ChunkStorage::Monotone(blob[0])),
            CHUNK_DIM3Z => {
                let mut cells = bytemuck::zeroed_box::<[BlockData; CHUNK_DIM3Z]>();
                cells.copy_from_slice(blob);
                Ok(ChunkStorage::Dense(cells))
            }
            len => Err(ChunkBlobError::InvalidLength(len)),
        }
    }

    /// Whether the storage is in the compressed single-value form.
    #[inline]
    pub fn is_monotone(&self) -> bool {
        matches!(self, ChunkStorage::Monotone(_))
    }
}

/// Timestamps are stored as milliseconds since this process-wide epoch, so they fit an atomic.
static TOUCH_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

fn now_millis() -> u64 {
    TOUCH_EPOCH.elapsed().as_millis() as u64
}

/// A 32³ voxel cube positioned in a world.
///
/// Owned exclusively by its [`super::ChunkStore`]; the world back-reference is a plain
/// numeric id resolved through the world registry, never a shared pointer.
pub struct Chunk {
    position: AbsChunkPos,
    world_id: u32,
    storage: ChunkStorage,
    state: ChunkState,
    dirty: AtomicBool,
    modified: AtomicBool,
    reference_count: AtomicI32,
    last_touch_millis: AtomicU64,
}

impl Chunk {
    /// Constructs a chunk by running the registered terrain generator, entering the `Ready` state.
    pub fn new_built(position: AbsChunkPos, world_id: u32, daylight_brightness: u8) -> Self {
        let mut storage = ChunkStorage::Monotone(BlockData::AIR);
        generator::active().generate(position, &mut storage, daylight_brightness);
        Self::with_storage(position, world_id, storage, ChunkState::Ready)
    }

    /// Constructs a `Loading` placeholder that reads as air until [`Self::replace`] is called.
    pub fn new_loading(position: AbsChunkPos, world_id: u32) -> Self {
        Self::with_storage(
            position,
            world_id,
            ChunkStorage::Monotone(BlockData::AIR),
            ChunkState::Loading,
        )
    }

    /// Constructs a `Ready` chunk from a serialized blob (disk load or wire transfer).
    pub fn from_blob(position: AbsChunkPos, world_id: u32, blob: &[BlockData]) -> Result<Self, ChunkBlobError> {
        Ok(Self::with_storage(
            position,
            world_id,
            ChunkStorage::from_blob(blob)?,
            ChunkState::Ready,
        ))
    }

    fn with_storage(position: AbsChunkPos, world_id: u32, storage: ChunkStorage, state: ChunkState) -> Self {
        Self {
            position,
            world_id,
            storage,
            state,
            dirty: AtomicBool::new(true),
            modified: AtomicBool::new(false),
            reference_count: AtomicI32::new(0),
            last_touch_millis: AtomicU64::new(now_millis()),
        }
    }

    /// The chunk's position, in chunk units.
    #[inline]
    pub fn position(&self) -> AbsChunkPos {
        self.position
    }

    /// Numeric id of the owning world.
    #[inline]
    pub fn world_id(&self) -> u32 {
        self.world_id
    }

    /// Current load state.
    #[inline]
    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Whether the chunk is still a remote-load placeholder.
    #[inline]
    pub fn is_loading(&self) -> bool {
        self.state == ChunkState::Loading
    }

    /// Reads the voxel at a local position. `Loading` chunks read as air.
    #[inline]
    pub fn get(&self, pos: InChunkPos) -> BlockData {
        match self.state {
            ChunkState::Loading => BlockData::AIR,
            ChunkState::Ready => self.storage.get(pos),
        }
    }

    /// Writes the voxel at a local position, materializing dense storage if needed and
    /// marking the chunk dirty. Rejected while the chunk is `Loading`.
    pub fn set(&mut self, pos: InChunkPos, value: BlockData) -> Result<(), ChunkAccessError> {
        if self.state == ChunkState::Loading {
            return Err(ChunkAccessError::StillLoading(self.position));
        }
        self.storage.set(pos, value);
        self.dirty.store(true, Ordering::Release);
        self.modified.store(true, Ordering::Release);
        Ok(())
    }

    /// Installs serialized contents and transitions to `Ready`.
    pub fn replace(&mut self, blob: &[BlockData]) -> Result<(), ChunkBlobError> {
        self.storage = ChunkStorage::from_blob(blob)?;
        self.state = ChunkState::Ready;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Serializes the contents for the wire or the disk. See [`ChunkStorage::export`].
    pub fn export(&self) -> ChunkBlob {
        self.storage.export()
    }

    /// Direct access to the block storage.
    #[inline]
    pub fn storage(&self) -> &ChunkStorage {
        &self.storage
    }

    /// Whether the chunk changed since the dirty bit was last consumed.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Sets the dirty bit; used on content writes and on neighbour insertion.
    #[inline]
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Consumes the dirty bit, returning whether it was set.
    #[inline]
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Whether the contents were written to since construction or the last remote
    /// replacement. Distinct from the dirty bit: renderers consume that one, while this
    /// flag tells the retire path which chunks are worth persisting.
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Refreshes the last-touch timestamp, deferring retirement.
    pub fn mark_request(&self) {
        self.last_touch_millis.store(now_millis(), Ordering::Release);
    }

    /// Increments the reference count, pinning the chunk against retirement.
    pub fn acquire(&self) {
        self.reference_count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the reference count.
    pub fn release(&self) {
        self.reference_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Current reference count.
    pub fn reference_count(&self) -> i32 {
        self.reference_count.load(Ordering::Acquire)
    }

    /// Whether the retire policy may remove this chunk: no references held and the last
    /// touch is older than [`RETENTION_WINDOW`].
    pub fn is_retirable(&self) -> bool {
        if self.reference_count.load(Ordering::Acquire) > 0 {
            return false;
        }
        let age = now_millis().saturating_sub(self.last_touch_millis.load(Ordering::Acquire));
        age > RETENTION_WINDOW.as_millis() as u64
    }

    /// Rewinds the last-touch timestamp by the given amount, making the chunk look idle.
    /// Lets retirement be exercised without waiting out the retention window.
    pub fn backdate_touch(&self, by: Duration) {
        let millis = by.as_millis() as u64;
        let _ = self
            .last_touch_millis
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(prev.saturating_sub(millis))
            });
    }
}
