//! The on-disk chunk persistence edge.
//!
//! The core treats storage as a blocking blob store keyed by chunk coordinate: a lookup
//! either yields a serialized chunk or reports the chunk as absent, in which case the
//! caller generates instead. The layout behind the trait is opaque to the engine.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;
use vx_schemas::coordinates::AbsChunkPos;
use vx_schemas::voxel::{BlockData, ChunkBlob};

use crate::prelude::*;

/// A blob store for chunk contents, keyed by chunk coordinate.
///
/// Implementations are called from parallel read tasks and must synchronize internally.
pub trait WorldStorage: Send + Sync + 'static {
    /// Fetches the stored blob for a chunk, `None` when the chunk was never saved.
    fn request_chunk(&self, pos: AbsChunkPos) -> Result<Option<ChunkBlob>>;
    /// Stores a chunk blob, replacing any previous contents for the coordinate.
    fn save_chunk(&self, pos: AbsChunkPos, blob: &[BlockData]) -> Result<()>;
}

/// Purely in-memory storage, used by tests and as a write-back cache for throwaway worlds.
#[derive(Default)]
pub struct MemoryWorldStorage {
    chunks: Mutex<HashMap<AbsChunkPos, ChunkBlob>>,
}

impl MemoryWorldStorage {
    /// Constructs an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunk blobs.
    pub fn len(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    /// Whether no blobs are stored.
    pub fn is_empty(&self) -> bool {
        self.chunks.lock().unwrap().is_empty()
    }
}

impl WorldStorage for MemoryWorldStorage {
    fn request_chunk(&self, pos: AbsChunkPos) -> Result<Option<ChunkBlob>> {
        Ok(self.chunks.lock().unwrap().get(&pos).cloned())
    }

    fn save_chunk(&self, pos: AbsChunkPos, blob: &[BlockData]) -> Result<()> {
        self.chunks.lock().unwrap().insert(pos, blob.to_vec());
        Ok(())
    }
}

/// Disk-backed storage: a directory per world holding one bincode blob file per chunk.
///
/// The directory is created by the constructor; all file handles are scoped to the
/// individual operations, so every exit path releases them.
pub struct DiskWorldStorage {
    world_dir: PathBuf,
}

impl DiskWorldStorage {
    /// Opens (creating if needed) the storage directory for the named world under `base_dir`.
    pub fn open(base_dir: &std::path::Path, world_name: &str) -> Result<Self> {
        let world_dir = base_dir.join(world_name);
        fs::create_dir_all(&world_dir)
            .with_context(|| format!("Creating world storage directory {}", world_dir.display()))?;
        debug!(dir = %world_dir.display(), "Opened world storage");
        Ok(Self { world_dir })
    }

    fn chunk_path(&self, pos: AbsChunkPos) -> PathBuf {
        self.world_dir.join(format!("c.{}.{}.{}.bin", pos.x, pos.y, pos.z))
    }
}

impl WorldStorage for DiskWorldStorage {
    fn request_chunk(&self, pos: AbsChunkPos) -> Result<Option<ChunkBlob>> {
        let path = self.chunk_path(pos);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Reading chunk blob {}", path.display())),
        };
        let blob: ChunkBlob =
            bincode::deserialize(&bytes).with_context(|| format!("Decoding chunk blob {}", path.display()))?;
        Ok(Some(blob))
    }

    fn save_chunk(&self, pos: AbsChunkPos, blob: &[BlockData]) -> Result<()> {
        let path = self.chunk_path(pos);
        let bytes = bincode::serialize(&blob.to_vec()).context("Encoding chunk blob")?;
        fs::write(&path, bytes).with_context(|| format!("Writing chunk blob {}", path.display()))?;
        Ok(())
    }
}
