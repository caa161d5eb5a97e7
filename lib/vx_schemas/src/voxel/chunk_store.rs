//! The coordinate-keyed collection of exclusively owned chunks.

use hashbrown::hash_map::Iter;
use hashbrown::HashMap;
use thiserror::Error;

use crate::coordinates::{AbsBlockPos, AbsChunkPos};
use crate::voxel::blockdata::BlockData;
use crate::voxel::chunk::{Chunk, ChunkAccessError};

/// Error from block-level access through the store.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum BlockAccessError {
    /// The chunk containing the addressed block is not loaded.
    #[error("Block {0} is out of the loaded range")]
    OutOfRange(AbsBlockPos),
    /// The containing chunk rejected the access.
    #[error(transparent)]
    Chunk(#[from] ChunkAccessError),
}

/// Mapping from chunk coordinates to exclusively owned chunks.
///
/// Iteration order is unspecified; keys are unique. A `get` on a missing key is a miss,
/// not an error.
#[derive(Default)]
pub struct ChunkStore {
    chunks: HashMap<AbsChunkPos, Chunk>,
}

impl ChunkStore {
    /// Constructs an empty store with room for `capacity` chunks.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            chunks: HashMap::with_capacity(capacity),
        }
    }

    /// Number of loaded chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunks are loaded.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Transfers ownership of a chunk into the store, returning the previously stored
    /// chunk if the key was occupied.
    pub fn insert(&mut self, pos: AbsChunkPos, chunk: Chunk) -> Option<Chunk> {
        self.chunks.insert(pos, chunk)
    }

    /// Removes and returns the chunk at the given position.
    pub fn remove(&mut self, pos: AbsChunkPos) -> Option<Chunk> {
        self.chunks.remove(&pos)
    }

    /// Looks up a loaded chunk.
    #[inline]
    pub fn get(&self, pos: AbsChunkPos) -> Option<&Chunk> {
        self.chunks.get(&pos)
    }

    /// Looks up a loaded chunk for mutation.
    #[inline]
    pub fn get_mut(&mut self, pos: AbsChunkPos) -> Option<&mut Chunk> {
        self.chunks.get_mut(&pos)
    }

    /// Whether the chunk at the given position is loaded.
    #[inline]
    pub fn contains(&self, pos: AbsChunkPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    /// Iterates over all loaded chunks in unspecified order.
    pub fn iter(&self) -> Iter<'_, AbsChunkPos, Chunk> {
        self.chunks.iter()
    }

    /// Reads the voxel at a world block position, or [`BlockAccessError::OutOfRange`]
    /// when its chunk is not loaded.
    pub fn get_block(&self, pos: AbsBlockPos) -> Result<BlockData, BlockAccessError> {
        let (cpos, ipos) = pos.split_chunk_component();
        self.chunks
            .get(&cpos)
            .map(|chunk| chunk.get(ipos))
            .ok_or(BlockAccessError::OutOfRange(pos))
    }

    /// Writes the voxel at a world block position.
    pub fn set_block(&mut self, pos: AbsBlockPos, value: BlockData) -> Result<(), BlockAccessError> {
        let (cpos, ipos) = pos.split_chunk_component();
        let chunk = self.chunks.get_mut(&cpos).ok_or(BlockAccessError::OutOfRange(pos))?;
        chunk.set(ipos, value)?;
        Ok(())
    }
}

impl<'s> IntoIterator for &'s ChunkStore {
    type Item = (&'s AbsChunkPos, &'s Chunk);
    type IntoIter = Iter<'s, AbsChunkPos, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut store = ChunkStore::default();
        let pos = AbsChunkPos::new(1, -2, 3);
        assert!(store.insert(pos, Chunk::new_built(pos, 0, 0)).is_none());
        assert!(store.contains(pos));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(pos).unwrap().position(), pos);

        // Equal-coordinate insertion hands back the replaced chunk.
        let replaced = store.insert(pos, Chunk::new_loading(pos, 0)).unwrap();
        assert_eq!(replaced.position(), pos);
        assert!(store.get(pos).unwrap().is_loading());

        assert!(store.remove(pos).is_some());
        assert!(store.get(pos).is_none());
        assert!(store.remove(pos).is_none());
    }

    #[test]
    fn block_access_composes_conversions() {
        let mut store = ChunkStore::default();
        let cpos = AbsChunkPos::new(-1, 0, 0);
        store.insert(cpos, Chunk::new_built(cpos, 0, 0));

        let block = AbsBlockPos::new(-1, 31, 0);
        store.set_block(block, BlockData::new(5, 0, 9)).unwrap();
        assert_eq!(store.get_block(block).unwrap(), BlockData::new(5, 0, 9));

        let missing = AbsBlockPos::new(32, 0, 0);
        assert_eq!(store.get_block(missing), Err(BlockAccessError::OutOfRange(missing)));
        assert_eq!(
            store.set_block(missing, BlockData::AIR),
            Err(BlockAccessError::OutOfRange(missing))
        );
    }
}
