//! Voxel cells, chunks and chunk collections.

pub mod blockdata;
pub mod chunk;
pub mod chunk_store;
pub mod generator;

pub use blockdata::BlockData;
pub use chunk::{Chunk, ChunkAccessError, ChunkBlob, ChunkBlobError, ChunkState, ChunkStorage};
pub use chunk_store::ChunkStore;
