//! Worlds: a chunk store with metadata, and the registry of all live worlds.

pub mod remote;
pub mod storage;
pub mod streamer;

use bevy_math::DVec3;
use vx_schemas::coordinates::{AbsBlockPos, AbsChunkPos, RelChunkPos};
use vx_schemas::physics::Aabb;
use vx_schemas::voxel::chunk_store::BlockAccessError;
use vx_schemas::voxel::{BlockData, Chunk, ChunkStore};

/// Offsets of the six axis-aligned neighbours of a chunk.
const AXIS_NEIGHBOURS: [RelChunkPos; 6] = [
    RelChunkPos::new(1, 0, 0),
    RelChunkPos::new(-1, 0, 0),
    RelChunkPos::new(0, 1, 0),
    RelChunkPos::new(0, -1, 0),
    RelChunkPos::new(0, 0, 1),
    RelChunkPos::new(0, 0, -1),
];

/// One voxel world: a chunk store plus world-wide parameters.
pub struct World {
    name: String,
    id: u32,
    chunks: ChunkStore,
    daylight_brightness: u8,
}

impl World {
    fn new(name: String, id: u32) -> Self {
        Self {
            name,
            id,
            chunks: ChunkStore::with_capacity(1024),
            daylight_brightness: 15,
        }
    }

    /// The world's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The world's numeric id, assigned by the [`WorldManager`] at insertion.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The brightness written into freshly generated chunks.
    pub fn daylight_brightness(&self) -> u8 {
        self.daylight_brightness
    }

    /// Read access to the chunk store.
    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    /// Write access to the chunk store. Insertion goes through
    /// [`Self::insert_chunk_and_update`] so neighbours get invalidated.
    pub(crate) fn chunks_mut(&mut self) -> &mut ChunkStore {
        &mut self.chunks
    }

    /// Whether the chunk at the given position is loaded.
    pub fn is_chunk_loaded(&self, pos: AbsChunkPos) -> bool {
        self.chunks.contains(pos)
    }

    /// Inserts a chunk and marks its six axis-neighbours dirty so renderers re-examine
    /// their shared faces. The only supported way to add a chunk to a live world.
    pub fn insert_chunk_and_update(&mut self, chunk: Chunk) {
        let pos = chunk.position();
        self.chunks.insert(pos, chunk);
        for delta in AXIS_NEIGHBOURS {
            if let Some(neighbour) = self.chunks.get(pos + delta) {
                neighbour.mark_dirty();
            }
        }
    }

    /// Removes the chunk at the given position unconditionally; retention decisions
    /// belong to the streamer, not the world.
    pub fn delete_chunk(&mut self, pos: AbsChunkPos) {
        self.chunks.remove(pos);
    }

    /// Reads the voxel at a world block position.
    pub fn get_block(&self, pos: AbsBlockPos) -> Result<BlockData, BlockAccessError> {
        self.chunks.get_block(pos)
    }

    /// Writes the voxel at a world block position.
    pub fn set_block(&mut self, pos: AbsBlockPos, value: BlockData) -> Result<(), BlockAccessError> {
        self.chunks.set_block(pos, value)
    }

    /// Collects the unit-cube hitboxes of every non-air voxel whose integer coordinate
    /// lies in the given continuous range and whose chunk is loaded. Unloaded chunks
    /// contribute nothing, so collision queries never stall on I/O.
    pub fn hitboxes_in(&self, range: &Aabb) -> Vec<Aabb> {
        let mut result = Vec::new();
        let min = range.min.floor().as_ivec3();
        let max = range.max.ceil().as_ivec3();
        for (x, y, z) in itertools::iproduct!(min.x..max.x, min.y..max.y, min.z..max.z) {
            let block = AbsBlockPos::new(x, y, z);
            let Ok(data) = self.get_block(block) else {
                continue;
            };
            if data.is_air() {
                continue;
            }
            result.push(Aabb::unit_cube(DVec3::new(x as f64, y as f64, z as f64)));
        }
        result
    }
}

/// The ordered registry of live worlds, addressable by name or numeric id.
///
/// Worlds are created at startup and torn down only at shutdown; ids are handed out
/// monotonically and never reused.
#[derive(Default)]
pub struct WorldManager {
    worlds: Vec<World>,
}

impl WorldManager {
    /// Creates a new empty world with the next numeric id, returning a handle to it.
    pub fn create_world(&mut self, name: &str) -> &mut World {
        let id = self.worlds.len() as u32;
        self.worlds.push(World::new(name.to_owned(), id));
        self.worlds.last_mut().expect("just pushed")
    }

    /// Looks up a world by numeric id.
    pub fn get(&self, id: u32) -> Option<&World> {
        self.worlds.iter().find(|w| w.id == id)
    }

    /// Looks up a world by numeric id for mutation.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut World> {
        self.worlds.iter_mut().find(|w| w.id == id)
    }

    /// Looks up a world by name.
    pub fn get_by_name(&self, name: &str) -> Option<&World> {
        self.worlds.iter().find(|w| w.name == name)
    }

    /// Iterates all worlds in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &World> {
        self.worlds.iter()
    }

    /// Number of live worlds.
    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    /// Whether no worlds exist yet.
    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbour_dirtying_on_insert() {
        let mut manager = WorldManager::default();
        let world = manager.create_world("overworld");
        let id = world.id();

        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::ZERO, id, 15));
        // Consume the construction-time dirty bit.
        assert!(world.chunks().get(AbsChunkPos::ZERO).unwrap().take_dirty());

        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::new(1, 0, 0), id, 15));
        assert!(world.chunks().get(AbsChunkPos::ZERO).unwrap().is_dirty());
        // The diagonal is not an axis neighbour and must stay clean.
        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::new(3, 3, 3), id, 15));
        world.chunks().get(AbsChunkPos::new(1, 0, 0)).unwrap().take_dirty();
        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::new(2, 1, 0), id, 15));
        assert!(!world.chunks().get(AbsChunkPos::new(1, 0, 0)).unwrap().is_dirty());
    }

    #[test]
    fn world_ids_are_monotonic() {
        let mut manager = WorldManager::default();
        let a = manager.create_world("a").id();
        let b = manager.create_world("b").id();
        assert_eq!((a, b), (0, 1));
        assert_eq!(manager.get(1).unwrap().name(), "b");
        assert_eq!(manager.get_by_name("a").unwrap().id(), 0);
        assert!(manager.get(2).is_none());
    }

    #[test]
    fn hitboxes_skip_air_and_unloaded() {
        let mut manager = WorldManager::default();
        let world = manager.create_world("hit");
        let id = world.id();
        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::ZERO, id, 0));
        world.set_block(AbsBlockPos::new(1, 1, 1), BlockData::new(1, 0, 0)).unwrap();
        world.set_block(AbsBlockPos::new(2, 1, 1), BlockData::new(1, 0, 0)).unwrap();

        let range = Aabb::new(DVec3::new(0.5, 0.5, 0.5), DVec3::new(3.5, 2.5, 2.5));
        let boxes = world.hitboxes_in(&range);
        // Both solid blocks land in the range; everything else is air or (outside the
        // loaded chunk) silently skipped.
        assert_eq!(boxes.len(), 2);
        assert!(boxes.contains(&Aabb::unit_cube(DVec3::new(1.0, 1.0, 1.0))));
        assert!(boxes.contains(&Aabb::unit_cube(DVec3::new(2.0, 1.0, 1.0))));
    }

    #[test]
    fn equal_coordinate_insert_replaces() {
        let mut manager = WorldManager::default();
        let world = manager.create_world("w");
        let id = world.id();
        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::ZERO, id, 15));
        world
            .set_block(AbsBlockPos::new(0, 0, 0), BlockData::new(9, 0, 0))
            .unwrap();
        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::ZERO, id, 15));
        // The replacement generated chunk has no block 9 anymore.
        assert_eq!(
            world.get_block(AbsBlockPos::new(0, 0, 0)).unwrap().id(),
            0,
            "replaced chunk content"
        );
    }

    #[test]
    fn set_block_marks_chunk_dirty() {
        let mut manager = WorldManager::default();
        let world = manager.create_world("w");
        let id = world.id();
        world.insert_chunk_and_update(Chunk::new_built(AbsChunkPos::ZERO, id, 15));
        world.chunks().get(AbsChunkPos::ZERO).unwrap().take_dirty();
        world
            .set_block(AbsBlockPos::new(5, 6, 7), BlockData::new(2, 0, 0))
            .unwrap();
        assert!(world.chunks().get(AbsChunkPos::ZERO).unwrap().is_dirty());
    }
}
