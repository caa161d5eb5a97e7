//! Stock terrain generators and the base content module that registers them.

use noise::{NoiseFn, Perlin};
use vx_schemas::coordinates::{AbsChunkPos, InChunkPos, CHUNK_DIM};
use vx_schemas::registry::BlockType;
use vx_schemas::voxel::chunk::ChunkStorage;
use vx_schemas::voxel::generator::{self, TerrainGenerator};
use vx_schemas::voxel::BlockData;

use crate::modules::{Module, ModuleContext, ModuleInfo, Version};
use crate::prelude::*;

/// Fills everything below a fixed ground height with a single block type.
pub struct FlatGenerator {
    ground_height: i32,
    ground: u16,
}

impl FlatGenerator {
    /// Flat terrain out of `ground` blocks, with the surface at `ground_height`.
    pub fn new(ground_height: i32, ground: u16) -> Self {
        Self { ground_height, ground }
    }
}

impl TerrainGenerator for FlatGenerator {
    fn generate(&self, position: AbsChunkPos, storage: &mut ChunkStorage, daylight_brightness: u8) {
        let base_y = position.origin_block().y;
        if base_y >= self.ground_height {
            storage.fill(BlockData::new(0, daylight_brightness, 0));
            return;
        }
        if base_y + CHUNK_DIM <= self.ground_height {
            storage.fill(BlockData::new(self.ground, 0, 0));
            return;
        }
        let air = BlockData::new(0, daylight_brightness, 0);
        let ground = BlockData::new(self.ground, 0, 0);
        for y in 0..CHUNK_DIM {
            let value = if base_y + y < self.ground_height { ground } else { air };
            for x in 0..CHUNK_DIM {
                for z in 0..CHUNK_DIM {
                    storage.set(InChunkPos::try_new(x, y, z).expect("loop bounds"), value);
                }
            }
        }
    }
}

/// Rolling-hills terrain from a 2D perlin heightmap: surface blocks on top of filler.
pub struct HeightmapGenerator {
    perlin: Perlin,
    base_height: i32,
    amplitude: f64,
    horizontal_scale: f64,
    surface: u16,
    filler: u16,
}

impl HeightmapGenerator {
    /// Constructs a heightmap generator from a seed and block ids.
    pub fn new(seed: u32, base_height: i32, amplitude: f64, surface: u16, filler: u16) -> Self {
        Self {
            perlin: Perlin::new(seed),
            base_height,
            amplitude,
            horizontal_scale: 1.0 / 64.0,
            surface,
            filler,
        }
    }

    fn column_height(&self, block_x: i32, block_z: i32) -> i32 {
        let sample = self.perlin.get([
            block_x as f64 * self.horizontal_scale,
            block_z as f64 * self.horizontal_scale,
        ]);
        self.base_height + (sample * self.amplitude) as i32
    }
}

impl TerrainGenerator for HeightmapGenerator {
    fn generate(&self, position: AbsChunkPos, storage: &mut ChunkStorage, daylight_brightness: u8) {
        let origin = position.origin_block();
        // Quick reject for chunks fully above the tallest possible column.
        if origin.y > self.base_height + self.amplitude.abs() as i32 + 1 {
            storage.fill(BlockData::new(0, daylight_brightness, 0));
            return;
        }
        let air = BlockData::new(0, daylight_brightness, 0);
        for x in 0..CHUNK_DIM {
            for z in 0..CHUNK_DIM {
                let height = self.column_height(origin.x + x, origin.z + z);
                for y in 0..CHUNK_DIM {
                    let world_y = origin.y + y;
                    let value = if world_y >= height {
                        air
                    } else if world_y == height - 1 {
                        BlockData::new(self.surface, 0, 0)
                    } else {
                        BlockData::new(self.filler, 0, 0)
                    };
                    storage.set(InChunkPos::try_new(x, y, z).expect("loop bounds"), value);
                }
            }
        }
    }
}

/// The built-in content module: the basic block set and the default terrain generator.
pub struct BaseContentModule {
    seed: u32,
}

impl BaseContentModule {
    /// Constructs the module with the world seed for the terrain generator.
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }
}

impl Module for BaseContentModule {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "base".to_owned(),
            version: Version::new(1, 0, 0),
            dependencies: Vec::new(),
        }
    }

    fn init(&self, ctx: &mut ModuleContext) -> Result<()> {
        let stone = ctx.blocks.register(BlockType::new("stone", true, false, true, 5))?;
        let dirt = ctx.blocks.register(BlockType::new("dirt", true, false, true, 1))?;
        ctx.blocks.register(BlockType::new("grass", true, false, true, 1))?;
        ctx.blocks.register(BlockType::new("glass", true, true, false, 1))?;
        generator::register(Box::new(HeightmapGenerator::new(self.seed, 32, 12.0, dirt, stone)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_generator_splits_at_ground() {
        let flat = FlatGenerator::new(8, 1);

        let mut above = ChunkStorage::Monotone(BlockData::AIR);
        flat.generate(AbsChunkPos::new(0, 1, 0), &mut above, 15);
        assert!(above.is_monotone());
        assert_eq!(above.get(InChunkPos::ZERO), BlockData::new(0, 15, 0));

        let mut below = ChunkStorage::Monotone(BlockData::AIR);
        flat.generate(AbsChunkPos::new(0, -1, 0), &mut below, 15);
        assert!(below.is_monotone());
        assert_eq!(below.get(InChunkPos::ZERO), BlockData::new(1, 0, 0));

        let mut boundary = ChunkStorage::Monotone(BlockData::AIR);
        flat.generate(AbsChunkPos::ZERO, &mut boundary, 15);
        assert_eq!(boundary.get(InChunkPos::try_new(0, 7, 0).unwrap()).id(), 1);
        assert_eq!(boundary.get(InChunkPos::try_new(0, 8, 0).unwrap()).id(), 0);
    }

    #[test]
    fn heightmap_generator_is_deterministic() {
        let a = HeightmapGenerator::new(42, 32, 12.0, 2, 1);
        let b = HeightmapGenerator::new(42, 32, 12.0, 2, 1);
        let mut storage_a = ChunkStorage::Monotone(BlockData::AIR);
        let mut storage_b = ChunkStorage::Monotone(BlockData::AIR);
        a.generate(AbsChunkPos::new(0, 1, 0), &mut storage_a, 15);
        b.generate(AbsChunkPos::new(0, 1, 0), &mut storage_b, 15);
        assert_eq!(storage_a.export(), storage_b.export());
    }

    #[test]
    fn heightmap_columns_have_surface_layer() {
        let generator = HeightmapGenerator::new(7, 32, 12.0, 2, 1);
        let mut storage = ChunkStorage::Monotone(BlockData::AIR);
        generator.generate(AbsChunkPos::new(0, 1, 0), &mut storage, 15);
        // Scan one column: below the first air cell the block must be the surface type.
        for x in 0..CHUNK_DIM {
            let mut previous = None;
            for y in 0..CHUNK_DIM {
                let value = storage.get(InChunkPos::try_new(x, y, 0).unwrap());
                if value.is_air() {
                    if let Some(prev) = previous {
                        assert_eq!(prev, 2, "column ({x}, _, 0) missing surface block");
                    }
                    break;
                }
                previous = Some(value.id());
            }
        }
    }
}
