//! The terrain generator plug-in boundary.
//!
//! Exactly one generator may be registered for the process lifetime; content modules call
//! [`register`] during startup. When none is registered, the built-in [`AirGenerator`]
//! fills chunks with air at the world's daylight brightness.

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::coordinates::AbsChunkPos;
use crate::voxel::blockdata::BlockData;
use crate::voxel::chunk::ChunkStorage;

/// Fills a freshly constructed chunk with terrain.
pub trait TerrainGenerator: Send + Sync + 'static {
    /// Writes the contents for the chunk at `position` into `storage`.
    /// `storage` arrives filled with air; implementations may leave it monotone.
    fn generate(&self, position: AbsChunkPos, storage: &mut ChunkStorage, daylight_brightness: u8);
}

/// The stand-in generator used when no module registered one: every cell becomes
/// `(id=0, brightness=daylight, state=0)`.
pub struct AirGenerator;

impl TerrainGenerator for AirGenerator {
    fn generate(&self, _position: AbsChunkPos, storage: &mut ChunkStorage, daylight_brightness: u8) {
        storage.fill(BlockData::new(0, daylight_brightness, 0));
    }
}

static ACTIVE_GENERATOR: OnceCell<Box<dyn TerrainGenerator>> = OnceCell::new();

/// Registers the process-wide terrain generator.
///
/// Returns `true` on success; repeated registrations are ignored with a warning, keeping
/// the first generator.
pub fn register(generator: Box<dyn TerrainGenerator>) -> bool {
    match ACTIVE_GENERATOR.set(generator) {
        Ok(()) => {
            debug!("Registered chunk generator");
            true
        }
        Err(_) => {
            warn!("Ignoring extra chunk generator registration");
            false
        }
    }
}

/// The generator new chunks are built with: the registered one, or [`AirGenerator`].
pub fn active() -> &'static dyn TerrainGenerator {
    static AIR: AirGenerator = AirGenerator;
    match ACTIVE_GENERATOR.get() {
        Some(generator) => generator.as_ref(),
        None => &AIR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::InChunkPos;

    #[test]
    fn air_generator_fills_daylight() {
        let mut storage = ChunkStorage::Monotone(BlockData::AIR);
        AirGenerator.generate(AbsChunkPos::ZERO, &mut storage, 15);
        assert!(storage.is_monotone());
        assert_eq!(storage.get(InChunkPos::MAX), BlockData::new(0, 15, 0));
    }
}
