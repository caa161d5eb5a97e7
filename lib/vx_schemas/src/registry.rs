//! A table of registered block types, keeping a stable mapping between sequential numeric ids and block definitions.

use hashbrown::HashMap;
use kstring::KString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::voxel::blockdata::{BlockData, MAX_BLOCK_ID};

/// Properties of one registered block type.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct BlockType {
    /// Unique registry name.
    pub name: KString,
    /// Whether entities collide with the block.
    pub solid: bool,
    /// Whether light passes through the block with attenuation.
    pub translucent: bool,
    /// Whether the block fully hides the faces of its neighbours.
    pub opaque: bool,
    /// Mining hardness.
    pub hardness: i32,
}

impl BlockType {
    /// Constructs a block type definition.
    pub fn new(name: &str, solid: bool, translucent: bool, opaque: bool, hardness: i32) -> Self {
        Self {
            name: KString::from_ref(name),
            solid,
            translucent,
            opaque,
            hardness,
        }
    }

    /// The built-in air block type, always registered as id 0.
    pub fn air() -> Self {
        Self::new("air", false, true, false, 0)
    }
}

/// Errors reported during block registration.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum BlockRegistryError {
    /// All 4096 sequential ids are taken.
    #[error("Block id space exhausted while registering {0}")]
    IdSpaceExhausted(KString),
    /// The same name was registered before.
    #[error("Duplicate block name {0}")]
    DuplicateName(KString),
}

/// Registry of block types addressable by sequential 12-bit id or by name.
///
/// Id 0 is always the air block.
pub struct BlockRegistry {
    blocks: Vec<BlockType>,
    name_to_id: HashMap<KString, u16>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        let mut registry = Self {
            blocks: Vec::with_capacity(64),
            name_to_id: HashMap::with_capacity(64),
        };
        registry
            .register(BlockType::air())
            .expect("air registration cannot fail on an empty registry");
        registry
    }
}

impl BlockRegistry {
    /// Registers a block type, returning its assigned sequential id.
    pub fn register(&mut self, block: BlockType) -> Result<u16, BlockRegistryError> {
        if self.name_to_id.contains_key(&block.name) {
            return Err(BlockRegistryError::DuplicateName(block.name));
        }
        if self.blocks.len() > MAX_BLOCK_ID as usize {
            return Err(BlockRegistryError::IdSpaceExhausted(block.name));
        }
        let id = self.blocks.len() as u16;
        self.name_to_id.insert(block.name.clone(), id);
        self.blocks.push(block);
        Ok(id)
    }

    /// Looks up a block type by id, `None` for unregistered ids.
    #[inline]
    pub fn get(&self, id: u16) -> Option<&BlockType> {
        self.blocks.get(id as usize)
    }

    /// Looks up the id registered for a name.
    pub fn id_of(&self, name: &str) -> Option<u16> {
        self.name_to_id.get(name).copied()
    }

    /// Number of registered block types, including air.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: air is registered on construction.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether the given voxel's block type hides neighbouring faces.
    /// Unregistered ids count as non-opaque, so holes render rather than disappear.
    #[inline]
    pub fn is_opaque(&self, data: BlockData) -> bool {
        self.get(data.id()).is_some_and(|b| b.opaque)
    }

    /// Whether the given voxel's block type lets light through with attenuation.
    #[inline]
    pub fn is_translucent(&self, data: BlockData) -> bool {
        self.get(data.id()).is_some_and(|b| b.translucent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn air_is_id_zero() {
        let registry = BlockRegistry::default();
        assert_eq!(registry.get(0).unwrap().name, "air");
        assert_eq!(registry.id_of("air"), Some(0));
        assert!(!registry.is_opaque(BlockData::AIR));
    }

    #[test]
    fn sequential_ids() {
        let mut registry = BlockRegistry::default();
        let stone = registry.register(BlockType::new("stone", true, false, true, 2)).unwrap();
        let glass = registry.register(BlockType::new("glass", true, true, false, 1)).unwrap();
        assert_eq!(stone, 1);
        assert_eq!(glass, 2);
        assert!(registry.is_opaque(BlockData::new(stone, 0, 0)));
        assert!(registry.is_translucent(BlockData::new(glass, 0, 0)));
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut registry = BlockRegistry::default();
        registry.register(BlockType::new("stone", true, false, true, 2)).unwrap();
        assert_eq!(
            registry.register(BlockType::new("stone", true, false, true, 2)),
            Err(BlockRegistryError::DuplicateName(KString::from_static("stone")))
        );
    }
}
