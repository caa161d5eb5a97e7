//! The 32-bit packed voxel cell.

use std::fmt::{Debug, Formatter};

use bytemuck::{Pod, TransparentWrapper, Zeroable};
use serde::{Deserialize, Serialize};

/// Number of bits used for the block id field.
pub const BLOCK_ID_BITS: u32 = 12;
/// Number of bits used for the brightness field.
pub const BLOCK_BRIGHTNESS_BITS: u32 = 4;
/// Number of bits used for the block state field.
pub const BLOCK_STATE_BITS: u32 = 16;
/// Largest representable block id.
pub const MAX_BLOCK_ID: u16 = (1 << BLOCK_ID_BITS) - 1;

/// A single voxel cell packed into 32 bits.
///
/// Bit layout, least significant first: `[ id (12b) | brightness (4b) | state (16b) ]`.
/// The in-memory and wire representations are byte-for-byte identical on little-endian
/// targets; [`BlockData::to_bits`]/[`BlockData::from_bits`] are the explicit conversion
/// for anything that needs a defined integer value regardless of host endianness.
///
/// Id 0 is reserved for air.
#[derive(
    Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, Zeroable, Pod, TransparentWrapper,
)]
#[repr(transparent)]
pub struct BlockData(u32);

static_assertions::assert_eq_size!(BlockData, u32);
static_assertions::const_assert_eq!(BLOCK_ID_BITS + BLOCK_BRIGHTNESS_BITS + BLOCK_STATE_BITS, 32);

impl BlockData {
    /// The air voxel: id 0, dark, stateless.
    pub const AIR: Self = Self(0);

    /// Packs the given fields, masking each to its bit width.
    #[inline]
    pub const fn new(id: u16, brightness: u8, state: u16) -> Self {
        Self(
            (id as u32 & ((1 << BLOCK_ID_BITS) - 1))
                | ((brightness as u32 & ((1 << BLOCK_BRIGHTNESS_BITS) - 1)) << BLOCK_ID_BITS)
                | ((state as u32) << (BLOCK_ID_BITS + BLOCK_BRIGHTNESS_BITS)),
        )
    }

    /// Reconstructs a voxel from its packed integer value.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the packed integer value.
    #[inline]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// The registered block type id, 0 for air.
    #[inline]
    pub const fn id(self) -> u16 {
        (self.0 & ((1 << BLOCK_ID_BITS) - 1)) as u16
    }

    /// The light level stored in the cell.
    #[inline]
    pub const fn brightness(self) -> u8 {
        ((self.0 >> BLOCK_ID_BITS) & ((1 << BLOCK_BRIGHTNESS_BITS) - 1)) as u8
    }

    /// The free-form per-block state value.
    #[inline]
    pub const fn state(self) -> u16 {
        (self.0 >> (BLOCK_ID_BITS + BLOCK_BRIGHTNESS_BITS)) as u16
    }

    /// Whether the cell is air (id 0), regardless of brightness or state.
    #[inline]
    pub const fn is_air(self) -> bool {
        self.id() == 0
    }

    /// Returns a copy with the id field replaced.
    #[inline]
    pub const fn with_id(self, id: u16) -> Self {
        Self::new(id, self.brightness(), self.state())
    }

    /// Returns a copy with the brightness field replaced.
    #[inline]
    pub const fn with_brightness(self, brightness: u8) -> Self {
        Self::new(self.id(), brightness, self.state())
    }

    /// Returns a copy with the state field replaced.
    #[inline]
    pub const fn with_state(self, state: u16) -> Self {
        Self::new(self.id(), self.brightness(), state)
    }
}

impl Debug for BlockData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BlockData(id={}, brightness={}, state={})",
            self.id(),
            self.brightness(),
            self.state()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_packing() {
        let b = BlockData::new(3, 15, 0);
        assert_eq!(b.id(), 3);
        assert_eq!(b.brightness(), 15);
        assert_eq!(b.state(), 0);
        assert_eq!(b.to_bits(), 3 | (15 << 12));

        let b = BlockData::new(MAX_BLOCK_ID, 0, u16::MAX);
        assert_eq!(b.id(), MAX_BLOCK_ID);
        assert_eq!(b.brightness(), 0);
        assert_eq!(b.state(), u16::MAX);
    }

    #[test]
    fn masking_of_oversized_fields() {
        // Ids wider than 12 bits wrap into the mask instead of bleeding into brightness.
        let b = BlockData::new(0xF003, 0x1F, 7);
        assert_eq!(b.id(), 3);
        assert_eq!(b.brightness(), 15);
        assert_eq!(b.state(), 7);
    }

    #[test]
    fn air_is_all_zero() {
        assert_eq!(BlockData::AIR.to_bits(), 0);
        assert!(BlockData::AIR.is_air());
        assert!(BlockData::new(0, 15, 42).is_air());
        assert!(!BlockData::new(1, 0, 0).is_air());
    }

    #[test]
    fn bits_round_trip() {
        for bits in [0u32, 1, 0xFFFF_FFFF, 0x1234_5678] {
            assert_eq!(BlockData::from_bits(bits).to_bits(), bits);
        }
    }
}
