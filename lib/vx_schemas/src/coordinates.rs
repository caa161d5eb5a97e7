//! A collection of strongly typed newtype wrappers for the various coordinate formats within the game's world and related constants.

use std::fmt::{Display, Formatter};
use std::ops::Deref;

use bevy_math::{DVec3, IVec3};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a side of a chunk in blocks
pub const CHUNK_DIM: i32 = 32;
/// Length of a side of a chunk in blocks
pub const CHUNK_DIMZ: usize = CHUNK_DIM as usize;
/// Number of blocks on the face of a chunk
pub const CHUNK_DIM2: i32 = CHUNK_DIM * CHUNK_DIM;
/// Number of blocks on the face of a chunk
pub const CHUNK_DIM2Z: usize = (CHUNK_DIM * CHUNK_DIM) as usize;
/// Number of blocks in the volume of the chunk
pub const CHUNK_DIM3: i32 = CHUNK_DIM * CHUNK_DIM * CHUNK_DIM;
/// Number of blocks in the volume of the chunk
pub const CHUNK_DIM3Z: usize = (CHUNK_DIM * CHUNK_DIM * CHUNK_DIM) as usize;
/// Base-2 logarithm of [`CHUNK_DIM`], the shift converting block to chunk coordinates
pub const CHUNK_DIM_LOG2: i32 = CHUNK_DIM.trailing_zeros() as i32;
/// Bitmask converting block coordinates to in-chunk coordinates
pub const CHUNK_DIM_MASK: i32 = CHUNK_DIM - 1;

static_assertions::const_assert_eq!(1 << CHUNK_DIM_LOG2, CHUNK_DIM);

/// Offset from a chunk's origin block to its middle block, used for distance ordering.
pub const CHUNK_MIDDLE_OFFSET: IVec3 = IVec3::splat(CHUNK_DIM / 2 - 1);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("Given coordinates were outside of chunk boundaries: {0}")]
/// Error when the given coordinates are outside of the chunk boundary.
pub struct InChunkVecError(IVec3);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("Given index was outside of chunk boundaries: {0}")]
/// Error when the given block index is outside of the chunk boundary.
pub struct InChunkIndexError(usize);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// A block position inside of a chunk, limited to 0..[`CHUNK_DIM`] on every axis
pub struct InChunkPos(pub(crate) IVec3);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// An absolute chunk position in a voxel world
pub struct AbsChunkPos(pub(crate) IVec3);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// A chunk position relative to another chunk position
pub struct RelChunkPos(pub(crate) IVec3);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// An absolute block position in a voxel world
pub struct AbsBlockPos(pub(crate) IVec3);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Pod, Zeroable, Serialize, Deserialize)]
#[repr(transparent)]
/// A block position relative to another block position
pub struct RelBlockPos(pub(crate) IVec3);

// === Utils
macro_rules! impl_simple_ivec3_newtype {
    ($T:ident) => {
        impl $T {
            /// (0, 0, 0)
            pub const ZERO: Self = Self(IVec3::ZERO);
            /// (1, 1, 1)
            pub const ONE: Self = Self(IVec3::ONE);
            /// (1, 0, 0)
            pub const X: Self = Self(IVec3::X);
            /// (0, 1, 0)
            pub const Y: Self = Self(IVec3::Y);
            /// (0, 0, 1)
            pub const Z: Self = Self(IVec3::Z);

            /// Const-friendly `from<IVec3>`
            #[inline]
            pub const fn from_ivec3(value: IVec3) -> Self {
                Self(value)
            }

            /// Const-friendly `into<IVec3>`
            #[inline]
            pub const fn into_ivec3(self) -> IVec3 {
                self.0
            }

            /// Constructs a new [`Self`] from the given coordinates.
            #[inline]
            pub const fn new(x: i32, y: i32, z: i32) -> Self {
                Self(IVec3::new(x, y, z))
            }

            /// Constructs a new [`Self`] from a given coordinate copied to all dimensions.
            #[inline]
            pub const fn splat(v: i32) -> Self {
                Self(IVec3::splat(v))
            }
        }

        impl From<IVec3> for $T {
            #[inline]
            fn from(value: IVec3) -> Self {
                Self::from_ivec3(value)
            }
        }
        impl From<$T> for IVec3 {
            #[inline]
            fn from(value: $T) -> IVec3 {
                value.into_ivec3()
            }
        }
        impl std::ops::Deref for $T {
            type Target = IVec3;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }
    };
}

macro_rules! impl_rel_abs_pair {
    ($Rel:ident, $Abs:ident) => {
        impl std::ops::Add<$Rel> for $Rel {
            type Output = $Rel;
            #[inline]
            fn add(self, rhs: Self) -> Self::Output {
                $Rel(self.0 + rhs.0)
            }
        }
        impl std::ops::Add<$Abs> for $Rel {
            type Output = $Abs;
            #[inline]
            fn add(self, rhs: $Abs) -> Self::Output {
                $Abs(self.0 + rhs.0)
            }
        }
        impl std::ops::Add<$Rel> for $Abs {
            type Output = $Abs;
            #[inline]
            fn add(self, rhs: $Rel) -> Self::Output {
                $Abs(self.0 + rhs.0)
            }
        }

        impl std::ops::Sub<$Rel> for $Rel {
            type Output = $Rel;
            #[inline]
            fn sub(self, rhs: Self) -> Self::Output {
                $Rel(self.0 - rhs.0)
            }
        }
        impl std::ops::Sub<$Rel> for $Abs {
            type Output = $Abs;
            #[inline]
            fn sub(self, rhs: $Rel) -> Self::Output {
                $Abs(self.0 - rhs.0)
            }
        }
        impl std::ops::Sub<$Abs> for $Abs {
            type Output = $Rel;
            #[inline]
            fn sub(self, rhs: $Abs) -> Self::Output {
                $Rel(self.0 - rhs.0)
            }
        }
    };
}

// === InChunkPos

impl TryFrom<IVec3> for InChunkPos {
    type Error = InChunkVecError;

    #[inline]
    fn try_from(value: IVec3) -> Result<Self, Self::Error> {
        Self::try_from_ivec3(value)
    }
}

impl From<InChunkPos> for IVec3 {
    #[inline]
    fn from(value: InChunkPos) -> IVec3 {
        value.0
    }
}

impl Deref for InChunkPos {
    type Target = IVec3;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl InChunkPos {
    /// (0, 0, 0)
    pub const ZERO: Self = Self(IVec3::ZERO);
    /// (31, 31, 31)
    pub const MAX: Self = Self(IVec3::splat(CHUNK_DIM - 1));

    /// Const-friendly `try_from<IVec3>`
    #[inline]
    pub const fn try_from_ivec3(v: IVec3) -> Result<Self, InChunkVecError> {
        let IVec3 { x, y, z } = v;
        if (x < 0) || (x >= CHUNK_DIM) || (y < 0) || (y >= CHUNK_DIM) || (z < 0) || (z >= CHUNK_DIM) {
            Err(InChunkVecError(v))
        } else {
            Ok(Self(v))
        }
    }

    /// Constructs a new in-chunk position from the given coordinates, or returns an error if it's
    /// outside of chunk bounds.
    #[inline]
    pub const fn try_new(x: i32, y: i32, z: i32) -> Result<Self, InChunkVecError> {
        Self::try_from_ivec3(IVec3::new(x, y, z))
    }

    /// Convert a XYZ-strided index into a chunk storage array into the coordinates
    #[inline]
    pub const fn try_from_index(idx: usize) -> Result<Self, InChunkIndexError> {
        if idx >= CHUNK_DIM3Z {
            return Err(InChunkIndexError(idx));
        }
        let i: i32 = idx as i32;
        Ok(InChunkPos(IVec3::new(
            (i / CHUNK_DIM2) % CHUNK_DIM,
            (i / CHUNK_DIM) % CHUNK_DIM,
            i % CHUNK_DIM,
        )))
    }

    /// Converts the coordinates into an XYZ-strided index into the chunk storage array
    #[inline]
    pub const fn as_index(self) -> usize {
        (CHUNK_DIM2 * self.0.x + CHUNK_DIM * self.0.y + self.0.z) as usize
    }
}

// === AbsChunkPos
impl_simple_ivec3_newtype!(AbsChunkPos);

impl From<AbsBlockPos> for AbsChunkPos {
    #[inline]
    fn from(value: AbsBlockPos) -> Self {
        Self(IVec3::new(
            value.x >> CHUNK_DIM_LOG2,
            value.y >> CHUNK_DIM_LOG2,
            value.z >> CHUNK_DIM_LOG2,
        ))
    }
}

impl AbsChunkPos {
    /// Returns the block position of this chunk's origin corner.
    #[inline]
    pub fn origin_block(self) -> AbsBlockPos {
        AbsBlockPos(self.0 << CHUNK_DIM_LOG2)
    }

    /// Returns the world-space midpoint block of this chunk, used as the distance reference by the streamer.
    #[inline]
    pub fn middle_block(self) -> AbsBlockPos {
        AbsBlockPos((self.0 << CHUNK_DIM_LOG2) + CHUNK_MIDDLE_OFFSET)
    }
}

impl Display for AbsChunkPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chunk(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

// === RelChunkPos
impl_simple_ivec3_newtype!(RelChunkPos);
impl_rel_abs_pair!(RelChunkPos, AbsChunkPos);

impl RelChunkPos {
    /// The chebyshev (maximum-coordinate) length of this chunk offset.
    #[inline]
    pub fn chebyshev(self) -> i32 {
        self.0.abs().max_element()
    }
}

impl Display for RelChunkPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chunk Difference(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

// === AbsBlockPos
impl_simple_ivec3_newtype!(AbsBlockPos);

impl From<AbsChunkPos> for AbsBlockPos {
    #[inline]
    fn from(value: AbsChunkPos) -> Self {
        value.origin_block()
    }
}

impl AbsBlockPos {
    /// Splits the block position into the coordinate of the chunk and coordinate of the block within that chunk.
    ///
    /// Arithmetic shift and mask, so negative block coordinates land in the chunk below, like
    /// `div_euclid`/`rem_euclid` by [`CHUNK_DIM`].
    #[inline]
    pub fn split_chunk_component(self) -> (AbsChunkPos, InChunkPos) {
        (
            AbsChunkPos::from(self),
            InChunkPos(IVec3::new(
                self.x & CHUNK_DIM_MASK,
                self.y & CHUNK_DIM_MASK,
                self.z & CHUNK_DIM_MASK,
            )),
        )
    }

    /// Converts to a floating-point vector for distance math.
    #[inline]
    pub fn as_dvec3(self) -> DVec3 {
        self.0.as_dvec3()
    }
}

impl Display for AbsBlockPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}

// === RelBlockPos
impl_simple_ivec3_newtype!(RelBlockPos);
impl_rel_abs_pair!(RelBlockPos, AbsBlockPos);

impl From<RelChunkPos> for RelBlockPos {
    #[inline]
    fn from(value: RelChunkPos) -> Self {
        Self(value.0 << CHUNK_DIM_LOG2)
    }
}

impl RelBlockPos {
    /// Squared euclidean length in blocks, avoids the sqrt of `length`.
    #[inline]
    pub fn length_squared(self) -> i64 {
        let v = self.0.as_i64vec3();
        v.x * v.x + v.y * v.y + v.z * v.z
    }
}

impl Display for RelBlockPos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block Difference(x={}, y={}, z={})", self.x, self.y, self.z)
    }
}
