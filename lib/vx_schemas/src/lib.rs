#![warn(missing_docs)]
#![deny(clippy::disallowed_types, clippy::await_holding_lock)]

//! A library crate of the in-memory, on-disk and network representations of the Voxelia world model.

pub mod coordinates;
pub mod physics;
pub mod registry;
pub mod voxel;

/// Re-exported dependencies used in API types
pub mod dependencies {
    pub use bevy_math;
    pub use bytemuck;
    pub use hashbrown;
    pub use kstring;
    pub use once_cell;
    pub use serde;
    pub use thiserror;
}
