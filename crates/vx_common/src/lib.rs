#![warn(missing_docs)]
#![deny(clippy::disallowed_types, clippy::await_holding_lock)]
#![allow(clippy::type_complexity)]

//! The Voxelia world synchronization engine: worlds and chunks, the multi-phase tick
//! scheduler, chunk streaming around observers, and the remote-authority RPC edge.

pub mod config;
pub mod modules;
pub mod network;
pub mod observer;
pub mod prelude;
pub mod promises;
pub mod render;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod util;
pub mod world;
pub mod worldgen;

/// The major SemVer field of the current build's version
pub static GAME_VERSION_MAJOR: u32 = 0;
/// The minor SemVer field of the current build's version
pub static GAME_VERSION_MINOR: u32 = 1;
/// The patch SemVer field of the current build's version
pub static GAME_VERSION_PATCH: u32 = 0;
/// The name of the game
pub static GAME_BRAND_NAME: &str = "Voxelia";
