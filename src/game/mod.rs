//! Game simulation modules

pub mod character;
pub mod collision;
pub mod controller;
pub mod entities;
pub mod events;
pub mod idmap;
pub mod input;
pub mod physics;
pub mod player;
pub mod server;
pub mod snapshot;
pub mod spatial;
pub mod state_machine;
pub mod weapon;
pub mod world;
pub mod world_core;

pub use character::{Character, DamageResult};
pub use server::{GameServer, Outbound, ServerCmd, ServerHandle};
pub use world::GameWorld;

/// Network client slot, also the index into the character arena
pub type ClientId = usize;
