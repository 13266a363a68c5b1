//! Blockmod server - authoritative character simulation for a block game mode
//!
//! The library holds the whole simulation; `main.rs` only wires configuration,
//! logging and the tick loop together.

pub mod config;
pub mod game;
pub mod net;
pub mod util;
