//! Wire messages and their integer packing

pub mod packer;
pub mod protocol;

pub use packer::{PackError, Packer, Unpacker};
pub use protocol::{Outgoing, ProjectileRecord, Recipient, ServerMsg};
