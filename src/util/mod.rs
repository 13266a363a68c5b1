//! Utility modules

pub mod time;
