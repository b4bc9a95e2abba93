//! Sandbox module containing the toolchain execution components.

pub mod config;
pub mod directory;
pub mod env;
pub mod io;
pub mod toolchain;
