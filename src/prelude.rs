//! Prelude module for convenient imports.

pub use crate::archive::Archive;
pub use crate::error::{PlaygroundError, Result};
pub use crate::guard::AllowList;
pub use crate::ingest::{GistClient, RateLimiter};
pub use crate::pipeline::{BuildResult, Playground, TidyOutcome};
pub use crate::sandbox::{
    config::PlaygroundConfig,
    directory::SandboxDirectory,
    toolchain::{ExecutionResult, Toolchain},
};
