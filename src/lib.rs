//! # Go Playground Build Sandbox
//!
//! Compiles untrusted, multi-file Go programs to WebAssembly for a web
//! playground.
//!
//! Source files arrive from an editor form, an uploaded zip file or an
//! imported gist and are normalized into an [`Archive`]. Before anything is
//! written to disk the archive passes a dependency guard:
//!
//! - **File names**: only source, manifest and documentation files are accepted
//! - **Manifests**: `go.mod` may not contain `replace` directives and may only
//!   require allowlisted modules directly
//! - **Imports**: every `.go` file may only import allowlisted packages
//!
//! Accepted archives are written into a per-request temporary directory,
//! built with `GOOS=js GOARCH=wasm` under a timeout, and the directory is
//! removed on every exit path.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wasm_go_playground_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let playground = Playground::discover(PlaygroundConfig::default())?;
//!
//!     let archive = Archive::from_files([
//!         ("go.mod", "module example.com\n\ngo 1.22\n"),
//!         ("main.go", "package main\n\nfunc main() { println(\"hi\") }\n"),
//!     ])?;
//!
//!     let result = playground.build(archive).await?;
//!     assert!(result.success);
//!     println!("{}", result.transcript);
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod error;
pub mod guard;
pub mod ingest;
pub mod pipeline;
pub mod prelude;
pub mod sandbox;
pub mod server;

// Re-export main types at crate root for convenience
pub use archive::{Archive, File};
pub use error::{ErrorKind, PlaygroundError, Result};
pub use guard::AllowList;
pub use pipeline::{BuildResult, Playground, TidyOutcome};
pub use sandbox::config::{PlaygroundConfig, PlaygroundConfigBuilder};
pub use sandbox::directory::SandboxDirectory;
pub use sandbox::toolchain::{ExecutionResult, Toolchain};
