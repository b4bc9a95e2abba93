//! Ingestion adapters.
//!
//! Three sources feed the playground: the editor form, an uploaded zip file
//! and a gist. Each adapter turns its input into an [`Archive`](crate::archive::Archive)
//! and applies the permission filter at the boundary.

pub mod form;
pub mod gist;
pub mod rate_limit;
pub mod upload;

pub use form::{archive_from_form, FormFields};
pub use gist::{import_gist, GistClient, GistShape, ImportedGist};
pub use rate_limit::RateLimiter;
pub use upload::archive_from_zip;
