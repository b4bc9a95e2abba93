//! Error types for the playground build sandbox.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while ingesting, validating, or building an archive.
#[derive(Error, Debug)]
pub enum PlaygroundError {
    /// A file name failed the permission filter.
    #[error("file not permitted: {0}")]
    FileNotPermitted(String),

    /// Two files in one archive share a name.
    #[error("file already exists: {0}")]
    DuplicateFile(String),

    /// A file name is also used as a directory by another file.
    #[error("file {name} conflicts with {existing}")]
    PathConflict {
        /// The name being added.
        name: String,
        /// The name already in the archive.
        existing: String,
    },

    /// The dependency manifest could not be parsed.
    #[error("failed in {file}: {line}: {reason}")]
    MalformedManifest {
        /// Archive name of the manifest.
        file: String,
        /// 1-based line of the syntax error.
        line: usize,
        /// What the parser expected.
        reason: String,
    },

    /// The manifest contains a `replace` directive.
    #[error("failed in {file}: replace directive is not allowed in module")]
    ReplaceDirective {
        /// Archive name of the manifest.
        file: String,
    },

    /// A direct requirement is not on the module allowlist.
    #[error("failed in {file}: module {module} not permitted")]
    ModuleNotPermitted {
        /// Archive name of the manifest.
        file: String,
        /// The rejected module path.
        module: String,
    },

    /// A source file imports a package that is not allowed.
    #[error("failed in {file}: package {package:?} not permitted")]
    ImportNotPermitted {
        /// Archive name of the source file.
        file: String,
        /// The rejected import path.
        package: String,
    },

    /// The package clause or import declarations of a source file are invalid.
    #[error("failed in {file}: {reason}")]
    MalformedSource {
        /// Archive name of the source file.
        file: String,
        /// Parser message.
        reason: String,
    },

    /// An uploaded or serialized archive could not be decoded.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// The request itself is missing or carries invalid parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A toolchain invocation exceeded its timeout and was killed.
    #[error("{command} timed out after {after:?}")]
    Timeout {
        /// The command line that was killed.
        command: String,
        /// The configured timeout.
        after: Duration,
    },

    /// A toolchain query exited unsuccessfully.
    #[error("{command} failed: {output}")]
    ToolchainFailed {
        /// The command line that was run.
        command: String,
        /// Captured output of the command.
        output: String,
    },

    /// The Go toolchain binary could not be located.
    #[error("go toolchain not found: {0}")]
    ToolchainNotFound(String),

    /// I/O error while materializing or reading a sandbox.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The upstream gist API reported the gist as missing or private.
    #[error("gist not found")]
    GistNotFound,

    /// The upstream gist API refused the request because of its own limits.
    #[error("GitHub API rate limit exceeded")]
    UpstreamRateLimited,

    /// The upstream gist API failed or timed out.
    #[error("failed to fetch gist: {0}")]
    Upstream(String),

    /// The local gist rate limiter rejected the request.
    #[error("rate limit exceeded, try again later")]
    RateLimited,
}

/// Coarse classification of a [`PlaygroundError`], used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client fault: the submitted files or request are not acceptable.
    Validation,
    /// Server fault: filesystem, process, or configuration failure.
    Resource,
    /// The referenced upstream document does not exist.
    NotFound,
    /// Too many requests, either locally or upstream.
    RateLimited,
    /// The upstream service failed.
    Upstream,
}

impl PlaygroundError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaygroundError::FileNotPermitted(_)
            | PlaygroundError::DuplicateFile(_)
            | PlaygroundError::PathConflict { .. }
            | PlaygroundError::MalformedManifest { .. }
            | PlaygroundError::ReplaceDirective { .. }
            | PlaygroundError::ModuleNotPermitted { .. }
            | PlaygroundError::ImportNotPermitted { .. }
            | PlaygroundError::MalformedSource { .. }
            | PlaygroundError::MalformedArchive(_)
            | PlaygroundError::InvalidRequest(_) => ErrorKind::Validation,
            PlaygroundError::Timeout { .. }
            | PlaygroundError::ToolchainFailed { .. }
            | PlaygroundError::ToolchainNotFound(_)
            | PlaygroundError::Io(_)
            | PlaygroundError::Config(_) => ErrorKind::Resource,
            PlaygroundError::GistNotFound => ErrorKind::NotFound,
            PlaygroundError::UpstreamRateLimited | PlaygroundError::RateLimited => {
                ErrorKind::RateLimited
            }
            PlaygroundError::Upstream(_) => ErrorKind::Upstream,
        }
    }

    /// HTTP status code equivalent for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::Resource => 500,
            ErrorKind::Upstream => 502,
        }
    }

    /// Check if this error is a client-fault validation error.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PlaygroundError::Timeout { .. })
    }

    /// Check if this error was raised by the dependency guard.
    pub fn is_guard_rejection(&self) -> bool {
        matches!(
            self,
            PlaygroundError::MalformedManifest { .. }
                | PlaygroundError::ReplaceDirective { .. }
                | PlaygroundError::ModuleNotPermitted { .. }
                | PlaygroundError::ImportNotPermitted { .. }
                | PlaygroundError::MalformedSource { .. }
        )
    }
}

/// Result type alias for playground operations.
pub type Result<T> = std::result::Result<T, PlaygroundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_map_to_bad_request() {
        let errors = [
            PlaygroundError::FileNotPermitted(".env".to_string()),
            PlaygroundError::ReplaceDirective {
                file: "go.mod".to_string(),
            },
            PlaygroundError::ImportNotPermitted {
                file: "main.go".to_string(),
                package: "os/exec".to_string(),
            },
            PlaygroundError::MalformedArchive("zip: not a valid zip file".to_string()),
        ];
        for err in errors {
            assert!(err.is_validation(), "{err} should be a validation error");
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn test_upstream_statuses_are_distinct() {
        assert_eq!(PlaygroundError::GistNotFound.status_code(), 404);
        assert_eq!(PlaygroundError::UpstreamRateLimited.status_code(), 429);
        assert_eq!(PlaygroundError::RateLimited.status_code(), 429);
        assert_eq!(
            PlaygroundError::Upstream("timed out".to_string()).status_code(),
            502
        );
    }

    #[test]
    fn test_resource_errors_are_server_faults() {
        let io = PlaygroundError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(io.kind(), ErrorKind::Resource);
        assert_eq!(io.status_code(), 500);
    }

    #[test]
    fn test_error_messages() {
        let err = PlaygroundError::ImportNotPermitted {
            file: "cmd/main.go".to_string(),
            package: "os/exec".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed in cmd/main.go: package \"os/exec\" not permitted"
        );

        let err = PlaygroundError::ReplaceDirective {
            file: "go.mod".to_string(),
        };
        assert!(err.to_string().contains("replace directive is not allowed"));
        assert!(err.is_guard_rejection());
    }

    #[test]
    fn test_error_helpers() {
        let timeout = PlaygroundError::Timeout {
            command: "go build".to_string(),
            after: Duration::from_secs(30),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_validation());
        assert!(!timeout.is_guard_rejection());
        assert!(timeout.to_string().contains("timed out after 30s"));
    }
}
