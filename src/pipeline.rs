//! Build and module-maintenance pipelines.
//!
//! Each pipeline opens a [`SandboxDirectory`] for the request, runs one or
//! more toolchain commands in it, reads the results back and closes the
//! directory before returning.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::archive::Archive;
use crate::error::{PlaygroundError, Result};
use crate::guard::AllowList;
use crate::sandbox::config::PlaygroundConfig;
use crate::sandbox::directory::SandboxDirectory;
use crate::sandbox::toolchain::Toolchain;

/// Go version assumed when the toolchain cannot be queried.
pub const FALLBACK_GO_VERSION: &str = "1.25";

const MOD_TIDY: &[&str] = &["mod", "tidy"];
const GET_UPDATE: &[&str] = &["get", "-u", "./..."];
const FMT: &[&str] = &["fmt", "./..."];

/// Result of compiling an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Whether an artifact was produced.
    pub success: bool,
    /// Base64-encoded artifact; present only on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Output of every command that ran.
    pub transcript: String,
}

/// Result of a pipeline that rewrites the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TidyOutcome {
    /// Whether every command exited successfully.
    pub success: bool,
    /// The rewritten archive on success, the submitted archive otherwise.
    pub archive: Archive,
    /// Output of every command that ran.
    pub transcript: String,
}

/// Entry point for the toolchain pipelines.
#[derive(Debug, Clone)]
pub struct Playground {
    config: Arc<PlaygroundConfig>,
    toolchain: Toolchain,
    allow_list: Arc<AllowList>,
}

impl Playground {
    /// Create a playground from its parts.
    pub fn new(config: PlaygroundConfig, toolchain: Toolchain, allow_list: AllowList) -> Self {
        Self {
            config: Arc::new(config),
            toolchain,
            allow_list: Arc::new(allow_list),
        }
    }

    /// Locate the toolchain and use the bundled allowlists.
    pub fn discover(config: PlaygroundConfig) -> Result<Self> {
        let toolchain = Toolchain::discover(&config)?;
        Ok(Self::new(config, toolchain, AllowList::bundled()))
    }

    /// Configuration in use.
    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    /// Toolchain in use.
    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Allowlists in use.
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Guard and materialize an archive on the blocking pool.
    pub async fn open(&self, archive: Archive) -> Result<SandboxDirectory> {
        let allow_list = Arc::clone(&self.allow_list);
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || SandboxDirectory::open(archive, &allow_list, &config))
            .await
            .map_err(join_failed)?
    }

    /// Compile an archive to a base64 artifact.
    ///
    /// Guard rejections are errors. A compile failure or timeout is a
    /// failed [`BuildResult`] whose transcript explains what happened.
    pub async fn build(&self, archive: Archive) -> Result<BuildResult> {
        let artifact_name = self.config.artifact_name.as_str();
        let mut sandbox = self.open(archive).await?;
        let args = ["build", "-trimpath", "-o", artifact_name];

        let succeeded = match sandbox
            .exec(&self.toolchain, &args, self.config.build_timeout)
            .await
        {
            Ok(result) => result.is_success(),
            Err(e) if e.is_timeout() => {
                sandbox.transcript().append(format!("\n{e}\n").as_bytes());
                false
            }
            Err(e) => return Err(e),
        };

        let (sandbox, artifact) = if succeeded {
            let name = artifact_name.to_string();
            let (sandbox, bytes) = with_sandbox(sandbox, move |s| s.read_artifact(&name)).await?;
            (sandbox, Some(STANDARD.encode(bytes)))
        } else {
            (sandbox, None)
        };
        let transcript = sandbox.transcript().to_string_lossy();
        with_sandbox(sandbox, SandboxDirectory::close).await?;

        tracing::info!(success = succeeded, "build finished");
        Ok(BuildResult {
            success: succeeded,
            artifact,
            transcript,
        })
    }

    /// Run `go mod tidy` and return the updated archive.
    pub async fn tidy(&self, archive: Archive) -> Result<TidyOutcome> {
        self.tidy_with_timeout(archive, self.config.tidy_timeout).await
    }

    pub(crate) async fn tidy_with_timeout(
        &self,
        archive: Archive,
        timeout: Duration,
    ) -> Result<TidyOutcome> {
        self.rewrite(archive, &[MOD_TIDY], timeout).await
    }

    /// Run `go get -u ./...` then `go mod tidy`.
    pub async fn upgrade(&self, archive: Archive) -> Result<TidyOutcome> {
        self.rewrite(archive, &[GET_UPDATE, MOD_TIDY], self.config.tidy_timeout)
            .await
    }

    /// Run `go fmt ./...` and return the reformatted archive.
    pub async fn format(&self, archive: Archive) -> Result<TidyOutcome> {
        self.rewrite(archive, &[FMT], self.config.tidy_timeout).await
    }

    /// Query the toolchain version.
    pub async fn go_version(&self) -> Result<String> {
        self.toolchain.version(self.config.version_timeout).await
    }

    /// Query the toolchain version, falling back to [`FALLBACK_GO_VERSION`].
    pub async fn go_version_or_fallback(&self) -> String {
        match self.go_version().await {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!(error = %e, fallback = FALLBACK_GO_VERSION, "failed to read go version");
                FALLBACK_GO_VERSION.to_string()
            }
        }
    }

    /// Run `steps` in order, all sharing one deadline, and read the files back.
    ///
    /// The first failing step stops the pipeline and the submitted archive is
    /// returned unchanged.
    async fn rewrite(
        &self,
        archive: Archive,
        steps: &[&[&str]],
        timeout: Duration,
    ) -> Result<TidyOutcome> {
        let original = archive.clone();
        let mut sandbox = self.open(archive).await?;
        let deadline = tokio::time::Instant::now() + timeout;

        let mut success = true;
        for args in steps {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match sandbox.exec(&self.toolchain, args, remaining).await {
                Ok(result) if result.is_success() => {}
                Ok(_) => {
                    success = false;
                    break;
                }
                Err(e) if e.is_timeout() => {
                    sandbox.transcript().append(format!("\n{e}\n").as_bytes());
                    success = false;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let (sandbox, archive) = if success {
            with_sandbox(sandbox, |s| {
                s.read_files()?;
                Ok(s.archive().clone())
            })
            .await?
        } else {
            (sandbox, original)
        };
        let transcript = sandbox.transcript().to_string_lossy();
        with_sandbox(sandbox, SandboxDirectory::close).await?;

        tracing::info!(success, steps = steps.len(), "module pipeline finished");
        Ok(TidyOutcome {
            success,
            archive,
            transcript,
        })
    }
}

/// Run filesystem work on a sandbox from the blocking pool and hand it back.
///
/// On failure the sandbox is dropped, and so removed, on the blocking thread.
async fn with_sandbox<T, F>(mut sandbox: SandboxDirectory, f: F) -> Result<(SandboxDirectory, T)>
where
    F: FnOnce(&mut SandboxDirectory) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let value = f(&mut sandbox)?;
        Ok((sandbox, value))
    })
    .await
    .map_err(join_failed)?
}

fn join_failed(e: tokio::task::JoinError) -> PlaygroundError {
    PlaygroundError::Io(std::io::Error::other(format!("sandbox task panicked: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_result_serialization() {
        let failed = BuildResult {
            success: false,
            artifact: None,
            transcript: "$ go build -trimpath -o main.wasm\nsyntax error\n".to_string(),
        };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert!(json.get("artifact").is_none());

        let built = BuildResult {
            success: true,
            artifact: Some("AGFzbQ==".to_string()),
            transcript: String::new(),
        };
        let json = serde_json::to_value(&built).unwrap();
        assert_eq!(json["artifact"], "AGFzbQ==");
    }

    #[tokio::test]
    async fn test_failed_sandbox_step_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let config = PlaygroundConfig::builder().temp_root(root.path()).build();
        let archive = Archive::from_files([("main.go", "package main\n")]).unwrap();
        let sandbox = SandboxDirectory::open(archive, &AllowList::bundled(), &config).unwrap();

        let (sandbox, names) = with_sandbox(sandbox, |s| Ok(s.archive().len())).await.unwrap();
        assert_eq!(names, 1);
        assert!(sandbox.path().unwrap().exists());

        let err = with_sandbox(sandbox, |s| s.read_artifact("main.wasm"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaygroundError::Io(_)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
