//! Per-request sandbox directory.
//!
//! A [`SandboxDirectory`] binds an archive to a fresh temporary directory.
//! Opening it runs the dependency guard before anything is written, so a
//! rejected archive never touches the filesystem. The directory is removed
//! by [`SandboxDirectory::close`], which also runs on drop: an early return,
//! a panic, or a cancelled request future all clean up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::archive::Archive;
use crate::error::{PlaygroundError, Result};
use crate::guard::{self, AllowList, Manifest};
use crate::sandbox::config::PlaygroundConfig;
use crate::sandbox::io::Transcript;
use crate::sandbox::toolchain::{ExecutionResult, Toolchain};

/// Lifecycle state of a sandbox directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// The archive passed the guard; nothing is on disk yet.
    Guarded,
    /// Every file has been written.
    Materialized,
    /// A toolchain command is running.
    Executing,
    /// The directory has been removed.
    Closed,
}

/// A guarded archive written into its own temporary directory.
#[derive(Debug)]
pub struct SandboxDirectory {
    archive: Archive,
    manifests: Vec<Manifest>,
    dir: Option<TempDir>,
    state: SandboxState,
    transcript: Transcript,
}

impl SandboxDirectory {
    /// Guard and materialize an archive.
    ///
    /// Fails without creating anything if the guard rejects the archive. If
    /// writing fails part-way, everything written so far is removed.
    pub fn open(archive: Archive, allow: &AllowList, config: &PlaygroundConfig) -> Result<Self> {
        let manifests = guard::check_archive(&archive, allow)?;
        let mut sandbox = Self {
            archive,
            manifests,
            dir: None,
            state: SandboxState::Guarded,
            transcript: Transcript::new(),
        };
        if let Err(e) = sandbox.materialize(config) {
            tracing::error!(error = %e, "failed to materialize sandbox");
            // Removal failures are logged by close; the write error wins.
            let _ = sandbox.close();
            return Err(e);
        }
        Ok(sandbox)
    }

    fn materialize(&mut self, config: &PlaygroundConfig) -> Result<()> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&config.temp_prefix);
        let dir = match &config.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        let root = dir.path().to_path_buf();
        self.dir = Some(dir);

        for file in &self.archive {
            let target = resolve(&root, &file.name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &file.data)?;
        }
        self.state = SandboxState::Materialized;
        tracing::debug!(dir = %root.display(), files = self.archive.len(), "sandbox materialized");
        Ok(())
    }

    /// Run `go <args>` inside the directory, appending to the transcript.
    pub async fn exec(
        &mut self,
        toolchain: &Toolchain,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        let root = self.require_materialized()?.to_path_buf();
        self.state = SandboxState::Executing;
        let result = toolchain.run(&root, args, timeout, &self.transcript).await;
        self.state = SandboxState::Materialized;
        result
    }

    /// Replace the content of every archive file with what is on disk now.
    ///
    /// A `go.sum` created next to a manifest is added to the archive.
    pub fn read_files(&mut self) -> Result<()> {
        let root = self.require_materialized()?.to_path_buf();
        for file in self.archive.files_mut() {
            file.data = std::fs::read(resolve(&root, &file.name))?;
        }

        let sums: Vec<String> = self
            .manifests_paths()
            .map(|manifest| match manifest.rsplit_once('/') {
                Some((dir, _)) => format!("{dir}/go.sum"),
                None => "go.sum".to_string(),
            })
            .filter(|sum| !self.archive.contains(sum))
            .collect();
        for sum in sums {
            match std::fs::read(resolve(&root, &sum)) {
                Ok(data) => self.archive.add_file(sum, data)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn manifests_paths(&self) -> impl Iterator<Item = &str> {
        self.archive
            .iter()
            .filter(|f| f.base_name() == "go.mod")
            .map(|f| f.name.as_str())
    }

    /// Read a file the toolchain produced, e.g. the build artifact.
    pub fn read_artifact(&self, name: &str) -> Result<Vec<u8>> {
        let root = self.require_materialized()?;
        Ok(std::fs::read(resolve(root, name))?)
    }

    /// Location on disk, while the directory exists.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// The bound archive.
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Manifests parsed by the guard.
    pub fn manifests(&self) -> &[Manifest] {
        &self.manifests
    }

    /// Output of every command run so far.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Take the archive out, closing the directory.
    pub fn into_archive(mut self) -> Archive {
        std::mem::take(&mut self.archive)
    }

    /// Remove the directory. Closing twice, or closing a directory that was
    /// never created, does nothing.
    pub fn close(&mut self) -> Result<()> {
        self.state = SandboxState::Closed;
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        let path = dir.path().to_path_buf();
        dir.close().map_err(|e| {
            tracing::error!(dir = %path.display(), error = %e, "failed to remove sandbox directory");
            PlaygroundError::Io(e)
        })?;
        tracing::debug!(dir = %path.display(), "sandbox removed");
        Ok(())
    }

    fn require_materialized(&self) -> Result<&Path> {
        match (&self.dir, self.state) {
            (Some(dir), SandboxState::Materialized) => Ok(dir.path()),
            (_, state) => Err(PlaygroundError::Io(std::io::Error::other(format!(
                "sandbox directory is not ready ({state:?})"
            )))),
        }
    }
}

impl Drop for SandboxDirectory {
    fn drop(&mut self) {
        // close already logs removal failures
        let _ = self.close();
    }
}

/// Join a validated forward-slash archive name onto the sandbox root.
fn resolve(root: &Path, name: &str) -> PathBuf {
    name.split('/').fold(root.to_path_buf(), |path, segment| path.join(segment))
}
