//! Bounded execution of the external Go toolchain.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::{PlaygroundError, Result};
use crate::sandbox::config::PlaygroundConfig;
use crate::sandbox::env::inherited_env;
use crate::sandbox::io::Transcript;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"go(?P<version>\d+[.\-\w]*)").expect("version pattern is valid")
});

/// Outcome of one toolchain invocation that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code, or `None` when the process was ended by a signal.
    pub exit_code: Option<i32>,
    /// Wall-clock time the process ran.
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the process exited with status 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A located `go` binary plus the environment every invocation runs with.
#[derive(Debug, Clone)]
pub struct Toolchain {
    go: PathBuf,
    env: Vec<(String, String)>,
}

impl Toolchain {
    /// Create a toolchain from an explicit binary and complete environment.
    pub fn new(go: impl Into<PathBuf>, env: Vec<(String, String)>) -> Self {
        Self { go: go.into(), env }
    }

    /// Locate `go` from the configuration or `PATH`, and inherit the process
    /// environment with the configured target overrides applied.
    pub fn discover(config: &PlaygroundConfig) -> Result<Self> {
        let go = match &config.go_binary {
            Some(path) => path.clone(),
            None => which::which("go")
                .map_err(|e| PlaygroundError::ToolchainNotFound(e.to_string()))?,
        };
        tracing::debug!(go = %go.display(), "using go toolchain");
        Ok(Self::new(go, inherited_env(&config.target_env)))
    }

    /// Path of the `go` binary.
    pub fn go(&self) -> &Path {
        &self.go
    }

    /// Environment passed to every invocation.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// The command line as shown in transcripts.
    pub fn command_line(&self, args: &[&str]) -> String {
        let program = self
            .go
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| self.go.to_string_lossy());
        std::iter::once(program.as_ref())
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run `go <args>` in `dir`, streaming stdout and stderr into `transcript`.
    ///
    /// A non-zero exit is reported through [`ExecutionResult::exit_code`].
    /// Exceeding `timeout` kills the process and returns
    /// [`PlaygroundError::Timeout`].
    pub async fn run(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
        transcript: &Transcript,
    ) -> Result<ExecutionResult> {
        self.run_in(Some(dir), args, timeout, transcript).await
    }

    /// Query the toolchain version, e.g. `1.22.4` from `go version go1.22.4 linux/amd64`.
    pub async fn version(&self, timeout: Duration) -> Result<String> {
        let transcript = Transcript::new();
        let result = self.run_in(None, &["version"], timeout, &transcript).await?;
        let output = transcript.to_string_lossy();
        let command = self.command_line(&["version"]);
        if !result.is_success() {
            return Err(PlaygroundError::ToolchainFailed { command, output });
        }
        parse_version(&output).ok_or_else(|| PlaygroundError::ToolchainFailed {
            command,
            output: format!("failed to read version from output: {output}"),
        })
    }

    async fn run_in(
        &self,
        dir: Option<&Path>,
        args: &[&str],
        timeout: Duration,
        transcript: &Transcript,
    ) -> Result<ExecutionResult> {
        let command_line = self.command_line(args);
        if dir.is_some() {
            transcript.write_command(&command_line);
        }

        let mut cmd = Command::new(&self.go);
        cmd.args(args)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        // Compiler and linker children share the group and die with it.
        #[cfg(unix)]
        cmd.process_group(0);

        tracing::debug!(command = %command_line, dir = ?dir, "spawning toolchain");
        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                PlaygroundError::ToolchainNotFound(self.go.display().to_string())
            }
            _ => PlaygroundError::Io(e),
        })?;
        let mut group = ProcessGroup::new(child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let work = async {
            let (status, out, err) = tokio::join!(
                child.wait(),
                pump(stdout, transcript),
                pump(stderr, transcript),
            );
            out?;
            err?;
            status
        };

        // Race between completion and timeout
        let outcome: Option<std::io::Result<ExitStatus>> = tokio::select! {
            status = work => Some(status),
            _ = tokio::time::sleep(timeout) => None,
        };

        let Some(status) = outcome else {
            tracing::warn!(command = %command_line, ?timeout, "toolchain timed out");
            group.kill();
            if let Err(e) = child.kill().await {
                tracing::error!(command = %command_line, error = %e, "failed to kill toolchain");
            }
            return Err(PlaygroundError::Timeout {
                command: command_line,
                after: timeout,
            });
        };

        group.disarm();
        let result = ExecutionResult {
            exit_code: status?.code(),
            duration: start.elapsed(),
        };
        tracing::debug!(
            command = %command_line,
            exit_code = ?result.exit_code,
            elapsed = ?result.duration,
            "toolchain finished"
        );
        Ok(result)
    }
}

/// Process group led by a spawned toolchain process.
///
/// Killed on drop unless disarmed, so a cancelled request also takes down
/// grandchildren that `kill_on_drop` would miss.
struct ProcessGroup {
    leader: Option<u32>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self { leader }
    }

    fn disarm(&mut self) {
        self.leader = None;
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(leader) = self.leader.take() else {
            return;
        };
        let Ok(pgid) = i32::try_from(leader) else {
            return;
        };
        if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            if e != nix::errno::Errno::ESRCH {
                tracing::warn!(pgid, error = %e, "failed to kill toolchain process group");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.leader = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Copy everything from a child pipe into the transcript.
async fn pump<R: AsyncRead + Unpin>(reader: Option<R>, transcript: &Transcript) -> std::io::Result<()> {
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        transcript.append(&buf[..n]);
    }
}

/// Extract the version number from `go version` output.
pub fn parse_version(output: &str) -> Option<String> {
    VERSION_PATTERN
        .captures(output)
        .and_then(|caps| caps.name("version"))
        .map(|m| m.as_str().to_string())
}
