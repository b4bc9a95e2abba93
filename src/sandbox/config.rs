//! Playground configuration with builder pattern.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration shared by the sandbox, the pipelines and the gist client.
#[derive(Debug, Clone)]
pub struct PlaygroundConfig {
    /// Explicit path to the `go` binary. Looked up on `PATH` when unset.
    pub go_binary: Option<PathBuf>,
    /// Parent directory for sandbox directories. The system temp dir when unset.
    pub temp_root: Option<PathBuf>,
    /// Name prefix for sandbox directories.
    pub temp_prefix: String,
    /// Name of the build artifact inside the sandbox.
    pub artifact_name: String,
    /// Variables forced on every toolchain invocation.
    pub target_env: Vec<(String, String)>,
    /// Timeout for `go build`.
    pub build_timeout: Duration,
    /// Timeout for the tidy, upgrade and format pipelines.
    pub tidy_timeout: Duration,
    /// Timeout for tidying a synthesized single-program archive.
    pub auto_tidy_timeout: Duration,
    /// Timeout for `go version`.
    pub version_timeout: Duration,
    /// Timeout for one gist fetch.
    pub gist_timeout: Duration,
    /// Base URL of the gist API.
    pub gist_api_base_url: String,
    /// Token sent as a bearer credential to the gist API.
    pub github_token: Option<String>,
    /// Gist fetches granted per second.
    pub gist_rate: u64,
    /// Gist fetches allowed in a burst.
    pub gist_burst: u64,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
    /// Largest total uncompressed size of an uploaded zip, in bytes.
    pub max_uncompressed_bytes: u64,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            go_binary: None,
            temp_root: None,
            temp_prefix: "playground-".to_string(),
            artifact_name: "main.wasm".to_string(),
            target_env: vec![
                ("GOOS".to_string(), "js".to_string()),
                ("GOARCH".to_string(), "wasm".to_string()),
            ],
            build_timeout: Duration::from_secs(30),
            tidy_timeout: Duration::from_secs(60),
            auto_tidy_timeout: Duration::from_secs(30),
            version_timeout: Duration::from_secs(2),
            gist_timeout: Duration::from_secs(15),
            gist_api_base_url: "https://api.github.com".to_string(),
            github_token: None,
            gist_rate: 1,
            gist_burst: 5,
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
            max_uncompressed_bytes: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl PlaygroundConfig {
    /// Create a new builder for PlaygroundConfig.
    pub fn builder() -> PlaygroundConfigBuilder {
        PlaygroundConfigBuilder::default()
    }
}

/// Builder for creating PlaygroundConfig instances.
#[derive(Debug, Clone, Default)]
pub struct PlaygroundConfigBuilder {
    go_binary: Option<PathBuf>,
    temp_root: Option<PathBuf>,
    temp_prefix: Option<String>,
    artifact_name: Option<String>,
    target_env: Option<Vec<(String, String)>>,
    build_timeout: Option<Duration>,
    tidy_timeout: Option<Duration>,
    auto_tidy_timeout: Option<Duration>,
    version_timeout: Option<Duration>,
    gist_timeout: Option<Duration>,
    gist_api_base_url: Option<String>,
    github_token: Option<String>,
    gist_rate: Option<u64>,
    gist_burst: Option<u64>,
    max_upload_bytes: Option<usize>,
    max_uncompressed_bytes: Option<u64>,
}

impl PlaygroundConfigBuilder {
    /// Use a specific `go` binary instead of searching `PATH`.
    pub fn go_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.go_binary = Some(path.into());
        self
    }

    /// Create sandbox directories under this directory.
    pub fn temp_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(path.into());
        self
    }

    /// Set the sandbox directory name prefix.
    pub fn temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = Some(prefix.into());
        self
    }

    /// Set the build artifact file name.
    pub fn artifact_name(mut self, name: impl Into<String>) -> Self {
        self.artifact_name = Some(name.into());
        self
    }

    /// Replace the forced toolchain environment.
    pub fn target_env<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.target_env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Set the build timeout.
    pub fn build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = Some(timeout);
        self
    }

    /// Set the tidy/upgrade/format timeout.
    pub fn tidy_timeout(mut self, timeout: Duration) -> Self {
        self.tidy_timeout = Some(timeout);
        self
    }

    /// Set the single-program auto-tidy timeout.
    pub fn auto_tidy_timeout(mut self, timeout: Duration) -> Self {
        self.auto_tidy_timeout = Some(timeout);
        self
    }

    /// Set the `go version` timeout.
    pub fn version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = Some(timeout);
        self
    }

    /// Set the gist fetch timeout.
    pub fn gist_timeout(mut self, timeout: Duration) -> Self {
        self.gist_timeout = Some(timeout);
        self
    }

    /// Point the gist client at a different API.
    pub fn gist_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.gist_api_base_url = Some(url.into());
        self
    }

    /// Authenticate gist requests with a token.
    pub fn github_token(mut self, token: impl Into<String>) -> Self {
        self.github_token = Some(token.into());
        self
    }

    /// Set the gist rate limit: `rate` fetches per second with bursts of `burst`.
    pub fn gist_rate_limit(mut self, rate: u64, burst: u64) -> Self {
        self.gist_rate = Some(rate);
        self.gist_burst = Some(burst);
        self
    }

    /// Set the request body size limit.
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = Some(bytes);
        self
    }

    /// Set the uncompressed zip size limit.
    pub fn max_uncompressed_bytes(mut self, bytes: u64) -> Self {
        self.max_uncompressed_bytes = Some(bytes);
        self
    }

    /// Build the PlaygroundConfig.
    pub fn build(self) -> PlaygroundConfig {
        let default = PlaygroundConfig::default();
        PlaygroundConfig {
            go_binary: self.go_binary.or(default.go_binary),
            temp_root: self.temp_root.or(default.temp_root),
            temp_prefix: self.temp_prefix.unwrap_or(default.temp_prefix),
            artifact_name: self.artifact_name.unwrap_or(default.artifact_name),
            target_env: self.target_env.unwrap_or(default.target_env),
            build_timeout: self.build_timeout.unwrap_or(default.build_timeout),
            tidy_timeout: self.tidy_timeout.unwrap_or(default.tidy_timeout),
            auto_tidy_timeout: self.auto_tidy_timeout.unwrap_or(default.auto_tidy_timeout),
            version_timeout: self.version_timeout.unwrap_or(default.version_timeout),
            gist_timeout: self.gist_timeout.unwrap_or(default.gist_timeout),
            gist_api_base_url: self.gist_api_base_url.unwrap_or(default.gist_api_base_url),
            github_token: self.github_token.or(default.github_token),
            gist_rate: self.gist_rate.unwrap_or(default.gist_rate),
            gist_burst: self.gist_burst.unwrap_or(default.gist_burst),
            max_upload_bytes: self.max_upload_bytes.unwrap_or(default.max_upload_bytes),
            max_uncompressed_bytes: self
                .max_uncompressed_bytes
                .unwrap_or(default.max_uncompressed_bytes),
        }
    }
}
