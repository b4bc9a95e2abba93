//! Gist importer.
//!
//! A gist is fetched from the GitHub API and turned into an archive in one of
//! three ways depending on its shape; see [`GistShape`].

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::archive::{txtar, Archive};
use crate::error::{PlaygroundError, Result};
use crate::guard::is_package_main;
use crate::ingest::rate_limit::RateLimiter;
use crate::pipeline::Playground;
use crate::sandbox::config::PlaygroundConfig;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";
const MAX_NAME_CHARS: usize = 50;
const DEFAULT_NAME: &str = "Gist";

/// A gist as returned by the GitHub API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Gist {
    /// Gist ID.
    #[serde(default)]
    pub id: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the gist is public.
    #[serde(default)]
    pub public: bool,
    /// Files keyed by file name.
    #[serde(default)]
    pub files: BTreeMap<String, GistFile>,
}

/// One file of a gist.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GistFile {
    /// File name; the map key is used when absent.
    #[serde(default)]
    pub filename: Option<String>,
    /// File content.
    #[serde(default)]
    pub content: Option<String>,
    /// Set when the API omitted part of the content.
    #[serde(default)]
    pub truncated: bool,
}

/// A gist file reduced to name and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GistEntry {
    /// File name.
    pub name: String,
    /// File content.
    pub content: String,
}

impl Gist {
    /// Files sorted by name.
    ///
    /// Fails if the API truncated any file.
    pub fn entries(&self) -> Result<Vec<GistEntry>> {
        let mut entries = Vec::with_capacity(self.files.len());
        for (key, file) in &self.files {
            let name = file.filename.clone().unwrap_or_else(|| key.clone());
            if file.truncated {
                return Err(PlaygroundError::Upstream(format!(
                    "gist file {name} is too large to import"
                )));
            }
            entries.push(GistEntry {
                name,
                content: file.content.clone().unwrap_or_default(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Display name: the trimmed description cut to 50 characters, or `Gist`.
    pub fn name(&self) -> String {
        gist_name(self.description.as_deref().unwrap_or_default())
    }
}

/// Display name for a gist description.
pub fn gist_name(description: &str) -> String {
    let description = description.trim();
    if description.is_empty() {
        return DEFAULT_NAME.to_string();
    }
    description.chars().take(MAX_NAME_CHARS).collect()
}

/// How a gist's files become an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GistShape {
    /// A single `.txt`/`.txtar` file holding a txtar archive.
    Txtar(GistEntry),
    /// A single `.go` file declaring `package main`.
    SingleProgram(GistEntry),
    /// Anything else: every file taken as-is.
    MultiFile(Vec<GistEntry>),
}

impl GistShape {
    /// Classify sorted gist entries.
    pub fn classify(mut entries: Vec<GistEntry>) -> Self {
        if entries.len() == 1 {
            let ext = extension(&entries[0].name);
            if matches!(ext.as_deref(), Some("txt" | "txtar")) {
                return GistShape::Txtar(entries.remove(0));
            }
            if ext.as_deref() == Some("go") && is_package_main(entries[0].content.as_bytes()) {
                return GistShape::SingleProgram(entries.remove(0));
            }
        }
        GistShape::MultiFile(entries)
    }
}

fn extension(name: &str) -> Option<String> {
    let base = crate::archive::permission::base_name(name);
    crate::archive::permission::extension(base).map(str::to_ascii_lowercase)
}

/// Decode a txtar gist. Every member must pass the permission filter;
/// nested txtar members are expanded one level.
pub fn archive_from_txtar(entry: &GistEntry) -> Result<Archive> {
    let decoded = txtar::parse(entry.content.as_bytes());
    let mut archive = Archive::from_files(decoded.files)?;
    archive.expand_nested_archives()?;
    Ok(archive)
}

/// Take every gist file as an archive member. Every name must pass the
/// permission filter; nested txtar members are expanded one level.
pub fn archive_from_files(entries: Vec<GistEntry>) -> Result<Archive> {
    let mut archive = Archive::from_files(entries.into_iter().map(|e| (e.name, e.content)))?;
    archive.expand_nested_archives()?;
    Ok(archive)
}

/// The smallest buildable archive for a single program: a synthesized
/// `go.mod` plus the program.
pub fn minimal_program_archive(entry: &GistEntry, go_version: &str) -> Result<Archive> {
    Archive::from_files([
        (
            "go.mod".to_string(),
            format!("module example.com\n\ngo {go_version}\n"),
        ),
        (entry.name.clone(), entry.content.clone()),
    ])
}

/// Wrap a single program with a `go.mod` and resolve its requirements.
///
/// If `go mod tidy` fails for any reason, including a guard rejection, the
/// minimal archive is returned instead.
pub async fn archive_from_program(entry: &GistEntry, playground: &Playground) -> Result<Archive> {
    let go_version = playground.go_version_or_fallback().await;
    let minimal = minimal_program_archive(entry, &go_version)?;

    let timeout = playground.config().auto_tidy_timeout;
    match playground.tidy_with_timeout(minimal.clone(), timeout).await {
        Ok(outcome) if outcome.success => Ok(outcome.archive),
        Ok(outcome) => {
            tracing::warn!(
                file = %entry.name,
                transcript = %outcome.transcript,
                "go mod tidy failed for gist program, using minimal archive"
            );
            Ok(minimal)
        }
        Err(e) => {
            tracing::warn!(
                file = %entry.name,
                error = %e,
                "could not tidy gist program, using minimal archive"
            );
            Ok(minimal)
        }
    }
}

/// Build the archive for a fetched gist.
pub async fn archive_from_gist(gist: &Gist, playground: &Playground) -> Result<Archive> {
    match GistShape::classify(gist.entries()?) {
        GistShape::Txtar(entry) => archive_from_txtar(&entry),
        GistShape::SingleProgram(entry) => archive_from_program(&entry, playground).await,
        GistShape::MultiFile(entries) => archive_from_files(entries),
    }
}

/// A gist converted to an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedGist {
    /// Display name.
    pub name: String,
    /// Archive built from the gist.
    pub archive: Archive,
}

/// Fetch a gist and convert it to an archive.
pub async fn import_gist(client: &GistClient, playground: &Playground, id: &str) -> Result<ImportedGist> {
    let gist = client.fetch(id).await?;
    let archive = archive_from_gist(&gist, playground).await.inspect_err(|e| {
        tracing::warn!(gist = id, error = %e, "rejected gist");
    })?;
    tracing::info!(gist = id, files = archive.len(), "imported gist");
    Ok(ImportedGist {
        name: gist.name(),
        archive,
    })
}

/// Rate-limited client for the GitHub gist API.
#[derive(Debug, Clone)]
pub struct GistClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl GistClient {
    /// Create a client sharing an existing rate limiter.
    pub fn new(config: &PlaygroundConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let base_url = Url::parse(&config.gist_api_base_url).map_err(|e| {
            PlaygroundError::Config(format!(
                "invalid gist API URL {:?}: {e}",
                config.gist_api_base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PlaygroundError::Config(format!(
                "gist API URL {base_url} cannot be a base"
            )));
        }
        let http = Client::builder()
            .timeout(config.gist_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PlaygroundError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url,
            token: config.github_token.clone(),
            limiter,
        })
    }

    /// Create a client with its own rate limiter from the configuration.
    pub fn from_config(config: &PlaygroundConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(config.gist_rate, config.gist_burst));
        Self::new(config, limiter)
    }

    /// The rate limiter guarding this client.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn gist_url(&self, id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["gists", id]);
        }
        url
    }

    /// Fetch a public gist.
    ///
    /// The rate limiter is consulted before any network traffic. Missing and
    /// private gists are both [`PlaygroundError::GistNotFound`].
    pub async fn fetch(&self, id: &str) -> Result<Gist> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PlaygroundError::InvalidRequest(format!("invalid gist ID {id:?}")));
        }
        self.limiter.try_acquire()?;

        let mut request = self.http.get(self.gist_url(id)).header(ACCEPT, GITHUB_MEDIA_TYPE);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(upstream)?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(PlaygroundError::GistNotFound),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!(gist = id, status = %response.status(), "gist API refused request");
                return Err(PlaygroundError::UpstreamRateLimited);
            }
            status if !status.is_success() => {
                tracing::error!(gist = id, %status, "failed to fetch gist");
                return Err(PlaygroundError::Upstream(format!("unexpected status {status}")));
            }
            _ => {}
        }

        let gist: Gist = response.json().await.map_err(upstream)?;
        if !gist.public {
            tracing::debug!(gist = id, "gist is private");
            return Err(PlaygroundError::GistNotFound);
        }
        Ok(gist)
    }
}

fn upstream(e: reqwest::Error) -> PlaygroundError {
    if e.is_timeout() {
        tracing::error!(error = %e, "gist fetch timed out");
        PlaygroundError::Upstream("request timed out".to_string())
    } else {
        tracing::error!(error = %e, "failed to fetch gist");
        PlaygroundError::Upstream(e.to_string())
    }
}
