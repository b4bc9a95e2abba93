//! JSON HTTP service over the playground pipelines.
//!
//! Archive-carrying requests use the editor's form encoding (see
//! [`FormFields`]); every response body is JSON except `/download`, which
//! returns the zip file itself.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::archive::Archive;
use crate::error::{ErrorKind, PlaygroundError, Result};
use crate::ingest::form::{archive_from_form, FormFields};
use crate::ingest::gist::{import_gist, GistClient};
use crate::ingest::upload::archive_from_zip;
use crate::pipeline::{BuildResult, Playground, TidyOutcome};

/// Form field naming the file to create.
pub const NEW_FILENAME_FIELD: &str = "new-filename";
/// Form field naming the file to delete.
pub const DELETE_FILENAME_FIELD: &str = "delete-filename";
/// Multipart field carrying an uploaded zip file.
pub const UPLOAD_FIELD: &str = "zip";

const UPLOAD_NAME: &str = "Upload";

/// Shared state of every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    playground: Playground,
    gists: GistClient,
}

impl AppState {
    /// Create handler state.
    pub fn new(playground: Playground, gists: GistClient) -> Self {
        Self { playground, gists }
    }
}

/// One archive member in a JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Relative path.
    pub name: String,
    /// Content as text.
    pub content: String,
}

/// An archive in a JSON response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveResponse {
    /// Display name, for imported archives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Files in archive order.
    pub files: Vec<FileEntry>,
}

impl ArchiveResponse {
    fn new(name: Option<String>, archive: &Archive) -> Self {
        Self {
            name,
            files: archive
                .iter()
                .map(|f| FileEntry {
                    name: f.name.clone(),
                    content: f.text().into_owned(),
                })
                .collect(),
        }
    }
}

/// Result of a tidy, upgrade or format request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteResponse {
    /// Whether every command succeeded.
    pub success: bool,
    /// Resulting files.
    pub files: Vec<FileEntry>,
    /// Command output.
    pub transcript: String,
}

impl From<TidyOutcome> for RewriteResponse {
    fn from(outcome: TidyOutcome) -> Self {
        Self {
            success: outcome.success,
            files: ArchiveResponse::new(None, &outcome.archive).files,
            transcript: outcome.transcript,
        }
    }
}

/// Toolchain version response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionResponse {
    /// Version number, e.g. `1.22.4`.
    pub version: String,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
}

/// A [`PlaygroundError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(PlaygroundError);

impl From<PlaygroundError> for ApiError {
    fn from(err: PlaygroundError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match self.0.kind() {
            ErrorKind::Resource => {
                tracing::error!(error = %self.0, "request failed");
                "internal server error".to_string()
            }
            ErrorKind::Upstream => "failed to fetch gist".to_string(),
            _ => self.0.to_string(),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.playground.config().max_upload_bytes;
    Router::new()
        .route("/go/version", get(version))
        .route("/go/run", post(run))
        .route("/go/mod/tidy", post(tidy))
        .route("/go/mod/upgrade", post(upgrade))
        .route("/fmt", post(format))
        .route("/download", post(download))
        .route("/upload", post(upload))
        .route("/file/new", post(new_file))
        .route("/file/delete", post(delete_file))
        .route("/gist/{id}", get(gist))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve the router on a bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "playground server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn form_archive(body: &Bytes) -> Result<(FormFields, Archive)> {
    let form = FormFields::parse_urlencoded(body);
    let archive = archive_from_form(&form)?;
    Ok((form, archive))
}

async fn version(State(state): State<AppState>) -> ApiResult<Json<VersionResponse>> {
    let version = state.playground.go_version().await?;
    Ok(Json(VersionResponse { version }))
}

async fn run(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<BuildResult>> {
    let (_, archive) = form_archive(&body)?;
    Ok(Json(state.playground.build(archive).await?))
}

async fn tidy(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<RewriteResponse>> {
    let (_, archive) = form_archive(&body)?;
    Ok(Json(state.playground.tidy(archive).await?.into()))
}

async fn upgrade(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<RewriteResponse>> {
    let (_, archive) = form_archive(&body)?;
    Ok(Json(state.playground.upgrade(archive).await?.into()))
}

async fn format(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<RewriteResponse>> {
    let (_, archive) = form_archive(&body)?;
    Ok(Json(state.playground.format(archive).await?.into()))
}

async fn download(body: Bytes) -> ApiResult<Response> {
    let (_, archive) = form_archive(&body)?;
    let zip = archive.to_zip()?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"playground.zip\""),
        ],
        zip,
    )
        .into_response())
}

async fn upload(State(state): State<AppState>, request: Request) -> ApiResult<Json<ArchiveResponse>> {
    let data = if is_multipart(request.headers()) {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| PlaygroundError::InvalidRequest(e.body_text()))?;
        let field = multipart
            .next_field()
            .await
            .map_err(|e| PlaygroundError::InvalidRequest(e.body_text()))?
            .ok_or_else(|| PlaygroundError::InvalidRequest(format!("missing {UPLOAD_FIELD} field")))?;
        if field.name() != Some(UPLOAD_FIELD) {
            return Err(PlaygroundError::InvalidRequest(format!(
                "expected a single {UPLOAD_FIELD} field"
            ))
            .into());
        }
        field
            .bytes()
            .await
            .map_err(|e| PlaygroundError::InvalidRequest(e.body_text()))?
    } else {
        Bytes::from_request(request, &state)
            .await
            .map_err(|e| PlaygroundError::InvalidRequest(e.body_text()))?
    };

    let archive = archive_from_zip(&data, state.playground.config().max_uncompressed_bytes)?;
    Ok(Json(ArchiveResponse::new(Some(UPLOAD_NAME.to_string()), &archive)))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

async fn new_file(body: Bytes) -> ApiResult<Json<ArchiveResponse>> {
    let (form, mut archive) = form_archive(&body)?;
    let name = form
        .get(NEW_FILENAME_FIELD)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PlaygroundError::InvalidRequest("filename required".to_string()))?;
    archive.new_file(name)?;
    Ok(Json(ArchiveResponse::new(None, &archive)))
}

async fn delete_file(body: Bytes) -> ApiResult<Json<ArchiveResponse>> {
    let (form, mut archive) = form_archive(&body)?;
    let name = form
        .get(DELETE_FILENAME_FIELD)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PlaygroundError::InvalidRequest("filename required".to_string()))?;
    archive.delete_file(name);
    Ok(Json(ArchiveResponse::new(None, &archive)))
}

async fn gist(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<ArchiveResponse>> {
    let imported = import_gist(&state.gists, &state.playground, &id).await?;
    Ok(Json(ArchiveResponse::new(Some(imported.name), &imported.archive)))
}
