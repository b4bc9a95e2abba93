//! Shared helpers for the integration tests.
//!
//! Most tests run against a stand-in `go` written as a POSIX shell script, so
//! they need no real toolchain. The script understands just enough of the
//! command line to exercise the pipelines:
//!
//! * `go version` prints `go version go1.22.4 linux/amd64`.
//! * `go build ... -o NAME` writes a small wasm header to `NAME`, fails when a
//!   source file contains `SYNTAX_ERROR` and hangs when one contains `HANG`.
//!   With `SPAWN_WORKER` it waits on a background `sleep` whose PID it prints
//!   as `worker <pid>`.
//! * `go mod tidy` appends a `// tidied` comment to `go.mod` once and creates
//!   an empty `go.sum`; it fails when a source file contains `TIDY_FAIL`.
//! * `go fmt ./...` strips trailing whitespace from every `.go` file.
//! * `go get -u ./...` only prints a message.

#![allow(dead_code)]

use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use url::Url;
use wasm_go_playground_rs::prelude::*;
use wasm_go_playground_rs::PlaygroundConfigBuilder;

/// Bytes the stand-in toolchain writes as the build artifact.
pub const FAKE_ARTIFACT: &[u8] = b"\0asm\x01\0\0\0";

/// Version reported by the stand-in toolchain.
pub const FAKE_VERSION: &str = "1.22.4";

const FAKE_GO: &str = r#"#!/bin/sh
case "$1" in
version)
    echo "go version go1.22.4 linux/amd64"
    ;;
build)
    out=""
    while [ $# -gt 0 ]; do
        if [ "$1" = "-o" ]; then out="$2"; fi
        shift
    done
    echo "GOOS=$GOOS GOARCH=$GOARCH" >&2
    if grep -q SPAWN_WORKER *.go 2>/dev/null; then
        sleep 30 &
        echo "worker $!" >&2
        wait
    fi
    if grep -q HANG *.go 2>/dev/null; then
        exec sleep 30
    fi
    if grep -q SYNTAX_ERROR *.go 2>/dev/null; then
        echo "./main.go:3:1: syntax error: unexpected }" >&2
        exit 1
    fi
    printf '\000asm\001\000\000\000' > "$out"
    ;;
mod)
    if [ "$2" != "tidy" ]; then
        echo "go mod $2: unknown command" >&2
        exit 2
    fi
    if grep -q TIDY_FAIL *.go 2>/dev/null; then
        echo "go: example.com/missing: module not found" >&2
        exit 1
    fi
    grep -q '^// tidied$' go.mod || printf '// tidied\n' >> go.mod
    [ -f go.sum ] || : > go.sum
    ;;
get)
    echo "go: upgraded dependencies"
    ;;
fmt)
    for f in *.go; do
        sed 's/[[:space:]]*$//' "$f" > "$f.fmt" && mv "$f.fmt" "$f"
    done
    ;;
*)
    echo "go $1: unknown command" >&2
    exit 2
    ;;
esac
"#;

/// Path of the stand-in `go` binary, written once per test binary.
pub fn fake_go() -> &'static Path {
    static DIR: OnceLock<(TempDir, PathBuf)> = OnceLock::new();
    let (_, path) = DIR.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("go");
        std::fs::write(&path, FAKE_GO).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, path)
    });
    path
}

/// Configuration pointing at the stand-in toolchain, with sandboxes under `root`.
pub fn test_config(root: &Path) -> PlaygroundConfigBuilder {
    PlaygroundConfig::builder()
        .go_binary(fake_go())
        .temp_root(root)
        .build_timeout(Duration::from_secs(10))
        .tidy_timeout(Duration::from_secs(10))
        .auto_tidy_timeout(Duration::from_secs(10))
}

/// Playground using the stand-in toolchain and the bundled allowlists.
pub fn test_playground(root: &Path) -> Playground {
    Playground::discover(test_config(root).build()).unwrap()
}

/// Number of entries directly under `root`.
pub fn entries(root: &Path) -> usize {
    std::fs::read_dir(root).unwrap().count()
}

/// A minimal module with a `main` package.
pub fn hello_archive() -> Archive {
    Archive::from_files([
        ("go.mod", "module m\n\ngo 1.22\n"),
        ("main.go", "package main\nfunc main(){}\n"),
    ])
    .unwrap()
}

/// [`hello_archive`] with `marker` appended to `main.go` as a comment.
pub fn marked_archive(marker: &str) -> Archive {
    Archive::from_files([
        ("go.mod", "module m\n\ngo 1.22\n".to_string()),
        (
            "main.go",
            format!("package main\n\n// {marker}\nfunc main(){{}}\n"),
        ),
    ])
    .unwrap()
}

/// An axum router served on a random localhost port until dropped.
pub struct TestHttpServer {
    base_url: Url,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestHttpServer {
    /// Spawn `router` on a random localhost port.
    pub async fn new(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test HTTP listener");
        let addr = listener.local_addr().expect("read test listener local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let server = axum::serve(listener, router).with_graceful_shutdown(async {
            shutdown_rx.await.ok();
        });
        tokio::spawn(async move {
            server.await.expect("run test HTTP server");
        });

        Self {
            base_url: Url::parse(&format!("http://{addr}")).expect("parse base URL"),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Base URL of the server.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join a path onto the base URL.
    pub fn url(&self, path: &str) -> Url {
        self.base_url.join(path).expect("join test URL")
    }
}

impl Drop for TestHttpServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Canned responses of the stand-in gist API, keyed by gist ID.
#[derive(Clone, Default)]
pub struct FakeGists {
    responses: HashMap<String, (StatusCode, Value)>,
    hits: Arc<AtomicUsize>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakeGists {
    /// Answer `id` with a public gist holding `files`.
    pub fn with_gist(self, id: &str, description: &str, files: &[(&str, &str)]) -> Self {
        let files: Map<String, Value> = files
            .iter()
            .map(|(name, content)| {
                (
                    name.to_string(),
                    json!({
                        "filename": name,
                        "content": content,
                        "truncated": false,
                    }),
                )
            })
            .collect();
        let body = json!({
            "id": id,
            "description": description,
            "public": true,
            "files": files,
        });
        self.with_response(id, StatusCode::OK, body)
    }

    /// Answer `id` with an arbitrary status and body.
    pub fn with_response(
        mut self,
        id: &str,
        status: StatusCode,
        body: Value,
    ) -> Self {
        self.responses.insert(id.to_string(), (status, body));
        self
    }

    /// Requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// `Authorization` header of every request received so far.
    pub fn authorization(&self) -> Vec<Option<String>> {
        self.authorization.lock().unwrap().clone()
    }

    /// Serve the canned responses at `/gists/{id}`.
    pub async fn serve(&self) -> TestHttpServer {
        let router = Router::new()
            .route("/gists/{id}", get(fake_gist))
            .with_state(self.clone());
        TestHttpServer::new(router).await
    }
}

async fn fake_gist(
    State(gists): State<FakeGists>,
    AxumPath(id): AxumPath<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    gists.hits.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    gists.authorization.lock().unwrap().push(auth);

    match gists.responses.get(&id) {
        Some((status, body)) => (*status, Json(body.clone())),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "Not Found"})),
        ),
    }
}
