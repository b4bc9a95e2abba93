//! HTTP server for the Go playground build sandbox.
//!
//! Run with: cargo run --bin playground-server -- --port 8080

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use wasm_go_playground_rs::prelude::*;
use wasm_go_playground_rs::server::{self, AppState};

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "playground-server", version, about = "Compile Go playground archives to WebAssembly")]
struct Cli {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    /// Path to the `go` binary; searched on PATH when omitted.
    #[arg(long, env = "GO_BINARY")]
    go_binary: Option<PathBuf>,

    /// Token for the GitHub gist API.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    /// Replacement module allowlist (newline-delimited).
    #[arg(long, env = "PLAYGROUND_MODULE_ALLOW_LIST", requires = "import_allow_list")]
    module_allow_list: Option<PathBuf>,

    /// Replacement import allowlist (newline-delimited).
    #[arg(long, env = "PLAYGROUND_IMPORT_ALLOW_LIST", requires = "module_allow_list")]
    import_allow_list: Option<PathBuf>,

    /// Directory in which sandbox directories are created.
    #[arg(long, env = "PLAYGROUND_TEMP_DIR")]
    temp_dir: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> PlaygroundConfig {
        let mut builder = PlaygroundConfig::builder();
        if let Some(go) = &self.go_binary {
            builder = builder.go_binary(go);
        }
        if let Some(token) = self.github_token.as_deref().filter(|t| !t.is_empty()) {
            builder = builder.github_token(token);
        }
        if let Some(dir) = &self.temp_dir {
            builder = builder.temp_root(dir);
        }
        builder.build()
    }

    fn allow_list(&self) -> Result<AllowList> {
        match (&self.module_allow_list, &self.import_allow_list) {
            (Some(modules), Some(imports)) => AllowList::from_files(modules, imports),
            _ => Ok(AllowList::bundled()),
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = cli.config();
    let toolchain = Toolchain::discover(&config).context("failed to locate the go toolchain")?;
    let allow_list = cli.allow_list().context("failed to load allowlists")?;
    let gists = GistClient::from_config(&config).context("failed to create gist client")?;
    let playground = Playground::new(config, toolchain, allow_list);

    match playground.go_version().await {
        Ok(version) => tracing::info!(%version, go = %playground.toolchain().go().display(), "go toolchain ready"),
        Err(e) => tracing::warn!(error = %e, "could not read go version"),
    }

    let addr = SocketAddr::new(cli.host, cli.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    server::serve(listener, AppState::new(playground, gists), shutdown_signal())
        .await
        .context("server error")
}
