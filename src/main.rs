use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use loki_mcp::client::LokiClient;
use loki_mcp::config::{Config, ServerMode};
use loki_mcp::http::serve_http;
use loki_mcp::mcp::run_stdio;
use loki_mcp::tools::LokiTools;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries JSON-RPC, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match env::args().nth(1) {
        Some(path) => Config::load_from_path(Path::new(&path))
            .with_context(|| format!("failed to load config from {path}"))?
            .with_env()?,
        None => Config::from_env()?,
    };
    info!(loki = ?config.loki, mode = ?config.server.mode, "starting loki-mcp");

    let client = LokiClient::new(&config.loki).context("failed to create Loki client")?;
    let tools = Arc::new(LokiTools::new(client));

    let run = async move {
        match config.server.mode {
            ServerMode::Stdio => run_stdio(tools).await,
            ServerMode::Http => serve_http(tools, &config.server).await,
            ServerMode::Both => {
                let http_tools = tools.clone();
                let server = config.server.clone();
                let http_task = tokio::spawn(async move {
                    if let Err(e) = serve_http(http_tools, &server).await {
                        error!(error = %e, "HTTP server stopped");
                    }
                });
                let res = run_stdio(tools).await;
                http_task.abort();
                res
            }
        }
    };

    tokio::select! {
        res = run => res?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }
    Ok(())
}
