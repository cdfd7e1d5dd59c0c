#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::Context;

mod api;
mod config;
mod startup;
mod stack;
mod state;

async fn app() -> anyhow::Result<()> {
  let config = config::core_config();
  logger::init(&config.logging)?;

  info!("ZaneOps Compose Stack Core v{}", env!("CARGO_PKG_VERSION"));

  // Init every collaborator eagerly so a misconfiguration panics at
  // startup rather than on the first request that happens to need it.
  state::db_client().await;
  state::orchestrator();
  state::proxy();
  state::workflow_engine();
  state::log_store();

  startup::on_startup().await;

  let router = api::app();
  let addr = format!("0.0.0.0:{}", config.http_port);
  let socket_addr =
    SocketAddr::from_str(&addr).context("failed to parse listen address")?;
  let listener = tokio::net::TcpListener::bind(socket_addr)
    .await
    .with_context(|| format!("failed to bind {socket_addr}"))?;

  info!("ZaneOps Compose Stack Core listening on http://{socket_addr}");
  axum::serve(listener, router)
    .await
    .context("server exited")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let mut term_signal =
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
  tokio::select! {
    res = tokio::spawn(app()) => res?,
    _ = term_signal.recv() => Ok(()),
  }
}
