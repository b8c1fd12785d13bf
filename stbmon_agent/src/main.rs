//! stbmon_agent: serves live set-top-box stats over HTTP, SSE and WebSocket,
//! and sends threshold alerts to Telegram.

use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stbmon_agent::alerts::AlertEngine;
use stbmon_agent::cli::{default_port, parse_args, ArgsError, USAGE};
use stbmon_agent::config::ConfigStore;
use stbmon_agent::http::router;
use stbmon_agent::notify::notifier_from_env;
use stbmon_agent::sampler::{prime, spawn_sampler};
use stbmon_agent::sensors::SystemSensors;
use stbmon_agent::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = match parse_args(std::env::args(), default_port()) {
        Ok(a) => a,
        Err(ArgsError::Help) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stbmon_agent=info")),
        )
        .init();

    let store = ConfigStore::discover(args.config);
    let config = store.load();
    info!(
        alerts = config.alerts_enabled,
        interval = ?config.poll_interval(),
        "configuration ready"
    );

    let state = AppState::new(config, Box::new(SystemSensors::new()), store);
    prime(&state).await;
    let sampler = spawn_sampler(state.clone(), AlertEngine::new(notifier_from_env()));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, host = %state.hostname, "stbmon_agent listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("http server")?;

    sampler.abort();
    Ok(())
}
