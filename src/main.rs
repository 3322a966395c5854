// src/main.rs
use crate::config::AppConfig;
use crate::connectors::rest::RestClient;
use crate::connectors::stream::{ConnectionManager, WsConnector};
use crate::connectors::traits::DashboardApi;
use crate::core::popout::{PopoutBridge, PopoutTarget, ProcessSurfaceFactory};
use crate::core::session::Session;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod config;
mod connectors;
mod core;
mod error;
mod tui;
mod types;
mod utils;

/// Терминал занят TUI, поэтому логи пишутся в файл.
fn init_logging(log_dir: &str, popout: bool) -> WorkerGuard {
    let prefix = if popout {
        "trade_desk-popout.log"
    } else {
        "trade_desk.log"
    };
    let file_appender = tracing_appender::rolling::daily(log_dir, prefix);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Configuration
    let config = AppConfig::new()?;

    // Popout: единственный аргумент = локатор поверхности
    let scope = match std::env::args().nth(1) {
        Some(locator) => Some(PopoutTarget::parse(&locator, &config.popout)?),
        None => None,
    };

    let _log_guard = init_logging(&config.log_dir, scope.is_some());
    info!(
        "Trade desk starting (api: {}, stream: {}, scope: {:?})",
        config.api_base, config.stream_url, scope
    );

    // 2. Components
    let api: Arc<dyn DashboardApi> = Arc::new(RestClient::new(config.api_base.clone())?);
    let factory = ProcessSurfaceFactory::new(config.popout.launcher.clone())?;
    let popouts = PopoutBridge::new(Box::new(factory), config.popout.clone());

    // 3. Channels
    let (event_tx, event_rx) = mpsc::channel(1024);
    let cancel = CancellationToken::new();

    // 4. Stream
    let manager = ConnectionManager::new(
        WsConnector,
        config.stream_url.clone(),
        config.reconnect_delay(),
        event_tx.clone(),
    );
    let stream_task = tokio::spawn(manager.run(cancel.clone()));

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received");
            signal_cancel.cancel();
        }
    });

    // 5. Run UI
    let session = Session::new(&config, api, popouts, scope, event_tx);
    let result = tui::run(
        session,
        event_rx,
        Duration::from_millis(config.ui.frame_interval_ms),
        cancel.clone(),
    )
    .await;

    cancel.cancel();
    if let Err(e) = stream_task.await {
        tracing::error!("Stream task failed: {}", e);
    }
    info!("Trade desk stopped");

    result
}
