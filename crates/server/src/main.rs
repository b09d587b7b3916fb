// Copyright © 2026 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tiergate_core::config::Config;
use tiergate_server::handlers::ApiHandlers;
use tiergate_server::logging::init_logging;
use tiergate_server::shell::run_shell;
use tiergate_server::{build_services, create_metrics_router, create_router, Services};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

/// Hard ceiling for one HTTP exchange; per-operation deadlines are shorter.
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Parser)]
#[command(name = "tiergate", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "TIERGATE_CONFIG", default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API and the metrics endpoint (default)
    Serve,
    /// Read SET/GET/UNSET/NUMEQUALTO/END commands from stdin
    Shell,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(Some(&cli.config)).context("failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let _guard = init_logging(&config.logging, std::io::stdout())?;
            serve(config).await
        }
        Command::Shell => {
            // stdout carries command replies
            let _guard = init_logging(&config.logging, std::io::stderr())?;
            shell(config).await
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting tiergate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let http_addr = config.app.http_addr().await?;
    let metrics_addr = config.app.metrics_addr().await?;

    let Services {
        coordinator,
        monitor,
        metrics,
    } = build_services(&config).await?;
    let monitor_task = monitor.start();

    let handlers = Arc::new(ApiHandlers::new(coordinator));
    let router =
        create_router(handlers).layer(TimeoutLayer::new(Duration::from_secs(HTTP_TIMEOUT_SECS)));
    let metrics_router = create_metrics_router(metrics);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!("Starting HTTP server on {}", http_addr);
    let listener = TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("failed to bind {}", http_addr))?;
    info!("Starting metrics server on {}", metrics_addr);
    let metrics_listener = TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind {}", metrics_addr))?;

    let http_server =
        axum::serve(listener, router).with_graceful_shutdown(wait_for(shutdown_rx.clone()));
    let metrics_server = axum::serve(metrics_listener, metrics_router)
        .with_graceful_shutdown(wait_for(shutdown_rx));

    let served = tokio::try_join!(
        async { http_server.await.context("HTTP server error") },
        async { metrics_server.await.context("metrics server error") },
    );

    monitor.shutdown();
    if let Err(e) = monitor_task.await {
        error!("Health monitor task failed: {}", e);
    }

    served?;
    info!("Server shutdown complete");
    Ok(())
}

async fn shell(config: Config) -> Result<()> {
    let Services {
        coordinator,
        monitor,
        ..
    } = build_services(&config).await?;
    let monitor_task = monitor.start();

    let result = run_shell(
        &coordinator,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    monitor.shutdown();
    if let Err(e) = monitor_task.await {
        error!("Health monitor task failed: {}", e);
    }
    result
}

async fn wait_for(mut shutdown_rx: watch::Receiver<bool>) {
    // a dropped sender also means shut down
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
