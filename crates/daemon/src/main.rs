// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! vigild: the checking engine daemon.

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vigil_daemon::{Config, Supervisor};

#[tokio::main]
async fn main() -> ExitCode {
    // The guard must outlive main so buffered file logs flush on exit.
    let _log_guard = init_tracing();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            return ExitCode::from(2);
        }
    };

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    info!(version = env!("CARGO_PKG_VERSION"), "vigild starting");
    match Supervisor::new(config).run(Vec::new(), shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "daemon failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_new(vigil_daemon::env::log_filter())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    match vigil_daemon::env::log_dir() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vigild.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, watching SIGINT only");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("signal received, shutting down");
        shutdown.cancel();
    });
}
