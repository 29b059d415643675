//! Commander Companion - Main Entry Point
//!
//! Keeps a live view of the commander in sync with the companion API and
//! the game's real-time events.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::watch;
use tracing::{info, warn};

use commander_companion_lib::{
    config::CompanionConfig,
    dispatcher::LoggingObserver,
    logging,
    monitor::JsonLinesMonitor,
    session::{SessionClient, SessionState},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CompanionConfig::from_env();
    logging::init(&config.log_dir());
    info!("Commander Companion starting...");

    config.validate().map_err(anyhow::Error::msg)?;
    let app = AppState::build(config).context("Failed to set up companion services")?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    if let Err(e) = bring_up(&app.session, &mut stdin).await {
        warn!("Companion API unavailable, continuing with events only: {:#}", e);
    }

    app.dispatcher.activate(Arc::new(LoggingObserver)).await;

    if app.session.state() == SessionState::Ready {
        app.synchronizer.refresh_profile().await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh_task = app.config.refresh_interval().map(|period| {
        let synchronizer = app.synchronizer.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { synchronizer.run_refresh_loop(period, shutdown).await })
    });

    let monitor = JsonLinesMonitor::new(app.synchronizer.clone());
    let mut monitor_task = match &app.config.events_file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event file {}", path.display()))?;
            info!("Reading events from {}", path.display());
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { monitor.run(BufReader::new(file), shutdown).await })
        }
        None => {
            info!("Reading events from stdin");
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { monitor.run(stdin, shutdown).await })
        }
    };

    let monitor_finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            false
        }
        result = &mut monitor_task => {
            match result {
                Ok(Ok(stats)) => info!(events = stats.events, "Event source finished"),
                Ok(Err(e)) => warn!("Event source failed: {}", e),
                Err(e) => warn!("Event monitor task failed: {}", e),
            }
            true
        }
    };

    let _ = shutdown_tx.send(true);
    if !monitor_finished {
        let _ = monitor_task.await;
    }
    if let Some(task) = refresh_task {
        let _ = task.await;
    }

    app.dispatcher.stop_all().await;
    info!("Commander Companion stopped");
    Ok(())
}

/// Log in and confirm as far as the stored credentials allow
async fn bring_up(session: &SessionClient, stdin: &mut BufReader<Stdin>) -> anyhow::Result<()> {
    if session.state() == SessionState::NeedsLogin {
        if !session.has_login() {
            match (
                std::env::var("COMPANION_EMAIL"),
                std::env::var("COMPANION_PASSWORD"),
            ) {
                (Ok(email), Ok(password)) => session.set_login(&email, &password),
                _ => {
                    warn!("No companion API login stored; set COMPANION_EMAIL and COMPANION_PASSWORD");
                    return Ok(());
                }
            }
        }
        session.login().await?;
    }

    if session.state() == SessionState::NeedsConfirmation {
        let code = match std::env::var("COMPANION_CONFIRM_CODE") {
            Ok(code) => code,
            Err(_) => {
                eprintln!("Enter the confirmation code sent to your email:");
                let mut line = String::new();
                stdin
                    .read_line(&mut line)
                    .await
                    .context("Failed to read confirmation code")?;
                line
            }
        };
        session.confirm(code.trim()).await?;
    }

    info!("Companion session {}", session.state());
    Ok(())
}
