use nodebeat::AgentBuilder;
use nodebeat::Error;
use nodebeat::Result;
use nodebeat::Settings;
use std::path::Path;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // Initializing Logs
    let _guard = init_observability(settings.node.log_dir.as_deref())?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    // Build Agent
    let agent = AgentBuilder::new(settings, graceful_rx).build().await?;

    info!("Application started. Waiting for CTRL+C signal...");
    // Listen on Shutdown Signal
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    // Run Agent; a setup failure (registration, first watch open) must
    // surface in the exit code
    if let Err(e) = agent.run().await {
        error!("agent stops: {:?}", e);
        return Err(e);
    }

    println!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| Error::Fatal(format!("signal handler: {e}")))?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| Error::Fatal(format!("signal handler: {e}")))?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

/// Logs to a file under `log_dir` when configured, stdout otherwise.
fn init_observability(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "nodebeat.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let base_subscriber = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::from_default_env());
            tracing_subscriber::registry().with(base_subscriber).init();
            Ok(Some(guard))
        }
        None => {
            let base_subscriber = tracing_subscriber::fmt::layer()
                .with_filter(EnvFilter::from_default_env());
            tracing_subscriber::registry().with(base_subscriber).init();
            Ok(None)
        }
    }
}
