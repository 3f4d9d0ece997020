use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use mapfabric_core::{Worker, WorkerConfig};
use mapfabric_worker::cli::{Args, LogLevel};
use mapfabric_worker::engine::{Engine, EngineContext};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_level);

    info!("Starting mapfabric-worker v{}", mapfabric_core::VERSION);

    let engine = Engine::new(EngineContext::new(&args.data_root), args.svg_paths());
    let worker = Worker::new(WorkerConfig::new(&args.redis_url), Arc::new(engine));

    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received termination signal, finishing current job before exit");
        shutdown.cancel();
    });

    worker.run().await;

    Ok(())
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level.as_filter()))
        .init();
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Could not install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
