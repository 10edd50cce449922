use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use ferry::cli::DaemonOpts;
use ferry::config::ServerConfig;
use ferry::logger::{ConsoleLogger, Logger, NoopLogger, TeeLogger, TextLogger};
use ferry::server::Server;

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();
    let config = ServerConfig::from_opts(&opts)?;

    // Choose the sink once; NoopLogger keeps the hot path free when quiet
    let logger: Arc<dyn Logger> = match (&config.log_file, config.quiet) {
        (Some(path), true) => Arc::new(TextLogger::new(path)?),
        (Some(path), false) => Arc::new(TeeLogger::new(ConsoleLogger, TextLogger::new(path)?)),
        (None, true) => Arc::new(NoopLogger),
        (None, false) => Arc::new(ConsoleLogger),
    };

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    rt.block_on(async move {
        let server = Server::bind(config, logger).await?;
        server
            .run_until(shutdown_signal())
            .await
    })
}

// Ctrl-C everywhere, SIGTERM as well on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}
