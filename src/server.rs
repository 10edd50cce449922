//! Daemon wiring: bind, spawn the acceptor, drive the multiplexer.

use crate::acceptor::Acceptor;
use crate::config::ServerConfig;
use crate::ledger::NameLedger;
use crate::log::TransferLog;
use crate::logger::Logger;
use crate::mux::Multiplexer;
use anyhow::{Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    ledger: Arc<NameLedger>,
    logger: Arc<dyn Logger>,
}

// Keeps the acceptor task tied to the lifetime of `Server::run`
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Server {
    /// Create the storage directories and bind the listener. Failures here are
    /// fatal for the daemon.
    pub async fn bind(config: ServerConfig, logger: Arc<dyn Logger>) -> Result<Self> {
        ensure_dir_exists(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.data_dir.display())
        })?;
        ensure_dir_exists(&config.meta_dir).with_context(|| {
            format!("Failed to create metadata directory {}", config.meta_dir.display())
        })?;
        let listener = TcpListener::bind(&config.bind)
            .await
            .with_context(|| format!("bind {}", config.bind))?;
        let ledger = Arc::new(NameLedger::new(&config.meta_dir));
        Ok(Self {
            listener,
            config,
            ledger,
            logger,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process ends.
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        self.logger.listening(addr, &self.config.data_dir);

        let (tx, rx) = mpsc::unbounded_channel();
        let acceptor = Acceptor::new(self.listener, tx, Arc::clone(&self.logger));
        let _acceptor = AbortOnDrop(tokio::spawn(acceptor.run()));

        let mut mux = Multiplexer::new(
            rx,
            self.ledger,
            self.config.data_dir.clone(),
            self.logger,
        )
        .with_idle_timeout(self.config.idle_timeout());
        if self.config.journal {
            mux = mux.with_journal(TransferLog::new(&self.config.journal_path()));
        }
        mux.run().await;
        Ok(())
    }

    /// Serve until `shutdown` resolves. In-flight sessions are dropped, which
    /// closes their files and sockets.
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        tokio::select! {
            res = self.run() => res,
            _ = shutdown => Ok(()),
        }
    }
}

/// Create directory with parent creation
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
