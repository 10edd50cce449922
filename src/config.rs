//! Daemon configuration: defaults, optional TOML file, command-line overrides.

use crate::cli::DaemonOpts;
use crate::protocol::{timeouts, DEFAULT_BIND, DEFAULT_DATA_DIR, DEFAULT_META_DIR, JOURNAL_FILE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (host:port)
    pub bind: String,
    /// Where received files are written
    pub data_dir: PathBuf,
    /// Where name counters and the transfer journal live
    pub meta_dir: PathBuf,
    /// Evict sessions idle this long (seconds); 0 disables
    pub idle_timeout_secs: u64,
    /// Append a line per finished transfer to `<meta_dir>/transfers.jsonl`
    pub journal: bool,
    /// Optional plain-text event log
    pub log_file: Option<PathBuf>,
    /// Suppress console event lines
    pub quiet: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            meta_dir: PathBuf::from(DEFAULT_META_DIR),
            idle_timeout_secs: timeouts::IDLE_SECS,
            journal: true,
            log_file: None,
            quiet: false,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let cfg: ServerConfig = toml::from_str(&data)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(cfg)
    }

    /// Start from the config file (if any) and apply explicit flags on top.
    pub fn from_opts(opts: &DaemonOpts) -> Result<Self> {
        let mut cfg = match &opts.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(bind) = &opts.bind {
            cfg.bind = bind.clone();
        }
        if let Some(dir) = &opts.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(dir) = &opts.meta_dir {
            cfg.meta_dir = dir.clone();
        }
        if let Some(secs) = opts.idle_timeout {
            cfg.idle_timeout_secs = secs;
        }
        if opts.no_journal {
            cfg.journal = false;
        }
        if let Some(p) = &opts.log_file {
            cfg.log_file = Some(p.clone());
        }
        if opts.quiet {
            cfg.quiet = true;
        }
        Ok(cfg)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn journal_path(&self) -> PathBuf {
        self.meta_dir.join(JOURNAL_FILE)
    }
}
