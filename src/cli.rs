//! Command-line surfaces for `ferry` (client) and `ferryd` (daemon)

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// Receive files from ferry clients
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct DaemonOpts {
    /// Bind address (host:port) [default: 0.0.0.0:8800]
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory for received files [default: ./server_files]
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for name counters and the transfer journal [default: ./server_meta]
    #[arg(long)]
    pub meta_dir: Option<PathBuf>,

    /// Evict sessions idle for this many seconds (0 = never) [default: 300]
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Do not write the transfer journal
    #[arg(long)]
    pub no_journal: bool,

    /// Also append events to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// No console event output
    #[arg(short, long)]
    pub quiet: bool,

    /// TOML config file; flags given here override it
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Send one file to a ferry daemon
#[derive(Clone, Debug, Parser)]
#[command(author, version, about)]
pub struct ClientOpts {
    /// Path to the file to send
    #[arg(value_parser = existing_file)]
    pub file_path: PathBuf,

    /// IP address or host name of the server
    #[arg(value_parser = valid_host)]
    pub host: String,

    /// Port of the server
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,
}

fn existing_file(s: &str) -> Result<PathBuf, String> {
    let p = PathBuf::from(s);
    if !p.is_file() {
        return Err("File does not exist or file path is wrong".to_string());
    }
    Ok(p)
}

fn valid_host(s: &str) -> Result<String, String> {
    if is_valid_host(s) {
        Ok(s.to_string())
    } else {
        Err("Not a valid host name".to_string())
    }
}

/// An IP literal or an RFC 1123 host name.
pub fn is_valid_host(s: &str) -> bool {
    if s.parse::<IpAddr>().is_ok() {
        return true;
    }
    if s.is_empty() || s.len() > 253 {
        return false;
    }
    s.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
