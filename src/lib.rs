//! Ferry: single-file TCP transfer
//!
//! The daemon accepts connections on a separate task and hands each one to a
//! readiness-driven multiplexer that steps a per-connection session through
//! handshake, acknowledgment and byte streaming. Colliding names are resolved
//! through a persistent per-name counter (`report.txt` -> `report_copy1.txt`).

pub mod acceptor;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod handshake;
pub mod ledger;
pub mod log;
pub mod logger;
pub mod mux;
pub mod progress;
pub mod protocol;
pub mod server;
pub mod session;
