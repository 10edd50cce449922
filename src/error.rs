//! Error types for the ferry daemon and client.
//!
//! Session errors never escape the multiplexer: each one tears down the session
//! that produced it and is reported through the logger. Only startup failures
//! (bad arguments, bind/listen) reach the process exit code.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the handshake codec.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The bytes are not a single JSON object of the expected shape.
    #[error("undecodable handshake: {0}")]
    Decode(#[from] serde_json::Error),

    /// The request grew past the receive buffer without completing.
    #[error("handshake exceeds {limit} bytes without completing")]
    TooLarge { limit: usize },

    /// The requested name is not a bare file name.
    #[error("invalid file name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// Failures of the persistent name counter store.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("cannot read counter record {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    /// The record exists but does not hold a decimal count. It is left untouched.
    #[error("counter record {path} is corrupt: {content:?}")]
    Corrupt { path: PathBuf, content: String },

    #[error("cannot write counter record {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Everything that can end a server session other than normal completion.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("malformed handshake: {0}")]
    MalformedHandshake(#[from] HandshakeError),

    #[error("peer closed the connection before sending metadata")]
    ClosedBeforeHandshake,

    #[error("peer stalled after {0} consecutive empty reads")]
    StalledPeer(u32),

    #[error("idle for more than {0:?}")]
    IdleTimeout(Duration),

    #[error("persistent store failure: {0}")]
    PersistentStoreFailure(#[from] LedgerError),

    #[error("cannot open destination {path}: {source}")]
    Destination { path: PathBuf, source: io::Error },

    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Evictions close the session without being reported as hard errors.
    pub fn is_eviction(&self) -> bool {
        matches!(self, SessionError::StalledPeer(_) | SessionError::IdleTimeout(_))
    }
}

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connection to {addr} failed: {source}")]
    ConnectionFailure { addr: String, source: io::Error },

    #[error("server rejected the transfer: {0}")]
    Rejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evictions_are_not_hard_errors() {
        assert!(SessionError::StalledPeer(11).is_eviction());
        assert!(SessionError::IdleTimeout(Duration::from_secs(5)).is_eviction());
        assert!(!SessionError::ClosedBeforeHandshake.is_eviction());
        let io = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(!SessionError::from(io).is_eviction());
    }

    #[test]
    fn store_failure_message_names_the_record() {
        let err = SessionError::from(LedgerError::Corrupt {
            path: PathBuf::from("/meta/a.txt.meta"),
            content: "x".into(),
        });
        let msg = err.to_string();
        assert!(msg.starts_with("persistent store failure"));
        assert!(msg.contains("a.txt.meta"));
    }
}
