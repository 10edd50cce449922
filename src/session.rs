//! Per-connection state machine for the receiving daemon.
//!
//! A session never owns its socket; the multiplexer passes a [`Channel`] into
//! every step so the machine can be driven by scripted channels in tests.
//!
//! ```text
//! AwaitingMetadata --read--> MetadataAccepted --write--> Transmitting --read--> Closed
//!        \______________________ any error _______________________/--> Failed
//! ```

use crate::error::SessionError;
use crate::handshake::{self, OfferReply};
use crate::ledger::NameLedger;
use crate::protocol::{ACCEPT_MESSAGE, BUFFER_SIZE, MAX_EMPTY_READS};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingMetadata,
    MetadataAccepted,
    Transmitting,
    Closed,
    Failed,
}

/// Whether a state waits on the peer (read) or on us (write).
pub fn expects_read(state: SessionState) -> bool {
    match state {
        SessionState::AwaitingMetadata | SessionState::Transmitting => true,
        SessionState::MetadataAccepted => false,
        SessionState::Closed | SessionState::Failed => false,
    }
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Non-blocking socket operations a session step needs.
pub trait Channel {
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn try_send(&self, buf: &[u8]) -> io::Result<usize>;
}

impl Channel for tokio::net::TcpStream {
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.try_read(buf)
    }
    fn try_send(&self, buf: &[u8]) -> io::Result<usize> {
        self.try_write(buf)
    }
}

/// Shared collaborators a session consults during the handshake.
pub struct SessionContext<'a> {
    pub ledger: &'a NameLedger,
    pub data_dir: &'a Path,
}

/// Result of one dispatched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Nothing observable happened (including spurious readiness).
    Continue,
    /// The handshake was accepted and the acknowledgment staged.
    Accepted,
    /// The peer sent nothing; this many further empty reads are tolerated.
    EmptyRead { retries_left: u32 },
    /// All declared bytes were written; the session should be torn down.
    Complete,
}

struct Destination {
    file: File,
    path: PathBuf,
}

pub struct Session {
    peer: SocketAddr,
    transfer_id: Uuid,
    state: SessionState,
    pending_inbound: Vec<u8>,
    pending_outbound: Vec<u8>,
    destination: Option<Destination>,
    requested_name: Option<String>,
    assigned_name: Option<String>,
    expected_size: u64,
    received_bytes: u64,
    consecutive_empty_reads: u32,
    last_activity: Instant,
}

impl Session {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            transfer_id: Uuid::new_v4(),
            state: SessionState::AwaitingMetadata,
            pending_inbound: Vec::new(),
            pending_outbound: Vec::new(),
            destination: None,
            requested_name: None,
            assigned_name: None,
            expected_size: 0,
            received_bytes: 0,
            consecutive_empty_reads: 0,
            last_activity: Instant::now(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
    pub fn transfer_id(&self) -> Uuid {
        self.transfer_id
    }
    pub fn state(&self) -> SessionState {
        self.state
    }
    pub fn expects_read(&self) -> bool {
        expects_read(self.state)
    }
    pub fn requested_name(&self) -> Option<&str> {
        self.requested_name.as_deref()
    }
    pub fn assigned_name(&self) -> Option<&str> {
        self.assigned_name.as_deref()
    }
    pub fn destination_path(&self) -> Option<&Path> {
        self.destination.as_ref().map(|d| d.path.as_path())
    }
    pub fn expected_size(&self) -> u64 {
        self.expected_size
    }
    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }
    pub fn consecutive_empty_reads(&self) -> u32 {
        self.consecutive_empty_reads
    }
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// Handle read readiness. Only meaningful when [`Session::expects_read`] holds;
    /// in any other state it is a no-op.
    pub fn on_readable<C: Channel>(
        &mut self,
        chan: &C,
        ctx: &SessionContext<'_>,
    ) -> Result<Step, SessionError> {
        match self.state {
            SessionState::AwaitingMetadata => self.read_metadata(chan, ctx),
            SessionState::Transmitting => self.read_chunk(chan),
            _ => Ok(Step::Continue),
        }
    }

    /// Handle write readiness. Only the MetadataAccepted state writes.
    pub fn on_writable<C: Channel>(&mut self, chan: &C) -> Result<Step, SessionError> {
        if self.state != SessionState::MetadataAccepted {
            return Ok(Step::Continue);
        }
        let sent = match chan.try_send(&self.pending_outbound) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Step::Continue),
            Err(e) => return Err(e.into()),
        };
        self.pending_outbound.drain(..sent);
        self.last_activity = Instant::now();
        if !self.pending_outbound.is_empty() {
            return Ok(Step::Continue);
        }
        self.state = SessionState::Transmitting;
        if self.received_bytes >= self.expected_size {
            return Ok(Step::Complete);
        }
        Ok(Step::Continue)
    }

    fn read_metadata<C: Channel>(
        &mut self,
        chan: &C,
        ctx: &SessionContext<'_>,
    ) -> Result<Step, SessionError> {
        let mut buf = [0u8; BUFFER_SIZE];
        let n = match chan.try_recv(&mut buf) {
            Ok(0) => return Err(SessionError::ClosedBeforeHandshake),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Step::Continue),
            Err(e) => return Err(e.into()),
        };
        self.last_activity = Instant::now();
        self.pending_inbound.extend_from_slice(&buf[..n]);

        let Some(offer) = handshake::decode_offer(&self.pending_inbound)? else {
            return Ok(Step::Continue);
        };
        self.pending_inbound = Vec::new();
        handshake::validate_file_name(&offer.file_name)?;

        let resolution = ctx.ledger.resolve(&offer.file_name)?;
        let path = ctx.data_dir.join(&resolution.assigned_name);
        // Never clobber a file that is already there, even one placed out-of-band
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| SessionError::Destination {
                path: path.clone(),
                source,
            })?;

        let reply = OfferReply::accepted(
            resolution.assigned_name.clone(),
            resolution.was_copy,
            ACCEPT_MESSAGE,
        );
        self.pending_outbound = handshake::encode_reply(&reply);
        self.destination = Some(Destination { file, path });
        self.requested_name = Some(offer.file_name);
        self.assigned_name = Some(resolution.assigned_name);
        self.expected_size = offer.size;
        self.state = SessionState::MetadataAccepted;
        Ok(Step::Accepted)
    }

    fn read_chunk<C: Channel>(&mut self, chan: &C) -> Result<Step, SessionError> {
        let mut buf = [0u8; BUFFER_SIZE];
        let n = match chan.try_recv(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Step::Continue),
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            self.consecutive_empty_reads += 1;
            if self.consecutive_empty_reads > MAX_EMPTY_READS {
                return Err(SessionError::StalledPeer(self.consecutive_empty_reads));
            }
            return Ok(Step::EmptyRead {
                retries_left: MAX_EMPTY_READS + 1 - self.consecutive_empty_reads,
            });
        }
        self.consecutive_empty_reads = 0;
        self.last_activity = Instant::now();

        // Anything past the declared size is dropped
        let remaining = self.expected_size.saturating_sub(self.received_bytes);
        let take = (n as u64).min(remaining) as usize;
        if let Some(dest) = self.destination.as_mut() {
            dest.file
                .write_all(&buf[..take])
                .map_err(|source| SessionError::Destination {
                    path: dest.path.clone(),
                    source,
                })?;
        }
        self.received_bytes += take as u64;

        if self.received_bytes >= self.expected_size {
            Ok(Step::Complete)
        } else {
            Ok(Step::Continue)
        }
    }

    /// The reply to send when a handshake fails, if the session is still at the
    /// point where the client waits for one.
    pub fn rejection(&self, err: &SessionError) -> Option<Vec<u8>> {
        if self.state != SessionState::AwaitingMetadata {
            return None;
        }
        Some(handshake::encode_reply(&OfferReply::rejected(err.to_string())))
    }

    /// Move to a terminal state and close the destination file.
    ///
    /// Returns false if the session was already terminal, so callers can report
    /// each teardown exactly once.
    pub fn close(&mut self, outcome: Result<(), &SessionError>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if let Some(mut dest) = self.destination.take() {
            let _ = dest.file.flush();
        }
        self.pending_outbound.clear();
        self.pending_inbound.clear();
        self.state = match outcome {
            Ok(()) => SessionState::Closed,
            Err(e) if e.is_eviction() => SessionState::Closed,
            Err(_) => SessionState::Failed,
        };
        true
    }
}
