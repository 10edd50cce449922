//! Readiness multiplexer: the single owner of every live session.
//!
//! One task waits until any watched socket is ready in the direction its
//! session expects, then dispatches exactly one action per ready socket.
//! New connections arrive from the acceptor over the registration channel.

use crate::error::SessionError;
use crate::ledger::NameLedger;
use crate::log::{TransferLog, TransferLogEntry};
use crate::logger::Logger;
use crate::protocol::timeouts::SWEEP_MS;
use crate::session::{Session, SessionContext, Step};
use std::collections::HashMap;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::Poll;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// A freshly accepted connection handed over by the acceptor.
pub struct Registration {
    pub stream: TcpStream,
    pub session: Session,
}

struct Connection {
    stream: TcpStream,
    session: Session,
}

enum Event {
    Registered(Option<Registration>),
    Ready(Vec<SocketAddr>),
    Sweep,
}

pub struct Multiplexer {
    connections: HashMap<SocketAddr, Connection>,
    registrations: mpsc::UnboundedReceiver<Registration>,
    ledger: Arc<NameLedger>,
    data_dir: PathBuf,
    logger: Arc<dyn Logger>,
    journal: Option<TransferLog>,
    idle_timeout: Option<Duration>,
}

impl Multiplexer {
    pub fn new(
        registrations: mpsc::UnboundedReceiver<Registration>,
        ledger: Arc<NameLedger>,
        data_dir: PathBuf,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            connections: HashMap::new(),
            registrations,
            ledger,
            data_dir,
            logger,
            journal: None,
            idle_timeout: None,
        }
    }

    pub fn with_journal(mut self, journal: TransferLog) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Run until the registration channel closes and every session is gone.
    pub async fn run(mut self) {
        let period = Duration::from_millis(SWEEP_MS);
        let period = self.idle_timeout.map_or(period, |t| t.min(period));
        let mut sweep = tokio::time::interval(period.max(Duration::from_millis(10)));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut accepting = true;

        loop {
            if !accepting && self.connections.is_empty() {
                return;
            }
            let event = tokio::select! {
                reg = self.registrations.recv(), if accepting => Event::Registered(reg),
                ready = wait_ready(&self.connections) => Event::Ready(ready),
                _ = sweep.tick(), if self.idle_timeout.is_some() => Event::Sweep,
            };
            match event {
                Event::Registered(Some(reg)) => self.register(reg),
                Event::Registered(None) => accepting = false,
                Event::Ready(ready) => {
                    for peer in ready {
                        self.dispatch(peer);
                    }
                }
                Event::Sweep => self.evict_idle(Instant::now()),
            }
        }
    }

    fn register(&mut self, reg: Registration) {
        let peer = reg.session.peer();
        // A reused peer address means the old socket is gone for good
        if let Some(stale) = self.connections.remove(&peer) {
            let reused = io::Error::new(io::ErrorKind::ConnectionAborted, "peer address reused");
            self.teardown(stale, Err(reused.into()));
        }
        self.connections.insert(
            peer,
            Connection {
                stream: reg.stream,
                session: reg.session,
            },
        );
    }

    fn dispatch(&mut self, peer: SocketAddr) {
        let ctx = SessionContext {
            ledger: &self.ledger,
            data_dir: &self.data_dir,
        };
        let Some(conn) = self.connections.get_mut(&peer) else {
            return;
        };
        let result = if conn.session.expects_read() {
            conn.session.on_readable(&conn.stream, &ctx)
        } else {
            conn.session.on_writable(&conn.stream)
        };

        match result {
            Ok(Step::Continue) => {}
            Ok(Step::Accepted) => {
                let s = &conn.session;
                self.logger.accepted(
                    peer,
                    s.requested_name().unwrap_or_default(),
                    s.assigned_name().unwrap_or_default(),
                    s.expected_size(),
                );
            }
            Ok(Step::EmptyRead { retries_left }) => self.logger.empty_read(peer, retries_left),
            Ok(Step::Complete) => {
                if let Some(conn) = self.connections.remove(&peer) {
                    self.teardown(conn, Ok(()));
                }
            }
            Err(err) => {
                if let Some(conn) = self.connections.remove(&peer) {
                    self.teardown(conn, Err(err));
                }
            }
        }
    }

    fn evict_idle(&mut self, now: Instant) {
        let Some(limit) = self.idle_timeout else {
            return;
        };
        let idle: Vec<SocketAddr> = self
            .connections
            .iter()
            .filter(|(_, c)| c.session.idle_for(now) > limit)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in idle {
            if let Some(conn) = self.connections.remove(&peer) {
                self.teardown(conn, Err(SessionError::IdleTimeout(limit)));
            }
        }
    }

    // The connection is already out of the table; dropping it closes the socket.
    fn teardown(&self, mut conn: Connection, outcome: Result<(), SessionError>) {
        let peer = conn.session.peer();
        if let Err(err) = &outcome {
            if let Some(reply) = conn.session.rejection(err) {
                // Best effort: the client may already be gone
                let _ = conn.stream.try_write(&reply);
            }
        }
        if !conn.session.close(outcome.as_ref().map(|_| ())) {
            return;
        }

        match &outcome {
            Ok(()) => self.logger.completed(
                peer,
                conn.session.assigned_name().unwrap_or_default(),
                conn.session.received_bytes(),
            ),
            Err(err) if err.is_eviction() => self.logger.evicted(peer, &err.to_string()),
            Err(err) => self.logger.failed(peer, &err.to_string()),
        }
        if let Some(journal) = &self.journal {
            let entry = TransferLogEntry::from_session(&conn.session, outcome.as_ref().map(|_| ()));
            if let Err(e) = journal.add_entry(&entry) {
                self.logger.error("journal", &e.to_string());
            }
        }
        self.logger.disconnected(peer);
    }
}

/// Resolve once at least one connection is ready in the direction its session
/// expects. Readiness in the other direction is never polled, so it is ignored.
async fn wait_ready(connections: &HashMap<SocketAddr, Connection>) -> Vec<SocketAddr> {
    poll_fn(|cx| {
        let mut ready = Vec::new();
        for (peer, conn) in connections {
            let poll = if conn.session.expects_read() {
                conn.stream.poll_read_ready(cx)
            } else {
                conn.stream.poll_write_ready(cx)
            };
            // Errors are surfaced by the dispatched read/write itself
            if poll.is_ready() {
                ready.push(*peer);
            }
        }
        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(ready)
        }
    })
    .await
}
