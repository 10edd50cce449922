//! Accept loop feeding the multiplexer.

use crate::logger::Logger;
use crate::mux::Registration;
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub struct Acceptor {
    listener: TcpListener,
    registrations: mpsc::UnboundedSender<Registration>,
    logger: Arc<dyn Logger>,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        registrations: mpsc::UnboundedSender<Registration>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            listener,
            registrations,
            logger,
        }
    }

    /// Accept until the multiplexer goes away. Accept errors (e.g. EMFILE) are
    /// logged and retried after a short pause.
    pub async fn run(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    self.logger.error("accept", &e.to_string());
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            let _ = stream.set_nodelay(true);
            self.logger.connected(peer);
            let reg = Registration {
                stream,
                session: Session::new(peer),
            };
            if self.registrations.send(reg).is_err() {
                return;
            }
        }
    }
}
