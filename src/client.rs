//! Sending side: handshake, then stream the file body.

use crate::error::ClientError;
use crate::handshake::{decode_reply, encode_offer, FileOffer, OfferReply};
use crate::protocol::timeouts::{CONNECT_MS, REPLY_MS};
use crate::protocol::{BUFFER_SIZE, SEND_CHUNK};
use indicatif::ProgressBar;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// What the server made of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub server_file_name: String,
    pub copy: bool,
    pub bytes_sent: u64,
}

pub async fn connect(host: &str, port: u16) -> Result<TcpStream, ClientError> {
    let addr = format!("{}:{}", host, port);
    let stream = match timeout(Duration::from_millis(CONNECT_MS), TcpStream::connect(&addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(source)) => return Err(ClientError::ConnectionFailure { addr, source }),
        Err(_) => return Err(ClientError::Timeout(CONNECT_MS)),
    };
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

/// Send the offer and wait for the first complete reply.
pub async fn exchange_offer(
    stream: &mut TcpStream,
    offer: &FileOffer,
) -> Result<OfferReply, ClientError> {
    stream.write_all(&encode_offer(offer)).await?;

    let read_reply = async {
        let mut buf = Vec::with_capacity(BUFFER_SIZE);
        let mut chunk = [0u8; BUFFER_SIZE];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ClientError::Protocol(
                    "server closed the connection before replying".into(),
                ));
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(reply) = decode_reply(&buf)? {
                return Ok(reply);
            }
        }
    };
    match timeout(Duration::from_millis(REPLY_MS), read_reply).await {
        Ok(res) => res,
        Err(_) => Err(ClientError::Timeout(REPLY_MS)),
    }
}

/// Transfer `path` to `host:port`. The file is announced under its base name.
pub async fn send_file(
    path: &Path,
    host: &str,
    port: u16,
    progress: Option<&ProgressBar>,
) -> Result<SendReport, ClientError> {
    let meta = tokio::fs::metadata(path).await?;
    if !meta.is_file() {
        return Err(ClientError::InvalidArgument(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ClientError::InvalidArgument(format!("{} has no UTF-8 file name", path.display()))
        })?
        .to_string();
    let size = meta.len();

    let mut stream = connect(host, port).await?;
    let reply = exchange_offer(&mut stream, &FileOffer { file_name, size }).await?;
    if !reply.success {
        return Err(ClientError::Rejected(reply.message));
    }

    let bytes_sent = stream_body(&mut stream, path, size, progress).await?;
    // The server may already have closed its end after the last byte
    let _ = stream.shutdown().await;

    Ok(SendReport {
        server_file_name: reply.server_file_name,
        copy: reply.copy,
        bytes_sent,
    })
}

async fn stream_body(
    stream: &mut TcpStream,
    path: &Path,
    size: u64,
    progress: Option<&ProgressBar>,
) -> Result<u64, ClientError> {
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; SEND_CHUNK];
    let mut sent = 0u64;
    while sent < size {
        let want = (size - sent).min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(ClientError::Protocol(format!(
                "{} shrank to {} bytes while sending",
                path.display(),
                sent
            )));
        }
        stream.write_all(&buf[..n]).await?;
        sent += n as u64;
        if let Some(pb) = progress {
            pb.inc(n as u64);
        }
    }
    stream.flush().await?;
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::{decode_offer, encode_reply};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn rejected_offer_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; BUFFER_SIZE];
            let n = s.read(&mut buf).await.unwrap();
            let offer = decode_offer(&buf[..n]).unwrap().unwrap();
            assert_eq!(offer.file_name, "r.txt");
            assert_eq!(offer.size, 3);
            let reply = encode_reply(&OfferReply::rejected("disk full".into()));
            s.write_all(&reply).await.unwrap();
        });

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("r.txt");
        std::fs::write(&path, b"abc").unwrap();
        match send_file(&path, "127.0.0.1", port, None).await {
            Err(ClientError::Rejected(msg)) => assert_eq!(msg, "disk full"),
            other => panic!("expected rejection, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_hangup_before_reply_is_a_protocol_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; BUFFER_SIZE];
            let _ = s.read(&mut buf).await;
        });

        let mut stream = connect("127.0.0.1", port).await.unwrap();
        let offer = FileOffer {
            file_name: "x".into(),
            size: 1,
        };
        let res = exchange_offer(&mut stream, &offer).await;
        assert!(matches!(res, Err(ClientError::Protocol(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_names_the_address() {
        // Grab a port, then free it so nothing is listening there
        let port = {
            let sock = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            sock.local_addr().unwrap().port()
        };
        match connect("127.0.0.1", port).await {
            Err(ClientError::ConnectionFailure { addr, .. }) => {
                assert_eq!(addr, format!("127.0.0.1:{port}"))
            }
            other => panic!("expected connection failure, got {:?}", other.map(|_| ())),
        }
    }
}
