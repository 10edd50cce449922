use anyhow::Result;
use chrono::Utc;
use crossterm::style::Stylize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;

/// Sink for daemon events. Every method defaults to a no-op.
pub trait Logger: Send + Sync {
    fn listening(&self, _addr: SocketAddr, _data_dir: &Path) {}
    fn connected(&self, _peer: SocketAddr) {}
    fn accepted(&self, _peer: SocketAddr, _requested: &str, _assigned: &str, _size: u64) {}
    fn empty_read(&self, _peer: SocketAddr, _retries_left: u32) {}
    fn completed(&self, _peer: SocketAddr, _assigned: &str, _bytes: u64) {}
    fn evicted(&self, _peer: SocketAddr, _reason: &str) {}
    fn failed(&self, _peer: SocketAddr, _msg: &str) {}
    fn disconnected(&self, _peer: SocketAddr) {}
    fn error(&self, _context: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Colored one-line-per-event console output.
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn listening(&self, addr: SocketAddr, data_dir: &Path) {
        println!(
            "{}",
            format!("Listening on {} (files in {})", addr, data_dir.display()).green().bold()
        );
    }
    fn connected(&self, peer: SocketAddr) {
        println!("{}", format!("[+] {peer} - Connected").green().bold());
    }
    fn accepted(&self, peer: SocketAddr, requested: &str, assigned: &str, size: u64) {
        println!(
            "{}",
            format!("[i] {peer} - New file: {requested}:{assigned} ({size} bytes)")
                .green()
                .bold()
        );
    }
    fn empty_read(&self, peer: SocketAddr, retries_left: u32) {
        println!(
            "{}",
            format!("[!] {peer} - data packet is empty; retries left {retries_left}")
                .red()
                .bold()
        );
    }
    fn completed(&self, peer: SocketAddr, assigned: &str, bytes: u64) {
        println!(
            "{}",
            format!("[i] {peer} - Received {assigned} ({bytes} bytes)").green().bold()
        );
    }
    fn evicted(&self, peer: SocketAddr, reason: &str) {
        println!("{}", format!("[!] {peer} - Evicted: {reason}").yellow().bold());
    }
    fn failed(&self, peer: SocketAddr, msg: &str) {
        eprintln!("{}", format!("[!] {peer} - Failed: {msg}").red().bold());
    }
    fn disconnected(&self, peer: SocketAddr) {
        println!("{}", format!("[-] {peer} - Disconnected").green().bold());
    }
    fn error(&self, context: &str, msg: &str) {
        eprintln!("{}", format!("[!] {context}: {msg}").red().bold());
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn listening(&self, addr: SocketAddr, data_dir: &Path) {
        self.line(&format!("LISTEN addr={} data={}", addr, data_dir.display()));
    }
    fn connected(&self, peer: SocketAddr) {
        self.line(&format!("CONNECT peer={peer}"));
    }
    fn accepted(&self, peer: SocketAddr, requested: &str, assigned: &str, size: u64) {
        self.line(&format!(
            "ACCEPT peer={} requested={} assigned={} size={}",
            peer, requested, assigned, size
        ));
    }
    fn empty_read(&self, peer: SocketAddr, retries_left: u32) {
        self.line(&format!("EMPTY peer={peer} retries_left={retries_left}"));
    }
    fn completed(&self, peer: SocketAddr, assigned: &str, bytes: u64) {
        self.line(&format!("DONE peer={peer} file={assigned} bytes={bytes}"));
    }
    fn evicted(&self, peer: SocketAddr, reason: &str) {
        self.line(&format!("EVICT peer={peer} reason={reason}"));
    }
    fn failed(&self, peer: SocketAddr, msg: &str) {
        self.line(&format!("FAIL peer={peer} msg={msg}"));
    }
    fn disconnected(&self, peer: SocketAddr) {
        self.line(&format!("CLOSE peer={peer}"));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={context} msg={msg}"));
    }
}

/// Forwards every event to two loggers, e.g. console plus log file.
pub struct TeeLogger<A, B> {
    first: A,
    second: B,
}

impl<A: Logger, B: Logger> TeeLogger<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Logger, B: Logger> Logger for TeeLogger<A, B> {
    fn listening(&self, addr: SocketAddr, data_dir: &Path) {
        self.first.listening(addr, data_dir);
        self.second.listening(addr, data_dir);
    }
    fn connected(&self, peer: SocketAddr) {
        self.first.connected(peer);
        self.second.connected(peer);
    }
    fn accepted(&self, peer: SocketAddr, requested: &str, assigned: &str, size: u64) {
        self.first.accepted(peer, requested, assigned, size);
        self.second.accepted(peer, requested, assigned, size);
    }
    fn empty_read(&self, peer: SocketAddr, retries_left: u32) {
        self.first.empty_read(peer, retries_left);
        self.second.empty_read(peer, retries_left);
    }
    fn completed(&self, peer: SocketAddr, assigned: &str, bytes: u64) {
        self.first.completed(peer, assigned, bytes);
        self.second.completed(peer, assigned, bytes);
    }
    fn evicted(&self, peer: SocketAddr, reason: &str) {
        self.first.evicted(peer, reason);
        self.second.evicted(peer, reason);
    }
    fn failed(&self, peer: SocketAddr, msg: &str) {
        self.first.failed(peer, msg);
        self.second.failed(peer, msg);
    }
    fn disconnected(&self, peer: SocketAddr) {
        self.first.disconnected(peer);
        self.second.disconnected(peer);
    }
    fn error(&self, context: &str, msg: &str) {
        self.first.error(context, msg);
        self.second.error(context, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_logger_writes_timestamped_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs/ferryd.log");
        let logger = TextLogger::new(&path).unwrap();
        let peer: SocketAddr = "10.0.0.2:5000".parse().unwrap();
        logger.connected(peer);
        logger.completed(peer, "a_copy1.txt", 42);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("CONNECT peer=10.0.0.2:5000"));
        assert!(lines[1].ends_with("DONE peer=10.0.0.2:5000 file=a_copy1.txt bytes=42"));
    }

    #[test]
    fn tee_logger_reaches_both_sinks() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.log");
        let b = tmp.path().join("b.log");
        let tee = TeeLogger::new(TextLogger::new(&a).unwrap(), TextLogger::new(&b).unwrap());
        tee.evicted("127.0.0.1:1".parse().unwrap(), "stalled");
        for p in [a, b] {
            assert!(std::fs::read_to_string(p).unwrap().contains("EVICT"));
        }
    }
}
