//! Shared protocol constants for the ferry handshake and byte stream

// Largest single receive, and the cap on an undecoded handshake request
pub const BUFFER_SIZE: usize = 2048;

// Client read size when streaming the file body
pub const SEND_CHUNK: usize = 64 * 1024;

// Consecutive empty reads tolerated before a transmitting peer is evicted
pub const MAX_EMPTY_READS: u32 = 10;

// Longest file name accepted in a handshake (bytes)
pub const MAX_FILE_NAME_LEN: usize = 255;

pub const DEFAULT_BIND: &str = "0.0.0.0:8800";
pub const DEFAULT_DATA_DIR: &str = "./server_files";
pub const DEFAULT_META_DIR: &str = "./server_meta";

// Counter records are `<meta_dir>/<requested name>.meta`
pub const META_SUFFIX: &str = ".meta";

// Transfer journal inside the metadata directory
pub const JOURNAL_FILE: &str = "transfers.jsonl";

pub const ACCEPT_MESSAGE: &str = "ready to receive";

// Centralized timeouts shared by the daemon and the client
pub mod timeouts {
    // Client connection establishment (ms)
    pub const CONNECT_MS: u64 = 5_000;

    // Client wait for the handshake reply (ms)
    pub const REPLY_MS: u64 = 10_000;

    // Default idle eviction for server sessions (s); 0 disables
    pub const IDLE_SECS: u64 = 300;

    // How often the multiplexer sweeps for idle sessions (ms)
    pub const SWEEP_MS: u64 = 1_000;

    // Progress tick interval for the client bar (ms)
    pub const PROGRESS_TICK_MS: u64 = 250;
}
