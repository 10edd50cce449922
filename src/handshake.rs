//! Handshake codec shared by the daemon and the client.
//!
//! The wire format is a bare JSON object in each direction with no length prefix.
//! Both sides accumulate received bytes and call the `decode_*` functions until a
//! complete object parses; `Ok(None)` means "keep reading".

use crate::error::HandshakeError;
use crate::protocol::{BUFFER_SIZE, MAX_FILE_NAME_LEN};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Client → server: the file about to be streamed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileOffer {
    pub file_name: String,
    pub size: u64,
}

/// Server → client: the answer to a [`FileOffer`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OfferReply {
    pub success: bool,
    /// True when `server_file_name` differs from the requested name.
    pub copy: bool,
    pub server_file_name: String,
    pub message: String,
}

impl OfferReply {
    pub fn accepted(server_file_name: String, copy: bool, message: &str) -> Self {
        Self {
            success: true,
            copy,
            server_file_name,
            message: message.to_string(),
        }
    }

    pub fn rejected(message: String) -> Self {
        Self {
            success: false,
            copy: false,
            server_file_name: String::new(),
            message,
        }
    }
}

pub fn encode_offer(offer: &FileOffer) -> Vec<u8> {
    // Serializing plain strings and integers cannot fail
    serde_json::to_vec(offer).unwrap_or_default()
}

pub fn encode_reply(reply: &OfferReply) -> Vec<u8> {
    serde_json::to_vec(reply).unwrap_or_default()
}

pub fn decode_offer(buf: &[u8]) -> Result<Option<FileOffer>, HandshakeError> {
    decode_partial(buf)
}

pub fn decode_reply(buf: &[u8]) -> Result<Option<OfferReply>, HandshakeError> {
    decode_partial(buf)
}

fn decode_partial<T: DeserializeOwned>(buf: &[u8]) -> Result<Option<T>, HandshakeError> {
    match serde_json::from_slice::<T>(buf) {
        Ok(msg) => Ok(Some(msg)),
        Err(e) if e.is_eof() => {
            if buf.len() >= BUFFER_SIZE {
                Err(HandshakeError::TooLarge { limit: BUFFER_SIZE })
            } else {
                Ok(None)
            }
        }
        Err(e) => Err(HandshakeError::Decode(e)),
    }
}

/// Check that a requested name is a bare file name that cannot leave the data
/// directory: no separators, no NUL, not `.` or `..`, and not over-long.
pub fn validate_file_name(name: &str) -> Result<(), HandshakeError> {
    let reject = |reason| {
        Err(HandshakeError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return reject("empty");
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return reject("too long");
    }
    if name.contains('\0') {
        return reject("contains NUL byte");
    }
    if name.contains('/') || name.contains('\\') {
        return reject("contains a path separator");
    }
    if name == "." || name == ".." {
        return reject("refers to a directory");
    }
    // On Windows, ':' would address an alternate data stream
    #[cfg(windows)]
    if name.contains(':') {
        return reject("contains colon");
    }
    Ok(())
}
