//! Cache entry identity and on-disk framing.
//!
//! Entries are keyed by request identity (method + full URL, query included)
//! and stored as a single blob: a little-endian u32 header length, a JSON
//! header carrying the identity/status/headers, then the raw body bytes.
//! Entries are always written and read as whole blobs.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::fetch::OriginResponse;

/// Request identity: the cache key for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    method: String,
    url: String,
}

impl RequestKey {
    /// Build a key from a method and an absolute URL.
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// The canonical identity string.
    pub fn identity(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Entry file name: hex SHA-256 of the identity.
    pub fn file_name(&self) -> String {
        let digest = Sha256::digest(self.identity().as_bytes());
        format!("{}.entry", hex::encode(digest))
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// JSON header preceding the body in an entry blob.
#[derive(Debug, Serialize, Deserialize)]
struct EntryHeader {
    /// Identity string, kept to detect hash collisions and stray files.
    key: String,
    status: u16,
    headers: Vec<(String, String)>,
}

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("entry truncated ({0} bytes)")]
    Truncated(usize),

    #[error("entry header invalid: {0}")]
    Header(#[from] serde_json::Error),

    #[error("entry key mismatch: expected {expected:?}, found {found:?}")]
    KeyMismatch { expected: String, found: String },
}

/// Serialize a response into an entry blob.
pub fn encode(key: &RequestKey, response: &OriginResponse) -> Result<Vec<u8>, EntryError> {
    let header = EntryHeader {
        key: key.identity(),
        status: response.status,
        headers: response.headers.clone(),
    };
    let header_bytes = serde_json::to_vec(&header)?;

    let mut blob = Vec::with_capacity(4 + header_bytes.len() + response.body.len());
    blob.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    blob.extend_from_slice(&header_bytes);
    blob.extend_from_slice(&response.body);
    Ok(blob)
}

/// Deserialize an entry blob, verifying it belongs to the expected key.
pub fn decode(key: &RequestKey, blob: &[u8]) -> Result<OriginResponse, EntryError> {
    if blob.len() < 4 {
        return Err(EntryError::Truncated(blob.len()));
    }
    let header_len = u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
    if blob.len() < 4 + header_len {
        return Err(EntryError::Truncated(blob.len()));
    }

    let header: EntryHeader = serde_json::from_slice(&blob[4..4 + header_len])?;
    if header.key != key.identity() {
        return Err(EntryError::KeyMismatch {
            expected: key.identity(),
            found: header.key,
        });
    }

    Ok(OriginResponse {
        status: header.status,
        headers: header.headers,
        body: Bytes::copy_from_slice(&blob[4 + header_len..]),
    })
}
