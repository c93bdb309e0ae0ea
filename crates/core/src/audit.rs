//! Request log constants and the integrity hash chain.
//!
//! Every request log entry carries a SHA-256 hash over the previous entry's
//! hash and its own canonical content, so tampering with a stored row
//! breaks the chain from that point on.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::DbId;

/// Log type shared by every entry written by this extension.
pub const LOG_TYPE: &str = "importdump";

/// Known actions for request log entries.
pub mod actions {
    /// A new request was submitted.
    pub const REQUEST: &str = "request";
    /// A request changed status.
    pub const STATUS_UPDATE: &str = "statusupdate";
    /// An interwiki prefix was assigned.
    pub const INTERWIKI: &str = "interwiki";
    /// The requester or a reviewer changed the request content.
    pub const EDIT: &str = "edit";

    pub const ALL: &[&str] = &[REQUEST, STATUS_UPDATE, INTERWIKI, EDIT];
}

/// Known seed value for the first entry in the hash chain.
const CHAIN_SEED: &str = "IMPORTDUMP_LOG_CHAIN_SEED_V1";

/// Compute the SHA-256 integrity hash for a log entry.
///
/// `prev_hash` is the `integrity_hash` of the previous entry, or `None` for
/// the first entry in the chain.
pub fn compute_integrity_hash(prev_hash: Option<&str>, entry_data: &str) -> String {
    let prev = prev_hash.unwrap_or(CHAIN_SEED);
    let combined = format!("{prev}|{entry_data}");
    format!("{:x}", Sha256::digest(combined.as_bytes()))
}

/// Canonical content of a log entry, serialized to JSON before hashing.
#[derive(Debug, Serialize)]
pub struct LogEntryData<'a> {
    pub log_type: &'a str,
    pub action: &'a str,
    pub performer_id: DbId,
    pub request_id: DbId,
    pub comment: &'a str,
    pub params: &'a serde_json::Value,
}

impl LogEntryData<'_> {
    pub fn canonical(&self) -> String {
        // Field order is fixed by the struct, so the output is stable.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Recompute a chain and return the index of the first entry whose stored
/// hash does not match, if any.
pub fn verify_chain<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<usize> {
    let mut prev: Option<&str> = None;
    for (index, (data, stored)) in entries.into_iter().enumerate() {
        if compute_integrity_hash(prev, data) != stored {
            return Some(index);
        }
        prev = Some(stored);
    }
    None
}
