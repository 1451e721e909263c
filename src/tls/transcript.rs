//! Handshake transcript for TLS 1.3.
//!
//! Keeps the raw bytes of every handshake message in order. Digests at the
//! key-schedule milestones are SHA-384 over everything appended so far.

use crate::crypto::{CryptoProvider, HASH_LEN};

/// Append-only record of handshake message bytes.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    bytes: Vec<u8>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one complete handshake message (header included).
    pub fn update(&mut self, message: &[u8]) {
        self.bytes.extend_from_slice(message);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// SHA-384 of the transcript so far; the transcript is not consumed.
    pub fn current_hash<C: CryptoProvider>(&self, provider: &C) -> [u8; HASH_LEN] {
        provider.sha384_digest(&self.bytes)
    }
}
