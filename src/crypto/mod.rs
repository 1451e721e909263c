//! Cryptographic traits and implementations for TLS record protection.
//!
//! The handshake needs four primitives: P-256 key agreement, HMAC-SHA-384,
//! SHA-384 and AES-256-GCM. The [`CryptoProvider`] trait bundles them so the
//! state machine never names a concrete algorithm; only one suite is ever
//! used, so the provider fixes it at compile time.

mod aead;

#[cfg(feature = "rustcrypto")]
pub mod rustcrypto;

pub mod key_schedule;

pub use aead::Aead;

use crate::error::Error;

/// SHA-384 output length, and the length of every TLS secret used here.
pub const HASH_LEN: usize = 48;

/// Uncompressed SEC1 encoding of a P-256 point (`0x04 || x || y`).
pub const P256_PUBLIC_KEY_LEN: usize = 65;

/// X-coordinate of the ECDH shared point.
pub const SHARED_SECRET_LEN: usize = 32;

/// Bundle of cryptographic primitives needed by the TLS client.
pub trait CryptoProvider {
    type Aead: Aead;
    type KeyPair;

    /// Generate a fresh ephemeral P-256 key pair.
    fn ecdh_generate_key_pair(&self) -> Result<Self::KeyPair, Error>;

    /// Rebuild a key pair from a 32-byte private scalar.
    fn ecdh_key_pair_from_secret(&self, secret: &[u8; 32]) -> Result<Self::KeyPair, Error>;

    /// Uncompressed public point of `key_pair`.
    fn ecdh_public_key(&self, key_pair: &Self::KeyPair) -> [u8; P256_PUBLIC_KEY_LEN];

    /// Shared secret between our key pair and the peer's uncompressed point.
    fn ecdh_derive_shared_secret(
        &self,
        key_pair: &Self::KeyPair,
        peer_public: &[u8],
    ) -> Result<[u8; SHARED_SECRET_LEN], Error>;

    /// HMAC-SHA-384 of `message` under `key`.
    fn hmac_sign(&self, key: &[u8], message: &[u8]) -> Result<[u8; HASH_LEN], Error>;

    /// SHA-384 of `data`.
    fn sha384_digest(&self, data: &[u8]) -> [u8; HASH_LEN];

    /// Create an AEAD instance from a raw key.
    fn aead(&self, key: &[u8]) -> Result<Self::Aead, Error>;
}
