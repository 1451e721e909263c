//! TLS 1.3 key schedule (RFC 8446 section 7.1), SHA-384 without PSK.
//!
//! ```text
//!             0
//!             |
//!             v
//!     0  ->  HKDF-Extract = Early Secret
//!             |
//!             v
//!   ECDHE -> HKDF-Extract = Handshake Secret
//!             |
//!             +-> Expand-Label(., "c hs traffic", CH..SH)
//!             +-> Expand-Label(., "s hs traffic", CH..SH)
//!             |
//!             v
//!     0  ->  HKDF-Extract = Master Secret
//!             |
//!             +-> Expand-Label(., "c ap traffic", CH..SF)
//!             +-> Expand-Label(., "s ap traffic", CH..SF)
//! ```
//!
//! Every value derived here fits in one HMAC-SHA-384 block, so
//! [`expand_label`] computes a single `T(1)` instead of running the
//! iterative HKDF-Expand.

use zeroize::Zeroize;

use crate::crypto::{CryptoProvider, HASH_LEN};
use crate::error::Error;

/// AEAD key length for TLS_AES_256_GCM_SHA384.
pub const KEY_LEN: usize = 32;

/// Record IV length.
pub const IV_LEN: usize = 12;

/// Upper bound on the encoded HkdfLabel structure.
const MAX_LABEL_INFO: usize = 128;

/// HKDF-Expand-Label restricted to one output block.
///
/// Constructs the HkdfLabel structure:
///   uint16 length = out.len()
///   opaque label<7..255> = "tls13 " + label
///   opaque context<0..255> = context
/// followed by the block counter `0x01`, and writes the first `out.len()`
/// bytes of HMAC(secret, HkdfLabel || 0x01) into `out`.
pub fn expand_label<C: CryptoProvider>(
    provider: &C,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    out: &mut [u8],
) -> Result<(), Error> {
    if out.len() > HASH_LEN {
        return Err(Error::Crypto);
    }
    let tls13_prefix = b"tls13 ";
    let full_label_len = tls13_prefix.len() + label.len();
    if full_label_len > u8::MAX as usize || context.len() > u8::MAX as usize {
        return Err(Error::Crypto);
    }

    let mut info: heapless::Vec<u8, MAX_LABEL_INFO> = heapless::Vec::new();
    let out_len = out.len() as u16;
    let fits = info.extend_from_slice(&out_len.to_be_bytes()).is_ok()
        && info.push(full_label_len as u8).is_ok()
        && info.extend_from_slice(tls13_prefix).is_ok()
        && info.extend_from_slice(label).is_ok()
        && info.push(context.len() as u8).is_ok()
        && info.extend_from_slice(context).is_ok()
        && info.push(1).is_ok();
    if !fits {
        return Err(Error::Crypto);
    }

    let block = provider.hmac_sign(secret, &info)?;
    out.copy_from_slice(&block[..out.len()]);
    Ok(())
}

/// AEAD key and IV for one direction of one key phase.
#[derive(Clone, PartialEq, Eq)]
pub struct TrafficKeys {
    pub key: [u8; KEY_LEN],
    pub iv: [u8; IV_LEN],
}

impl core::fmt::Debug for TrafficKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("TrafficKeys { .. }")
    }
}

impl Drop for TrafficKeys {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

/// Expand a traffic secret into its record key (`"key"`) and IV (`"iv"`).
pub fn derive_traffic_keys<C: CryptoProvider>(
    provider: &C,
    traffic_secret: &[u8],
) -> Result<TrafficKeys, Error> {
    let mut keys = TrafficKeys {
        key: [0u8; KEY_LEN],
        iv: [0u8; IV_LEN],
    };
    expand_label(provider, traffic_secret, b"key", &[], &mut keys.key)?;
    expand_label(provider, traffic_secret, b"iv", &[], &mut keys.iv)?;
    Ok(keys)
}

/// Which secrets the schedule currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPhase {
    /// Only the early secret; no traffic secrets yet.
    Early,
    /// Handshake secret plus `c/s hs traffic`.
    Handshake,
    /// Master secret plus `c/s ap traffic`.
    Application,
}

/// TLS 1.3 key schedule state.
///
/// Holds the rolling secret (early, handshake, then master) and the two
/// traffic secrets of the current phase. Moving to the next phase overwrites
/// the previous material.
pub struct KeySchedule {
    phase: KeyPhase,
    secret: [u8; HASH_LEN],
    client_traffic: [u8; HASH_LEN],
    server_traffic: [u8; HASH_LEN],
}

impl KeySchedule {
    /// Initialize with no PSK: Early Secret = HKDF-Extract(salt=0, ikm=0).
    pub fn new<C: CryptoProvider>(provider: &C) -> Result<Self, Error> {
        let zeros = [0u8; HASH_LEN];
        let secret = provider.hmac_sign(&zeros, &zeros)?;
        Ok(Self {
            phase: KeyPhase::Early,
            secret,
            client_traffic: [0u8; HASH_LEN],
            server_traffic: [0u8; HASH_LEN],
        })
    }

    pub fn phase(&self) -> KeyPhase {
        self.phase
    }

    /// Client traffic secret of the current phase.
    pub fn client_traffic_secret(&self) -> Option<&[u8; HASH_LEN]> {
        match self.phase {
            KeyPhase::Early => None,
            _ => Some(&self.client_traffic),
        }
    }

    /// Server traffic secret of the current phase.
    pub fn server_traffic_secret(&self) -> Option<&[u8; HASH_LEN]> {
        match self.phase {
            KeyPhase::Early => None,
            _ => Some(&self.server_traffic),
        }
    }

    /// Expand-Label(secret, "derived", SHA-384("")): the salt for the next
    /// extract step.
    pub fn derived_secret<C: CryptoProvider>(&self, provider: &C) -> Result<[u8; HASH_LEN], Error> {
        let empty_hash = provider.sha384_digest(&[]);
        let mut salt = [0u8; HASH_LEN];
        expand_label(provider, &self.secret, b"derived", &empty_hash, &mut salt)?;
        Ok(salt)
    }

    /// Early → Handshake.
    ///
    /// `transcript_digest` is the hash of ClientHello..ServerHello.
    pub fn install_handshake_secrets<C: CryptoProvider>(
        &mut self,
        provider: &C,
        shared_secret: &[u8],
        transcript_digest: &[u8; HASH_LEN],
    ) -> Result<(), Error> {
        if self.phase != KeyPhase::Early {
            return Err(Error::InvalidState);
        }
        let mut salt = self.derived_secret(provider)?;
        let handshake_secret = provider.hmac_sign(&salt, shared_secret);
        salt.zeroize();
        self.replace_secret(handshake_secret?);
        self.derive_traffic_secrets(provider, b"c hs traffic", b"s hs traffic", transcript_digest)?;
        self.phase = KeyPhase::Handshake;
        Ok(())
    }

    /// Handshake → Application.
    ///
    /// `transcript_digest` is the hash of ClientHello..server Finished.
    pub fn install_application_secrets<C: CryptoProvider>(
        &mut self,
        provider: &C,
        transcript_digest: &[u8; HASH_LEN],
    ) -> Result<(), Error> {
        if self.phase != KeyPhase::Handshake {
            return Err(Error::InvalidState);
        }
        let mut salt = self.derived_secret(provider)?;
        let master_secret = provider.hmac_sign(&salt, &[0u8; HASH_LEN]);
        salt.zeroize();
        self.replace_secret(master_secret?);
        self.derive_traffic_secrets(provider, b"c ap traffic", b"s ap traffic", transcript_digest)?;
        self.phase = KeyPhase::Application;
        Ok(())
    }

    /// Record keys for the client → server direction of the current phase.
    pub fn client_keys<C: CryptoProvider>(&self, provider: &C) -> Result<TrafficKeys, Error> {
        let secret = self.client_traffic_secret().ok_or(Error::InvalidState)?;
        derive_traffic_keys(provider, secret)
    }

    /// Record keys for the server → client direction of the current phase.
    pub fn server_keys<C: CryptoProvider>(&self, provider: &C) -> Result<TrafficKeys, Error> {
        let secret = self.server_traffic_secret().ok_or(Error::InvalidState)?;
        derive_traffic_keys(provider, secret)
    }

    /// verify_data for the client Finished message.
    ///
    /// finished_key = Expand-Label(client_handshake_traffic_secret, "finished", "", 48)
    /// verify_data  = HMAC(finished_key, transcript_digest)
    pub fn client_finished_verify_data<C: CryptoProvider>(
        &self,
        provider: &C,
        transcript_digest: &[u8; HASH_LEN],
    ) -> Result<[u8; HASH_LEN], Error> {
        if self.phase != KeyPhase::Handshake {
            return Err(Error::InvalidState);
        }
        let mut finished_key = [0u8; HASH_LEN];
        expand_label(provider, &self.client_traffic, b"finished", &[], &mut finished_key)?;
        let verify_data = provider.hmac_sign(&finished_key, transcript_digest);
        finished_key.zeroize();
        verify_data
    }

    fn replace_secret(&mut self, secret: [u8; HASH_LEN]) {
        self.secret.zeroize();
        self.secret = secret;
    }

    fn derive_traffic_secrets<C: CryptoProvider>(
        &mut self,
        provider: &C,
        client_label: &[u8],
        server_label: &[u8],
        transcript_digest: &[u8; HASH_LEN],
    ) -> Result<(), Error> {
        expand_label(provider, &self.secret, client_label, transcript_digest, &mut self.client_traffic)?;
        expand_label(provider, &self.secret, server_label, transcript_digest, &mut self.server_traffic)?;
        Ok(())
    }
}

impl Drop for KeySchedule {
    fn drop(&mut self) {
        self.secret.zeroize();
        self.client_traffic.zeroize();
        self.server_traffic.zeroize();
    }
}
