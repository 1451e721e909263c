use crate::error::Error;

/// Authenticated Encryption with Associated Data.
///
/// Protects TLS record payloads. The only implementation in this crate is
/// AES-256-GCM.
pub trait Aead {
    /// Key length in bytes.
    const KEY_LEN: usize;
    /// Nonce length in bytes (always 12 for TLS 1.3).
    const NONCE_LEN: usize;
    /// Authentication tag length in bytes (always 16 for TLS 1.3).
    const TAG_LEN: usize;

    /// Encrypt in place.
    ///
    /// `buf[..payload_len]` contains the plaintext. The buffer must have
    /// room for the authentication tag (`buf.len() >= payload_len + TAG_LEN`).
    ///
    /// Returns the total length of ciphertext + tag.
    fn seal_in_place(
        &self,
        nonce: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        payload_len: usize,
    ) -> Result<usize, Error>;

    /// Decrypt in place.
    ///
    /// `buf[..ciphertext_len]` contains ciphertext + authentication tag.
    /// A tag mismatch is reported as [`Error::DecryptFailed`] and leaves no
    /// usable plaintext behind.
    ///
    /// Returns the plaintext length on success.
    fn open_in_place(
        &self,
        nonce: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        ciphertext_len: usize,
    ) -> Result<usize, Error>;
}
