//! Record protection: per-record nonces and sequence counters (RFC 8446 §5.3).

use log::trace;

use crate::crypto::key_schedule::{TrafficKeys, IV_LEN};
use crate::crypto::{Aead, CryptoProvider};
use crate::error::Error;

use super::record::{
    self, ContentType, Record, RecordHeader, MAX_PLAINTEXT_LEN, RECORD_HEADER_LEN, RECORD_VERSION,
};

/// Build a nonce for AEAD: iv XOR padded_sequence_number (RFC 8446 §5.3).
pub fn build_nonce(iv: &[u8; IV_LEN], seq: u64) -> [u8; IV_LEN] {
    let mut nonce = *iv;
    let seq_bytes = seq.to_be_bytes();
    // XOR the last 8 bytes of the IV with the sequence number
    for i in 0..8 {
        nonce[IV_LEN - 8 + i] ^= seq_bytes[i];
    }
    nonce
}

/// AAD for an encrypted record: the outer header, always typed
/// application_data with legacy version 0x0303.
fn outer_header(length: u16) -> [u8; RECORD_HEADER_LEN] {
    RecordHeader {
        content_type: ContentType::ApplicationData,
        legacy_version: RECORD_VERSION,
        length,
    }
    .to_bytes()
}

/// AEAD + IV + sequence counter for one direction.
pub struct DirectionalCipher<A: Aead> {
    aead: A,
    iv: [u8; IV_LEN],
    seq: u64,
}

impl<A: Aead> DirectionalCipher<A> {
    /// Build a cipher for a fresh key phase; the counter starts at zero.
    pub fn new<C>(provider: &C, keys: &TrafficKeys) -> Result<Self, Error>
    where
        C: CryptoProvider<Aead = A>,
    {
        Ok(Self {
            aead: provider.aead(&keys.key)?,
            iv: keys.iv,
            seq: 0,
        })
    }

    /// Number of records processed in this phase.
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    fn next_nonce(&mut self) -> Result<[u8; IV_LEN], Error> {
        let nonce = build_nonce(&self.iv, self.seq);
        self.seq = self.seq.checked_add(1).ok_or(Error::Crypto)?;
        Ok(nonce)
    }

    /// Encrypt `content` as one record: `17 03 03 len || AEAD(content || inner_ct)`.
    pub fn seal(&mut self, content: &[u8], inner_ct: ContentType) -> Result<Vec<u8>, Error> {
        if content.len() > MAX_PLAINTEXT_LEN {
            return Err(Error::RecordOverflow { length: content.len() });
        }
        let inner_len = content.len() + 1;
        let outer_len = inner_len + A::TAG_LEN;
        let header = outer_header(outer_len as u16);

        let mut out = Vec::with_capacity(RECORD_HEADER_LEN + outer_len);
        out.extend_from_slice(&header);
        record::encode_inner_plaintext(content, inner_ct, &mut out);
        out.resize(RECORD_HEADER_LEN + outer_len, 0);

        let seq = self.seq;
        let nonce = self.next_nonce()?;
        let sealed = self
            .aead
            .seal_in_place(&nonce, &header, &mut out[RECORD_HEADER_LEN..], inner_len)?;
        debug_assert_eq!(sealed, outer_len);
        trace!("sealed {inner_ct:?} record seq={seq} len={outer_len}");
        Ok(out)
    }

    /// Decrypt an application_data-typed record and split off its inner type.
    pub fn open(&mut self, record: &Record) -> Result<(ContentType, Vec<u8>), Error> {
        if record.content_type() != ContentType::ApplicationData {
            return Err(Error::Tls);
        }
        let mut buf = record.payload.clone();
        let header = outer_header(record.header.length);

        let seq = self.seq;
        let nonce = self.next_nonce()?;
        let ct_len = buf.len();
        let plain_len = self.aead.open_in_place(&nonce, &header, &mut buf, ct_len)?;
        let (content, inner_ct) = record::split_inner_plaintext(&buf[..plain_len])?;
        trace!("opened {inner_ct:?} record seq={seq} len={}", content.len());
        Ok((inner_ct, content.to_vec()))
    }
}

/// Installed record keys for both directions.
///
/// Empty until the handshake keys are installed; each
/// [`install`](Self::install) replaces both directions and restarts their
/// counters at zero.
pub struct RecordCipher<A: Aead> {
    send: Option<DirectionalCipher<A>>,
    recv: Option<DirectionalCipher<A>>,
}

impl<A: Aead> Default for RecordCipher<A> {
    fn default() -> Self {
        Self {
            send: None,
            recv: None,
        }
    }
}

impl<A: Aead> RecordCipher<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new key phase.
    pub fn install<C>(
        &mut self,
        provider: &C,
        send: &TrafficKeys,
        recv: &TrafficKeys,
    ) -> Result<(), Error>
    where
        C: CryptoProvider<Aead = A>,
    {
        self.send = Some(DirectionalCipher::new(provider, send)?);
        self.recv = Some(DirectionalCipher::new(provider, recv)?);
        Ok(())
    }

    pub fn is_installed(&self) -> bool {
        self.send.is_some() && self.recv.is_some()
    }

    pub fn send_sequence(&self) -> Option<u64> {
        self.send.as_ref().map(DirectionalCipher::sequence)
    }

    pub fn recv_sequence(&self) -> Option<u64> {
        self.recv.as_ref().map(DirectionalCipher::sequence)
    }

    pub fn seal(&mut self, content: &[u8], inner_ct: ContentType) -> Result<Vec<u8>, Error> {
        self.send
            .as_mut()
            .ok_or(Error::InvalidState)?
            .seal(content, inner_ct)
    }

    pub fn open(&mut self, record: &Record) -> Result<(ContentType, Vec<u8>), Error> {
        self.recv_mut()?.open(record)
    }

    pub fn recv_mut(&mut self) -> Result<&mut DirectionalCipher<A>, Error> {
        self.recv.as_mut().ok_or(Error::InvalidState)
    }

    /// Split into `(send, recv)` halves.
    pub fn into_split(self) -> Result<(DirectionalCipher<A>, DirectionalCipher<A>), Error> {
        match (self.send, self.recv) {
            (Some(send), Some(recv)) => Ok((send, recv)),
            _ => Err(Error::InvalidState),
        }
    }
}
