//! TLS 1.3 handshake message encoding and decoding.
//!
//! Handshake message format:
//!   HandshakeType (1 byte)
//!   Length (3 bytes, big-endian)
//!   Body (Length bytes)

use crate::crypto::{HASH_LEN, P256_PUBLIC_KEY_LEN};
use crate::error::Error;
use crate::tls::extensions::{self, CLIENT_HELLO_EXTENSIONS_LEN};

/// TLS handshake message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateVerify = 15,
    Finished = 20,
}

impl HandshakeType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::ClientHello),
            2 => Some(Self::ServerHello),
            4 => Some(Self::NewSessionTicket),
            8 => Some(Self::EncryptedExtensions),
            11 => Some(Self::Certificate),
            15 => Some(Self::CertificateVerify),
            20 => Some(Self::Finished),
            _ => None,
        }
    }
}

/// TLS_AES_256_GCM_SHA384, the only suite offered.
pub const CIPHER_SUITE_AES_256_GCM_SHA384: u16 = 0x1302;

/// Version written in the ClientHello body.
pub const CLIENT_HELLO_VERSION: u16 = 0x0304;

pub const HANDSHAKE_HEADER_LEN: usize = 4;

/// ClientHello body: version, random, empty session id, one suite, null
/// compression, extensions.
const CLIENT_HELLO_BODY_LEN: usize = 2 + 32 + 1 + 2 + 2 + 2 + 2 + CLIENT_HELLO_EXTENSIONS_LEN;

/// Encoded ClientHello handshake message, header included.
pub const CLIENT_HELLO_LEN: usize = HANDSHAKE_HEADER_LEN + CLIENT_HELLO_BODY_LEN;

/// Largest handshake message accepted from the peer.
pub const MAX_HANDSHAKE_MESSAGE_LEN: usize = 1 << 17;

/// Parsed ServerHello message.
#[derive(Debug)]
pub struct ServerHello<'a> {
    pub random: &'a [u8; 32],
    pub session_id: &'a [u8],
    pub cipher_suite: u16,
    pub extensions: &'a [u8],
}

/// Write the 4-byte handshake header (type + 3-byte length).
fn write_handshake_header(
    msg_type: HandshakeType,
    body_len: usize,
    out: &mut [u8],
) -> Result<(), Error> {
    if out.len() < HANDSHAKE_HEADER_LEN {
        return Err(Error::BufferTooSmall {
            needed: HANDSHAKE_HEADER_LEN,
        });
    }
    out[0] = msg_type as u8;
    let len = body_len as u32;
    out[1] = ((len >> 16) & 0xFF) as u8;
    out[2] = ((len >> 8) & 0xFF) as u8;
    out[3] = (len & 0xFF) as u8;
    Ok(())
}

/// Read the handshake header: returns (type_byte, body_length).
pub fn read_handshake_header(data: &[u8]) -> Result<(u8, usize), Error> {
    if data.len() < HANDSHAKE_HEADER_LEN {
        return Err(Error::Tls);
    }
    let msg_type = data[0];
    let length = ((data[1] as usize) << 16) | ((data[2] as usize) << 8) | (data[3] as usize);
    Ok((msg_type, length))
}

/// Encode the fixed ClientHello message.
///
/// Format:
///   - ProtocolVersion: 0x0304
///   - Random: 32 bytes
///   - SessionID: empty
///   - CipherSuites: [0x1302]
///   - CompressionMethods: [0]
///   - Extensions: supported_groups, signature_algorithms,
///     supported_versions, key_share
pub fn encode_client_hello(
    random: &[u8; 32],
    public_key: &[u8; P256_PUBLIC_KEY_LEN],
) -> Result<heapless::Vec<u8, CLIENT_HELLO_LEN>, Error> {
    let mut out = [0u8; CLIENT_HELLO_LEN];
    write_handshake_header(HandshakeType::ClientHello, CLIENT_HELLO_BODY_LEN, &mut out)?;
    let mut off = HANDSHAKE_HEADER_LEN;

    out[off..off + 2].copy_from_slice(&CLIENT_HELLO_VERSION.to_be_bytes());
    off += 2;

    out[off..off + 32].copy_from_slice(random);
    off += 32;

    // Session ID
    out[off] = 0;
    off += 1;

    // Cipher suites
    out[off..off + 2].copy_from_slice(&2u16.to_be_bytes());
    out[off + 2..off + 4].copy_from_slice(&CIPHER_SUITE_AES_256_GCM_SHA384.to_be_bytes());
    off += 4;

    // Compression methods: 1 byte length, 1 null method
    out[off] = 1;
    out[off + 1] = 0;
    off += 2;

    out[off..off + 2].copy_from_slice(&(CLIENT_HELLO_EXTENSIONS_LEN as u16).to_be_bytes());
    off += 2;
    off += extensions::encode_client_hello_extensions(public_key, &mut out[off..])?;

    heapless::Vec::from_slice(&out[..off]).map_err(|_| Error::BufferTooSmall { needed: off })
}

/// Parse a ServerHello message body (after the 4-byte handshake header).
pub fn parse_server_hello(data: &[u8]) -> Result<ServerHello<'_>, Error> {
    if data.len() < 2 + 32 + 1 {
        return Err(Error::Tls);
    }

    let mut off = 0;

    // ProtocolVersion (legacy, should be 0x0303)
    let _version = u16::from_be_bytes([data[off], data[off + 1]]);
    off += 2;

    let random: &[u8; 32] = data[off..off + 32]
        .try_into()
        .map_err(|_| Error::Tls)?;
    off += 32;

    // Session ID
    let sid_len = data[off] as usize;
    off += 1;
    if off + sid_len > data.len() {
        return Err(Error::Tls);
    }
    let session_id = &data[off..off + sid_len];
    off += sid_len;

    // Cipher suite
    if off + 2 > data.len() {
        return Err(Error::Tls);
    }
    let cipher_suite = u16::from_be_bytes([data[off], data[off + 1]]);
    off += 2;

    // Compression method (should be 0)
    if off >= data.len() {
        return Err(Error::Tls);
    }
    off += 1;

    let extensions = if off + 2 <= data.len() {
        let ext_len = u16::from_be_bytes([data[off], data[off + 1]]) as usize;
        off += 2;
        if off + ext_len > data.len() {
            return Err(Error::Tls);
        }
        &data[off..off + ext_len]
    } else {
        &[]
    };

    Ok(ServerHello {
        random,
        session_id,
        cipher_suite,
        extensions,
    })
}

/// Encode a handshake message with an arbitrary body.
pub fn encode_handshake(msg_type: HandshakeType, body: &[u8]) -> Result<Vec<u8>, Error> {
    if body.len() > 0x00FF_FFFF {
        return Err(Error::Tls);
    }
    let mut out = vec![0u8; HANDSHAKE_HEADER_LEN + body.len()];
    write_handshake_header(msg_type, body.len(), &mut out)?;
    out[HANDSHAKE_HEADER_LEN..].copy_from_slice(body);
    Ok(out)
}

/// Encode a Finished message (header + verify_data).
pub fn encode_finished(verify_data: &[u8], out: &mut [u8]) -> Result<usize, Error> {
    let total = HANDSHAKE_HEADER_LEN + verify_data.len();
    if out.len() < total {
        return Err(Error::BufferTooSmall { needed: total });
    }
    write_handshake_header(HandshakeType::Finished, verify_data.len(), out)?;
    out[HANDSHAKE_HEADER_LEN..total].copy_from_slice(verify_data);
    Ok(total)
}

/// Parse a Finished message body (after header).
/// Returns the verify_data.
pub fn parse_finished(data: &[u8]) -> Result<&[u8], Error> {
    if data.len() != HASH_LEN {
        return Err(Error::Tls);
    }
    Ok(data)
}

/// One complete handshake message, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub msg_type: u8,
    pub raw: Vec<u8>,
}

impl HandshakeMessage {
    pub fn body(&self) -> &[u8] {
        &self.raw[HANDSHAKE_HEADER_LEN..]
    }

    pub fn handshake_type(&self) -> Option<HandshakeType> {
        HandshakeType::from_u8(self.msg_type)
    }
}

/// Reassembles handshake messages from record payloads.
///
/// A record may carry several messages and a message may span several
/// records; bytes are released only as whole messages.
#[derive(Debug, Default)]
pub struct HandshakeReassembler {
    buf: Vec<u8>,
}

impl HandshakeReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &[u8]) {
        self.buf.extend_from_slice(fragment);
    }

    /// Whether a partial message is waiting for more bytes.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn next_message(&mut self) -> Result<Option<HandshakeMessage>, Error> {
        if self.buf.len() < HANDSHAKE_HEADER_LEN {
            return Ok(None);
        }
        let (msg_type, body_len) = read_handshake_header(&self.buf)?;
        if body_len > MAX_HANDSHAKE_MESSAGE_LEN {
            return Err(Error::Tls);
        }
        let total = HANDSHAKE_HEADER_LEN + body_len;
        if self.buf.len() < total {
            return Ok(None);
        }
        let raw: Vec<u8> = self.buf.drain(..total).collect();
        Ok(Some(HandshakeMessage { msg_type, raw }))
    }
}
