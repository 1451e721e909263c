//! TLS 1.3 record layer codec (RFC 8446 §5).

use crate::error::Error;

/// TLS record content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            20 => Some(Self::ChangeCipherSpec),
            21 => Some(Self::Alert),
            22 => Some(Self::Handshake),
            23 => Some(Self::ApplicationData),
            _ => None,
        }
    }
}

/// TLS record header (5 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub content_type: ContentType,
    pub legacy_version: u16,
    pub length: u16,
}

impl RecordHeader {
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_LEN] {
        let [v_hi, v_lo] = self.legacy_version.to_be_bytes();
        let [l_hi, l_lo] = self.length.to_be_bytes();
        [self.content_type as u8, v_hi, v_lo, l_hi, l_lo]
    }
}

/// TLS 1.3 record header size.
pub const RECORD_HEADER_LEN: usize = 5;

/// Maximum plaintext carried by one record.
pub const MAX_PLAINTEXT_LEN: usize = 16384;

/// Maximum TLS record payload (RFC 8446 §5.1).
pub const MAX_RECORD_PAYLOAD: usize = MAX_PLAINTEXT_LEN + 256; // plaintext + expansion

/// Legacy version on the ClientHello record.
pub const CLIENT_HELLO_RECORD_VERSION: u16 = 0x0304;

/// Legacy version on every record written after the ClientHello.
pub const RECORD_VERSION: u16 = 0x0303;

/// Encode a TLS record header.
pub fn encode_record_header(
    ct: ContentType,
    legacy_version: u16,
    length: u16,
    buf: &mut [u8],
) -> Result<usize, Error> {
    if buf.len() < RECORD_HEADER_LEN {
        return Err(Error::BufferTooSmall { needed: RECORD_HEADER_LEN });
    }
    let header = RecordHeader {
        content_type: ct,
        legacy_version,
        length,
    };
    buf[..RECORD_HEADER_LEN].copy_from_slice(&header.to_bytes());
    Ok(RECORD_HEADER_LEN)
}

/// Decode a TLS record header from at least 5 bytes.
pub fn decode_record_header(data: &[u8]) -> Result<RecordHeader, Error> {
    if data.len() < RECORD_HEADER_LEN {
        return Err(Error::BufferTooSmall { needed: RECORD_HEADER_LEN });
    }
    let content_type = ContentType::from_byte(data[0]).ok_or(Error::MalformedRecord)?;
    let legacy_version = u16::from_be_bytes([data[1], data[2]]);
    let length = u16::from_be_bytes([data[3], data[4]]);
    if length as usize > MAX_RECORD_PAYLOAD {
        return Err(Error::RecordOverflow { length: length as usize });
    }
    Ok(RecordHeader {
        content_type,
        legacy_version,
        length,
    })
}

/// A complete record taken off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: RecordHeader,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn content_type(&self) -> ContentType {
        self.header.content_type
    }
}

/// Build a plaintext record (header + payload).
pub fn encode_plaintext_record(
    ct: ContentType,
    legacy_version: u16,
    payload: &[u8],
) -> Result<Vec<u8>, Error> {
    if payload.len() > MAX_PLAINTEXT_LEN {
        return Err(Error::RecordOverflow { length: payload.len() });
    }
    let mut out = vec![0u8; RECORD_HEADER_LEN + payload.len()];
    encode_record_header(ct, legacy_version, payload.len() as u16, &mut out)?;
    out[RECORD_HEADER_LEN..].copy_from_slice(payload);
    Ok(out)
}

/// Splits a byte stream into records.
///
/// Chunks are appended with [`feed`](Self::feed); complete records come out
/// of [`next_record`](Self::next_record) in wire order. A trailing partial
/// record stays buffered until the rest of it arrives.
#[derive(Debug, Default)]
pub struct RecordReader {
    buf: Vec<u8>,
    start: usize,
}

impl RecordReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the transport.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.start > 0 {
            self.buf.drain(..self.start);
            self.start = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes held that do not yet form a complete record.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Take the next complete record, or `Ok(None)` if more bytes are needed.
    pub fn next_record(&mut self) -> Result<Option<Record>, Error> {
        let pending = &self.buf[self.start..];
        if pending.len() < RECORD_HEADER_LEN {
            return Ok(None);
        }
        let header = decode_record_header(pending)?;
        let total = RECORD_HEADER_LEN + header.length as usize;
        if pending.len() < total {
            return Ok(None);
        }
        let payload = pending[RECORD_HEADER_LEN..total].to_vec();
        self.start += total;
        if self.start == self.buf.len() {
            self.buf.clear();
            self.start = 0;
        }
        Ok(Some(Record { header, payload }))
    }
}

/// Append `content || inner_content_type` to `out` (RFC 8446 §5.2 TLSInnerPlaintext).
pub fn encode_inner_plaintext(content: &[u8], inner_ct: ContentType, out: &mut Vec<u8>) {
    out.reserve(content.len() + 1);
    out.extend_from_slice(content);
    out.push(inner_ct as u8);
}

/// Find the inner content type from decrypted TLS record plaintext.
/// The inner CT is the last non-zero byte; everything before it is the actual data.
pub fn split_inner_plaintext(plaintext: &[u8]) -> Result<(&[u8], ContentType), Error> {
    let mut pos = plaintext.len();
    while pos > 0 && plaintext[pos - 1] == 0 {
        pos -= 1;
    }
    if pos == 0 {
        return Err(Error::Tls);
    }
    let ct = ContentType::from_byte(plaintext[pos - 1]).ok_or(Error::Tls)?;
    Ok((&plaintext[..pos - 1], ct))
}
