/// TLS alert descriptions the client reacts to (RFC 8446 §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    HandshakeFailure = 40,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InternalError = 80,
}

impl AlertDescription {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::CloseNotify),
            10 => Some(Self::UnexpectedMessage),
            20 => Some(Self::BadRecordMac),
            22 => Some(Self::RecordOverflow),
            40 => Some(Self::HandshakeFailure),
            50 => Some(Self::DecodeError),
            51 => Some(Self::DecryptError),
            70 => Some(Self::ProtocolVersion),
            80 => Some(Self::InternalError),
            _ => None,
        }
    }
}

/// Top-level crate error.
///
/// Every variant is fatal to the connection that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Transport read/write failure, or the peer closed the stream early.
    Transport(std::io::ErrorKind),
    /// Cryptographic primitive failed (bad point, bad key length, ...).
    Crypto,
    /// AEAD authentication tag mismatch.
    DecryptFailed,
    /// Malformed or unexpected handshake content.
    Tls,
    /// Record header could not be decoded.
    MalformedRecord,
    /// Record length exceeds the protocol maximum.
    RecordOverflow { length: usize },
    /// Peer sent a fatal alert.
    Alert(u8),
    /// Caller-provided buffer too small.
    BufferTooSmall { needed: usize },
    /// Invalid state for the requested operation.
    InvalidState,
    /// Connection is closed.
    Closed,
    /// Handshake did not complete in time.
    Timeout,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(e.kind())
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Transport(kind) => write!(f, "transport error: {kind}"),
            Error::Crypto => write!(f, "cryptographic error"),
            Error::DecryptFailed => write!(f, "record authentication failed"),
            Error::Tls => write!(f, "TLS error"),
            Error::MalformedRecord => write!(f, "malformed record"),
            Error::RecordOverflow { length } => {
                write!(f, "record length {length} exceeds maximum")
            }
            Error::Alert(desc) => match AlertDescription::from_u8(*desc) {
                Some(known) => write!(f, "peer sent alert: {known:?}"),
                None => write!(f, "peer sent alert {desc}"),
            },
            Error::BufferTooSmall { needed } => {
                write!(f, "buffer too small, need {needed} bytes")
            }
            Error::InvalidState => write!(f, "invalid state"),
            Error::Closed => write!(f, "connection closed"),
            Error::Timeout => write!(f, "handshake timed out"),
        }
    }
}

impl std::error::Error for Error {}
