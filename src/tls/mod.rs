//! TLS 1.3 client handshake.
//!
//! Messages are framed into records by [`crate::tcp_tls`]; this module only
//! builds and parses handshake messages, keeps the transcript and drives the
//! key schedule.

pub mod extensions;
pub mod handshake;
pub mod messages;
pub mod transcript;

pub use handshake::{ClientHandshake, HandshakePhase, Progress};
pub use transcript::Transcript;
