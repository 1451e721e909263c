//! TLS 1.3 record layer over an async byte stream (RFC 8446).
//!
//! Transport ↔ reader task ↔ OrderedQueue ↔ consumer (handshake, listener),
//! with a shared [`TlsSender`] for outbound application data.

pub mod record;
pub mod cipher;
pub mod pipeline;
pub mod connection;
pub mod client;

pub use cipher::{DirectionalCipher, RecordCipher};
pub use client::{connect_stream, connect_with_handshake};
#[cfg(feature = "rustcrypto")]
pub use client::{connect, TcpTlsSender};
pub use connection::TlsSender;
pub use record::{ContentType, Record, RecordReader};
