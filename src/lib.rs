//! Minimal TLS 1.3 client: one cipher suite (TLS_AES_256_GCM_SHA384), one
//! group (secp256r1), no certificate validation.
//!
//! The handshake ([`tls::handshake::ClientHandshake`]) is sans-IO; the
//! [`tcp_tls`] layer runs it over any tokio byte stream and delivers
//! decrypted records in wire order.

#![forbid(unsafe_code)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod tcp_tls;
pub mod tls;

pub use config::{ClientConfig, ConnectOptions};
pub use error::Error;
pub use tcp_tls::{connect_stream, TlsSender};
#[cfg(feature = "rustcrypto")]
pub use tcp_tls::{connect, TcpTlsSender};
