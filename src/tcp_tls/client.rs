//! Client entry points: open a transport, run the handshake, return the sender.

use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::{oneshot, Mutex};

use crate::config::ClientConfig;
use crate::crypto::CryptoProvider;
use crate::error::Error;
use crate::tls::handshake::ClientHandshake;

use super::connection::{consume_records, read_records, Outbound, RecordQueue, TlsSender};

/// Run the handshake over an already-connected stream.
///
/// Writes the ClientHello, starts the reader and consumer tasks and waits for
/// the handshake to finish (bounded by `config.handshake_timeout`). Each
/// decrypted application-data record is then passed to `on_application_data`
/// in receive order.
pub async fn connect_stream<S, C, F>(
    stream: S,
    provider: C,
    config: &ClientConfig,
    on_application_data: F,
) -> Result<TlsSender<WriteHalf<S>, C::Aead>, Error>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    C: CryptoProvider + Send + 'static,
    C::Aead: Send + 'static,
    C::KeyPair: Send + 'static,
    F: FnMut(Vec<u8>) + Send + 'static,
{
    let handshake = ClientHandshake::new(provider)?;
    connect_with_handshake(stream, handshake, config, on_application_data).await
}

/// Like [`connect_stream`], with a handshake the caller has already built
/// (for example with fixed key material).
pub async fn connect_with_handshake<S, C, F>(
    stream: S,
    mut handshake: ClientHandshake<C>,
    config: &ClientConfig,
    on_application_data: F,
) -> Result<TlsSender<WriteHalf<S>, C::Aead>, Error>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    C: CryptoProvider + Send + 'static,
    C::Aead: Send + 'static,
    C::KeyPair: Send + 'static,
    F: FnMut(Vec<u8>) + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut outbound = Outbound::new(writer);
    let client_hello = handshake.start()?;
    outbound.write_raw(&client_hello).await?;
    let outbound = Arc::new(Mutex::new(outbound));

    let (records_tx, records_rx) = RecordQueue::new();
    let (gate_tx, gate_rx) = oneshot::channel();

    let reader_task = tokio::spawn(read_records(reader, records_tx, config.read_chunk_size));
    let consumer_task = tokio::spawn(consume_records(
        handshake,
        records_rx,
        Arc::clone(&outbound),
        gate_tx,
        reader_task.abort_handle(),
        on_application_data,
    ));

    let outcome = match config.handshake_timeout {
        Some(limit) => match tokio::time::timeout(limit, gate_rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("handshake timed out after {limit:?}");
                reader_task.abort();
                consumer_task.abort();
                return Err(Error::Timeout);
            }
        },
        None => gate_rx.await,
    };

    match outcome {
        Ok(Ok(())) => Ok(TlsSender::new(outbound)),
        // The consumer aborts the reader itself on the way out.
        Ok(Err(e)) => Err(e),
        // Consumer ended without resolving the gate: close_notify mid-handshake.
        Err(_) => Err(Error::Closed),
    }
}

/// Connect over TCP with the built-in RustCrypto provider.
#[cfg(feature = "rustcrypto")]
pub async fn connect<F>(
    options: crate::config::ConnectOptions,
    on_application_data: F,
) -> Result<TcpTlsSender, Error>
where
    F: FnMut(Vec<u8>) + Send + 'static,
{
    let stream = tokio::net::TcpStream::connect(&options.addr).await?;
    stream.set_nodelay(true)?;
    debug!("TCP connected to {}", options.addr);
    connect_stream(
        stream,
        crate::crypto::rustcrypto::Aes256GcmSha384Provider,
        &options.config,
        on_application_data,
    )
    .await
}

/// Sender returned by [`connect`].
#[cfg(feature = "rustcrypto")]
pub type TcpTlsSender =
    TlsSender<WriteHalf<tokio::net::TcpStream>, crate::crypto::rustcrypto::Aes256GcmAead>;
