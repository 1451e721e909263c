//! Async connection plumbing: the reader task, the ordered consumer and the
//! send handle.
//!
//! ```text
//! transport --read--> RecordReader --push--> OrderedQueue --> consumer
//!                                                             |  handshake
//!                                                             |  listener(data)
//! TlsSender --seal+write--> Outbound (shared with consumer) <-+  ClientFinished
//! ```

use std::io::ErrorKind;
use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex};
use tokio::task::AbortHandle;

use crate::crypto::{Aead, CryptoProvider};
use crate::error::Error;
use crate::tls::handshake::{read_application_record, ClientHandshake, Progress};

use super::cipher::DirectionalCipher;
use super::pipeline::{OrderedQueue, OrderedSender};
use super::record::{ContentType, Record, RecordReader, MAX_PLAINTEXT_LEN};

/// Items flowing from the reader task to the consumer.
pub(crate) type RecordQueue = OrderedQueue<Result<Record, Error>>;
pub(crate) type RecordSender = OrderedSender<Result<Record, Error>>;

/// Resolved once, when the handshake succeeds or fails.
pub(crate) type HandshakeGate = oneshot::Sender<Result<(), Error>>;

/// Write half of the connection and the cipher that protects it.
pub(crate) struct Outbound<W, A: Aead> {
    writer: W,
    /// Installed when the handshake completes.
    cipher: Option<DirectionalCipher<A>>,
    closed: bool,
    /// Why the connection was torn down, if it was not a clean close.
    failure: Option<Error>,
}

impl<W: AsyncWrite + Unpin, A: Aead> Outbound<W, A> {
    pub(crate) fn new(writer: W) -> Self {
        Self {
            writer,
            cipher: None,
            closed: false,
            failure: None,
        }
    }

    /// Error a send on a closed connection reports.
    fn closed_error(&self) -> Error {
        self.failure.unwrap_or(Error::Closed)
    }

    pub(crate) async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.closed {
            return Err(self.closed_error());
        }
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Seal `data` into as many application-data records as needed and
    /// write them.
    async fn write_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        let cipher = self.cipher.as_mut().ok_or(Error::InvalidState)?;
        let mut chunks = data.chunks(MAX_PLAINTEXT_LEN).peekable();
        if chunks.peek().is_none() {
            let record = cipher.seal(&[], ContentType::ApplicationData)?;
            self.writer.write_all(&record).await?;
        }
        for chunk in chunks {
            let record = cipher.seal(chunk, ContentType::ApplicationData)?;
            self.writer.write_all(&record).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn write_close_notify(&mut self) -> Result<(), Error> {
        if let Some(cipher) = self.cipher.as_mut() {
            let alert = cipher.seal(&[1, 0], ContentType::Alert)?;
            self.writer.write_all(&alert).await?;
            self.writer.flush().await?;
        }
        Ok(())
    }

    /// Drop the keys and shut the write half, remembering `failure` as the
    /// reason. Idempotent; the first reason wins.
    async fn shut(&mut self, failure: Option<Error>) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.failure = failure;
        self.cipher = None;
        if let Err(e) = self.writer.shutdown().await {
            trace!("shutdown of write half failed: {e}");
        }
    }
}

/// Handle for sending application data on an established connection.
///
/// Clones share the same write half and sequence counter.
pub struct TlsSender<W, A: Aead> {
    outbound: Arc<Mutex<Outbound<W, A>>>,
}

impl<W, A: Aead> Clone for TlsSender<W, A> {
    fn clone(&self) -> Self {
        Self {
            outbound: Arc::clone(&self.outbound),
        }
    }
}

impl<W: AsyncWrite + Unpin, A: Aead> TlsSender<W, A> {
    pub(crate) fn new(outbound: Arc<Mutex<Outbound<W, A>>>) -> Self {
        Self { outbound }
    }

    /// Encrypt and write `data` as application-data records.
    ///
    /// Payloads larger than one record are split; an empty payload still
    /// produces one (empty) record. Any failure is fatal: the connection is
    /// shut and every later call returns the same error.
    pub async fn send(&self, data: &[u8]) -> Result<(), Error> {
        let mut out = self.outbound.lock().await;
        if out.closed {
            return Err(out.closed_error());
        }
        if let Err(e) = out.write_application_data(data).await {
            warn!("send failed, closing connection: {e}");
            out.shut(Some(e)).await;
            return Err(e);
        }
        Ok(())
    }

    /// Send close_notify and shut the write half. Later sends fail with
    /// [`Error::Closed`].
    pub async fn close(&self) -> Result<(), Error> {
        let mut out = self.outbound.lock().await;
        if out.closed {
            return Ok(());
        }
        let result = out.write_close_notify().await;
        match result {
            Ok(()) => debug!("close_notify sent"),
            Err(e) => warn!("close_notify failed: {e}"),
        }
        out.shut(result.err()).await;
        result
    }

    /// Whether the connection has been shut, cleanly or not.
    pub async fn is_closed(&self) -> bool {
        self.outbound.lock().await.closed
    }

    /// The error that tore the connection down, if it did not close cleanly.
    pub async fn failure(&self) -> Option<Error> {
        self.outbound.lock().await.failure
    }

    /// Number of records sealed under the application keys.
    pub async fn sequence(&self) -> Option<u64> {
        self.outbound
            .lock()
            .await
            .cipher
            .as_ref()
            .map(DirectionalCipher::sequence)
    }
}

/// Split transport chunks into records and push them, in order.
///
/// Ends at EOF (dropping the sender signals it), on a read or framing error
/// (pushed as the last item), or when the consumer has gone away.
pub(crate) async fn read_records<R>(mut reader: R, queue: RecordSender, chunk_size: usize)
where
    R: AsyncRead + Unpin,
{
    let mut records = RecordReader::new();
    let mut chunk = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                trace!("transport EOF ({} bytes buffered)", records.buffered());
                return;
            }
            Ok(n) => n,
            Err(e) => {
                queue.push(Err(e.into()));
                return;
            }
        };
        trace!("read {n} bytes");
        records.feed(&chunk[..n]);
        loop {
            match records.next_record() {
                Ok(Some(record)) => {
                    if !queue.push(Ok(record)) {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    queue.push(Err(e));
                    return;
                }
            }
        }
    }
}

/// The single consumer: drive the handshake, then deliver application data
/// to `listener` one record at a time.
///
/// On exit the reader task is aborted and the write half shut. A fatal error
/// is recorded so later sends report it.
pub(crate) async fn consume_records<C, W, F>(
    handshake: ClientHandshake<C>,
    mut queue: RecordQueue,
    outbound: Arc<Mutex<Outbound<W, C::Aead>>>,
    gate: HandshakeGate,
    reader: AbortHandle,
    mut listener: F,
) where
    C: CryptoProvider,
    W: AsyncWrite + Unpin,
    F: FnMut(Vec<u8>),
{
    let mut gate = Some(gate);
    let result = drive(handshake, &mut queue, &outbound, &mut gate, &mut listener).await;
    queue.close();
    reader.abort();
    let failure = match result {
        Ok(()) => {
            debug!("connection closed by peer");
            None
        }
        Err(e) => {
            warn!("connection failed: {e}");
            if let Some(gate) = gate.take() {
                let _ = gate.send(Err(e));
            }
            Some(e)
        }
    };
    outbound.lock().await.shut(failure).await;
}

async fn drive<C, W, F>(
    mut handshake: ClientHandshake<C>,
    queue: &mut RecordQueue,
    outbound: &Mutex<Outbound<W, C::Aead>>,
    gate: &mut Option<HandshakeGate>,
    listener: &mut F,
) -> Result<(), Error>
where
    C: CryptoProvider,
    W: AsyncWrite + Unpin,
    F: FnMut(Vec<u8>),
{
    let client_finished = loop {
        match handshake.handle_record(&next_record(queue).await?)? {
            Progress::Continue => {}
            Progress::Established { client_finished } => break client_finished,
            Progress::Closed => return Ok(()),
            Progress::ApplicationData(_) => return Err(Error::Tls),
        }
    };

    let (send, mut recv) = handshake.into_ciphers()?;
    {
        let mut out = outbound.lock().await;
        out.write_raw(&client_finished).await?;
        out.cipher = Some(send);
    }
    if let Some(gate) = gate.take() {
        let _ = gate.send(Ok(()));
    }
    debug!("handshake complete, delivering application data");

    loop {
        match read_application_record(&mut recv, &next_record(queue).await?)? {
            Progress::ApplicationData(data) => {
                trace!("delivering {} bytes (recv seq {})", data.len(), recv.sequence());
                listener(data);
            }
            Progress::Continue => {}
            Progress::Closed => return Ok(()),
            Progress::Established { .. } => return Err(Error::InvalidState),
        }
    }
}

async fn next_record(queue: &mut RecordQueue) -> Result<Record, Error> {
    queue
        .next()
        .await
        .unwrap_or(Err(Error::Transport(ErrorKind::UnexpectedEof)))
}
