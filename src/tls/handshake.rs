//! TLS 1.3 client handshake state machine over the record layer.
//!
//! ```text
//! Start -> SentClientHello -> ReceivedServerHello ->
//! ReceivingEncryptedHandshake -> ReceivedServerFinished -> Established
//! ```
//!
//! Sans-IO: [`ClientHandshake::start`] returns the ClientHello record to
//! write, and [`ClientHandshake::handle_record`] consumes one inbound record
//! at a time. Key phases are installed as transcript milestones are reached.
//! The server's Certificate, CertificateVerify and Finished are recorded in
//! the transcript but not verified.

use log::{debug, trace};

use crate::crypto::key_schedule::{KeyPhase, KeySchedule, TrafficKeys};
use crate::crypto::{Aead, CryptoProvider, HASH_LEN};
use crate::error::Error;
use crate::tcp_tls::cipher::{DirectionalCipher, RecordCipher};
use crate::tcp_tls::record::{
    self, ContentType, Record, CLIENT_HELLO_RECORD_VERSION,
};
use crate::tls::extensions::{parse_server_hello_extensions, TLS13_VERSION};
use crate::tls::messages::{
    encode_client_hello, encode_finished, parse_finished, parse_server_hello, HandshakeMessage,
    HandshakeReassembler, HandshakeType, CIPHER_SUITE_AES_256_GCM_SHA384, HANDSHAKE_HEADER_LEN,
};
use crate::tls::transcript::Transcript;

/// Client-side handshake phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// ClientHello not built yet.
    Start,
    /// ClientHello sent, waiting for ServerHello.
    SentClientHello,
    /// Handshake keys installed, no encrypted record seen yet.
    ReceivedServerHello,
    /// Consuming encrypted handshake messages.
    ReceivingEncryptedHandshake,
    /// Server Finished seen, application keys being installed.
    ReceivedServerFinished,
    /// Application keys installed.
    Established,
}

/// Result of feeding one record to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Record consumed; nothing to do.
    Continue,
    /// Handshake complete. `client_finished` is the sealed ClientFinished
    /// record, which must be written before any application data.
    Established { client_finished: Vec<u8> },
    /// Decrypted application data.
    ApplicationData(Vec<u8>),
    /// Peer sent close_notify.
    Closed,
}

/// Everything the handshake mutates, owned in one place.
struct ConnectionState<C: CryptoProvider> {
    phase: HandshakePhase,
    /// Dropped once application keys are installed.
    transcript: Option<Transcript>,
    key_schedule: KeySchedule,
    cipher: RecordCipher<C::Aead>,
    /// Ephemeral key pair, dropped after the shared secret is derived.
    key_pair: Option<C::KeyPair>,
    reassembler: HandshakeReassembler,
}

/// TLS 1.3 client handshake, generic over the crypto provider.
pub struct ClientHandshake<C: CryptoProvider> {
    provider: C,
    random: [u8; 32],
    public_key: [u8; crate::crypto::P256_PUBLIC_KEY_LEN],
    state: ConnectionState<C>,
}

impl<C: CryptoProvider> ClientHandshake<C> {
    /// Fresh handshake with a random client random and ephemeral key pair.
    pub fn new(provider: C) -> Result<Self, Error> {
        use rand::RngCore;

        let key_pair = provider.ecdh_generate_key_pair()?;
        let mut random = [0u8; 32];
        rand::rng().fill_bytes(&mut random);
        Self::from_parts(provider, key_pair, random)
    }

    /// Handshake with a caller-chosen ephemeral secret and client random.
    pub fn with_key_material(provider: C, secret: &[u8; 32], random: [u8; 32]) -> Result<Self, Error> {
        let key_pair = provider.ecdh_key_pair_from_secret(secret)?;
        Self::from_parts(provider, key_pair, random)
    }

    fn from_parts(provider: C, key_pair: C::KeyPair, random: [u8; 32]) -> Result<Self, Error> {
        let key_schedule = KeySchedule::new(&provider)?;
        let public_key = provider.ecdh_public_key(&key_pair);
        Ok(Self {
            provider,
            random,
            public_key,
            state: ConnectionState {
                phase: HandshakePhase::Start,
                transcript: Some(Transcript::new()),
                key_schedule,
                cipher: RecordCipher::new(),
                key_pair: Some(key_pair),
                reassembler: HandshakeReassembler::new(),
            },
        })
    }

    pub fn phase(&self) -> HandshakePhase {
        self.state.phase
    }

    pub fn is_established(&self) -> bool {
        self.state.phase == HandshakePhase::Established
    }

    pub fn client_random(&self) -> &[u8; 32] {
        &self.random
    }

    pub fn public_key(&self) -> &[u8; crate::crypto::P256_PUBLIC_KEY_LEN] {
        &self.public_key
    }

    /// Current transcript bytes; `None` once established.
    pub fn transcript(&self) -> Option<&Transcript> {
        self.state.transcript.as_ref()
    }

    /// `(send, recv)` record sequence numbers of the installed key phase.
    pub fn sequence_numbers(&self) -> Option<(u64, u64)> {
        Some((
            self.state.cipher.send_sequence()?,
            self.state.cipher.recv_sequence()?,
        ))
    }

    /// Client → server application keys.
    pub fn client_application_keys(&self) -> Result<TrafficKeys, Error> {
        self.require_established()?;
        self.state.key_schedule.client_keys(&self.provider)
    }

    /// Server → client application keys.
    pub fn server_application_keys(&self) -> Result<TrafficKeys, Error> {
        self.require_established()?;
        self.state.key_schedule.server_keys(&self.provider)
    }

    fn require_established(&self) -> Result<(), Error> {
        if self.is_established() {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    /// Build the ClientHello and return its record.
    pub fn start(&mut self) -> Result<Vec<u8>, Error> {
        if self.state.phase != HandshakePhase::Start {
            return Err(Error::InvalidState);
        }
        let hello = encode_client_hello(&self.random, &self.public_key)?;
        self.transcript_mut()?.update(&hello);
        let out = record::encode_plaintext_record(
            ContentType::Handshake,
            CLIENT_HELLO_RECORD_VERSION,
            &hello,
        )?;
        self.state.phase = HandshakePhase::SentClientHello;
        debug!("ClientHello built ({} bytes)", hello.len());
        Ok(out)
    }

    /// Seal application data as one record. Only valid once established.
    pub fn seal_application_data(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.require_established()?;
        self.state.cipher.seal(data, ContentType::ApplicationData)
    }

    /// Hand over the application-phase `(send, recv)` ciphers.
    pub fn into_ciphers(
        self,
    ) -> Result<(DirectionalCipher<C::Aead>, DirectionalCipher<C::Aead>), Error> {
        self.require_established()?;
        self.state.cipher.into_split()
    }

    /// Consume one inbound record.
    pub fn handle_record(&mut self, record: &Record) -> Result<Progress, Error> {
        trace!(
            "record {:?} len={} in {:?}",
            record.content_type(),
            record.payload.len(),
            self.state.phase
        );
        match record.content_type() {
            // Middlebox-compatibility CCS carries no state.
            ContentType::ChangeCipherSpec => return Ok(Progress::Continue),
            ContentType::Alert => return handle_alert(&record.payload),
            _ => {}
        }

        match self.state.phase {
            HandshakePhase::Start => Err(Error::InvalidState),
            HandshakePhase::SentClientHello => self.handle_plaintext_handshake(record),
            HandshakePhase::ReceivedServerHello | HandshakePhase::ReceivingEncryptedHandshake => {
                self.handle_encrypted_handshake(record)
            }
            HandshakePhase::ReceivedServerFinished => Err(Error::InvalidState),
            HandshakePhase::Established => {
                read_application_record(self.state.cipher.recv_mut()?, record)
            }
        }
    }

    fn transcript_mut(&mut self) -> Result<&mut Transcript, Error> {
        self.state.transcript.as_mut().ok_or(Error::InvalidState)
    }

    fn transcript_hash(&self) -> Result<[u8; HASH_LEN], Error> {
        let transcript = self.state.transcript.as_ref().ok_or(Error::InvalidState)?;
        Ok(transcript.current_hash(&self.provider))
    }

    fn handle_plaintext_handshake(&mut self, record: &Record) -> Result<Progress, Error> {
        if record.content_type() != ContentType::Handshake {
            return Err(Error::Tls);
        }
        self.state.reassembler.push(&record.payload);
        let Some(message) = self.state.reassembler.next_message()? else {
            return Ok(Progress::Continue);
        };
        if message.handshake_type() != Some(HandshakeType::ServerHello) {
            return Err(Error::Tls);
        }
        self.process_server_hello(&message)?;
        // Nothing else may share plaintext records with the ServerHello.
        if !self.state.reassembler.is_empty() {
            return Err(Error::Tls);
        }
        Ok(Progress::Continue)
    }

    fn process_server_hello(&mut self, message: &HandshakeMessage) -> Result<(), Error> {
        let sh = parse_server_hello(message.body())?;
        if sh.cipher_suite != CIPHER_SUITE_AES_256_GCM_SHA384 {
            return Err(Error::Tls);
        }
        let exts = parse_server_hello_extensions(sh.extensions)?;
        if exts.selected_version != TLS13_VERSION {
            return Err(Error::Tls);
        }
        let server_public = exts.key_share.ok_or(Error::Tls)?;

        self.transcript_mut()?.update(&message.raw);

        let key_pair = self.state.key_pair.take().ok_or(Error::InvalidState)?;
        let mut shared = self
            .provider
            .ecdh_derive_shared_secret(&key_pair, &server_public)?;
        drop(key_pair);

        let digest = self.transcript_hash()?;
        let installed = self
            .state
            .key_schedule
            .install_handshake_secrets(&self.provider, &shared, &digest);
        zeroize::Zeroize::zeroize(&mut shared);
        installed?;

        self.install_phase_keys()?;
        self.state.phase = HandshakePhase::ReceivedServerHello;
        debug!("ServerHello accepted, handshake keys installed");
        Ok(())
    }

    fn install_phase_keys(&mut self) -> Result<(), Error> {
        let client = self.state.key_schedule.client_keys(&self.provider)?;
        let server = self.state.key_schedule.server_keys(&self.provider)?;
        self.state.cipher.install(&self.provider, &client, &server)
    }

    fn handle_encrypted_handshake(&mut self, record: &Record) -> Result<Progress, Error> {
        if record.content_type() != ContentType::ApplicationData {
            return Err(Error::Tls);
        }
        let (inner_ct, content) = self.state.cipher.open(record)?;
        match inner_ct {
            ContentType::Handshake => {}
            ContentType::Alert => return handle_alert(&content),
            _ => return Err(Error::Tls),
        }
        self.state.phase = HandshakePhase::ReceivingEncryptedHandshake;
        self.state.reassembler.push(&content);

        while let Some(message) = self.state.reassembler.next_message()? {
            self.transcript_mut()?.update(&message.raw);
            trace!("handshake message type={} len={}", message.msg_type, message.raw.len());
            if message.handshake_type() == Some(HandshakeType::Finished) {
                parse_finished(message.body())?;
                if !self.state.reassembler.is_empty() {
                    return Err(Error::Tls);
                }
                let client_finished = self.complete_handshake()?;
                return Ok(Progress::Established { client_finished });
            }
        }
        Ok(Progress::Continue)
    }

    /// Server Finished is in the transcript: seal the ClientFinished under
    /// the handshake keys, then move to application keys.
    fn complete_handshake(&mut self) -> Result<Vec<u8>, Error> {
        self.state.phase = HandshakePhase::ReceivedServerFinished;
        let digest = self.transcript_hash()?;

        let verify_data = self
            .state
            .key_schedule
            .client_finished_verify_data(&self.provider, &digest)?;
        let mut finished = [0u8; HANDSHAKE_HEADER_LEN + HASH_LEN];
        let len = encode_finished(&verify_data, &mut finished)?;
        let sealed = self
            .state
            .cipher
            .seal(&finished[..len], ContentType::Handshake)?;

        self.state
            .key_schedule
            .install_application_secrets(&self.provider, &digest)?;
        self.install_phase_keys()?;
        self.state.transcript = None;
        self.state.phase = HandshakePhase::Established;
        debug_assert_eq!(self.state.key_schedule.phase(), KeyPhase::Application);
        debug!("server Finished received, application keys installed");
        Ok(sealed)
    }
}

/// Alert payload: level(1) + description(1).
fn handle_alert(payload: &[u8]) -> Result<Progress, Error> {
    let [_level, description] = payload else {
        return Err(Error::Tls);
    };
    if *description == 0 {
        debug!("peer sent close_notify");
        Ok(Progress::Closed)
    } else {
        Err(Error::Alert(*description))
    }
}

/// Decrypt one record after the handshake.
///
/// Application data is returned for delivery; post-handshake handshake
/// messages (NewSessionTicket) are dropped.
pub fn read_application_record<A: Aead>(
    cipher: &mut DirectionalCipher<A>,
    record: &Record,
) -> Result<Progress, Error> {
    match record.content_type() {
        ContentType::ChangeCipherSpec => return Ok(Progress::Continue),
        ContentType::Alert => return handle_alert(&record.payload),
        ContentType::Handshake => return Err(Error::Tls),
        ContentType::ApplicationData => {}
    }
    let (inner_ct, content) = cipher.open(record)?;
    match inner_ct {
        ContentType::ApplicationData => Ok(Progress::ApplicationData(content)),
        ContentType::Handshake => {
            trace!("ignoring post-handshake message ({} bytes)", content.len());
            Ok(Progress::Continue)
        }
        ContentType::Alert => handle_alert(&content),
        ContentType::ChangeCipherSpec => Err(Error::Tls),
    }
}

#[cfg(all(test, feature = "rustcrypto"))]
mod tests {
    use super::*;
    use crate::crypto::rustcrypto::Aes256GcmSha384Provider;
    use crate::tcp_tls::record::{RecordReader, RECORD_VERSION};
    use crate::tls::messages::{encode_handshake, CLIENT_HELLO_LEN};

    fn parse_records(bytes: &[u8]) -> Vec<Record> {
        let mut reader = RecordReader::new();
        reader.feed(bytes);
        let mut out = Vec::new();
        while let Some(r) = reader.next_record().unwrap() {
            out.push(r);
        }
        out
    }

    fn plaintext(ct: ContentType, payload: &[u8]) -> Record {
        parse_records(&record::encode_plaintext_record(ct, RECORD_VERSION, payload).unwrap())
            .remove(0)
    }

    fn client() -> ClientHandshake<Aes256GcmSha384Provider> {
        ClientHandshake::with_key_material(Aes256GcmSha384Provider, &[0x11; 32], [0x44; 32])
            .unwrap()
    }

    /// ServerHello with a valid secp256r1 share, selecting `suite` and
    /// `version`.
    fn server_hello(suite: u16, version: u16) -> Record {
        let p = Aes256GcmSha384Provider;
        let kp = p.ecdh_key_pair_from_secret(&[0x22; 32]).unwrap();
        let mut ext = vec![0x00, 0x2b, 0x00, 0x02];
        ext.extend_from_slice(&version.to_be_bytes());
        ext.extend_from_slice(&[0x00, 0x33, 0x00, 0x45, 0x00, 0x17, 0x00, 0x41]);
        ext.extend_from_slice(&p.ecdh_public_key(&kp));
        let mut body = vec![0x03, 0x03];
        body.extend_from_slice(&[0x33; 32]);
        body.push(0);
        body.extend_from_slice(&suite.to_be_bytes());
        body.push(0);
        body.extend_from_slice(&(ext.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext);
        let msg = encode_handshake(HandshakeType::ServerHello, &body).unwrap();
        plaintext(ContentType::Handshake, &msg)
    }

    #[test]
    fn client_hello_record_layout() {
        let mut c = client();
        let bytes = c.start().unwrap();
        assert_eq!(&bytes[..5], &[0x16, 0x03, 0x04, 0x00, 0x91]);
        assert_eq!(&bytes[5..11], &[0x01, 0x00, 0x00, 0x8d, 0x03, 0x04]);
        assert_eq!(&bytes[11..43], &[0x44; 32]);
        assert_eq!(&bytes[bytes.len() - 65..], c.public_key());
        assert_eq!(c.phase(), HandshakePhase::SentClientHello);
        assert_eq!(c.transcript().unwrap().as_bytes(), &bytes[5..]);
    }

    #[test]
    fn start_twice_is_invalid() {
        let mut c = client();
        c.start().unwrap();
        assert_eq!(c.start(), Err(Error::InvalidState));
    }

    #[test]
    fn record_before_start_is_invalid() {
        let mut c = client();
        let r = plaintext(ContentType::Handshake, &[2, 0, 0, 0]);
        assert_eq!(c.handle_record(&r), Err(Error::InvalidState));
    }

    #[test]
    fn server_hello_installs_handshake_keys() {
        let mut c = client();
        c.start().unwrap();
        let sh = server_hello(CIPHER_SUITE_AES_256_GCM_SHA384, TLS13_VERSION);
        assert_eq!(c.handle_record(&sh).unwrap(), Progress::Continue);
        assert_eq!(c.phase(), HandshakePhase::ReceivedServerHello);
        assert_eq!(c.sequence_numbers(), Some((0, 0)));
        assert_eq!(
            c.transcript().unwrap().len(),
            CLIENT_HELLO_LEN + sh.payload.len()
        );
    }

    #[test]
    fn unsupported_cipher_suite_rejected() {
        let mut c = client();
        c.start().unwrap();
        let sh = server_hello(0x1301, TLS13_VERSION);
        assert_eq!(c.handle_record(&sh), Err(Error::Tls));
    }

    #[test]
    fn tls12_selected_version_rejected() {
        let mut c = client();
        c.start().unwrap();
        let sh = server_hello(CIPHER_SUITE_AES_256_GCM_SHA384, 0x0303);
        assert_eq!(c.handle_record(&sh), Err(Error::Tls));
    }

    #[test]
    fn seal_before_established_is_invalid() {
        let mut c = client();
        c.start().unwrap();
        assert_eq!(c.seal_application_data(b"early"), Err(Error::InvalidState));
        assert!(c.client_application_keys().is_err());
        assert!(c.into_ciphers().is_err());
    }

    #[test]
    fn wrong_first_message_is_rejected() {
        let mut c = client();
        c.start().unwrap();
        let ee = encode_handshake(HandshakeType::EncryptedExtensions, &[0, 0]).unwrap();
        let r = plaintext(ContentType::Handshake, &ee);
        assert_eq!(c.handle_record(&r), Err(Error::Tls));
    }

    #[test]
    fn plaintext_alerts_during_handshake() {
        let mut c = client();
        c.start().unwrap();
        let fatal = plaintext(ContentType::Alert, &[2, 40]);
        assert_eq!(c.handle_record(&fatal), Err(Error::Alert(40)));
        let close = plaintext(ContentType::Alert, &[1, 0]);
        assert_eq!(c.handle_record(&close), Ok(Progress::Closed));
    }
}
