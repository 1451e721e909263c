//! Scripted TLS 1.3 server for exercising the client, built only from the
//! crate's public codec and key-schedule API.

#![allow(dead_code)]

use milli_tls::crypto::key_schedule::{KeySchedule, TrafficKeys};
use milli_tls::crypto::rustcrypto::{Aes256GcmAead, Aes256GcmSha384Provider};
use milli_tls::crypto::{CryptoProvider, HASH_LEN, P256_PUBLIC_KEY_LEN};
use milli_tls::tcp_tls::cipher::{DirectionalCipher, RecordCipher};
use milli_tls::tcp_tls::record::{
    encode_plaintext_record, ContentType, Record, RecordReader, RECORD_VERSION,
};
use milli_tls::tls::extensions::{
    EXT_KEY_SHARE, EXT_SUPPORTED_GROUPS, EXT_SUPPORTED_VERSIONS, GROUP_SECP256R1, TLS13_VERSION,
};
use milli_tls::tls::messages::{encode_handshake, HandshakeType, CIPHER_SUITE_AES_256_GCM_SHA384};
use milli_tls::tls::{ClientHandshake, Transcript};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const CLIENT_SECRET: [u8; 32] = [0x11; 32];
pub const SERVER_SECRET: [u8; 32] = [0x22; 32];
pub const CLIENT_RANDOM: [u8; 32] = [0x44; 32];
pub const SERVER_RANDOM: [u8; 32] = [0x33; 32];

pub const GET_REQUEST: &[u8] = b"GET / HTTP/1.1\r\nhost:\r\n\r\n";

/// First client application record carrying `GET_REQUEST` under the keys
/// derived from the constants above and [`ScriptedServer::flight`].
pub const GET_RECORD: [u8; 47] = hex_literal::hex!(
    "170303002ae895aad8310e6449143b219b7d6a208eca77f118b16c647afff122"
    "3373b93dcb7f4e08fb972624841e3b"
);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Client handshake with the deterministic test key pair.
pub fn client_handshake() -> ClientHandshake<Aes256GcmSha384Provider> {
    ClientHandshake::with_key_material(Aes256GcmSha384Provider, &CLIENT_SECRET, CLIENT_RANDOM)
        .unwrap()
}

pub fn parse_records(bytes: &[u8]) -> Vec<Record> {
    let mut reader = RecordReader::new();
    reader.feed(bytes);
    let mut out = Vec::new();
    while let Some(record) = reader.next_record().unwrap() {
        out.push(record);
    }
    assert_eq!(reader.buffered(), 0, "trailing partial record");
    out
}

/// Big-endian reader over a handshake body. Panics on truncation.
struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> &'a [u8] {
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        head
    }

    fn u8(&mut self) -> usize {
        self.take(1)[0] as usize
    }

    fn u16(&mut self) -> usize {
        let b = self.take(2);
        u16::from_be_bytes([b[0], b[1]]) as usize
    }

    fn vec8(&mut self) -> &'a [u8] {
        let n = self.u8();
        self.take(n)
    }

    fn vec16(&mut self) -> &'a [u8] {
        let n = self.u16();
        self.take(n)
    }
}

/// What the server needs from a ClientHello body.
pub struct OfferedHello {
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub groups: Vec<u16>,
    pub versions: Vec<u16>,
    pub key_share: Option<[u8; P256_PUBLIC_KEY_LEN]>,
}

fn u16_list(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect()
}

pub fn parse_offered_hello(body: &[u8]) -> OfferedHello {
    let mut c = Cursor { data: body };
    assert_eq!(c.u16(), 0x0304, "ClientHello body version");
    let random = c.take(32).try_into().unwrap();
    let session_id = c.vec8().to_vec();
    let cipher_suites = u16_list(c.vec16());
    assert_eq!(c.vec8(), [0], "compression methods");

    let mut hello = OfferedHello {
        random,
        session_id,
        cipher_suites,
        groups: Vec::new(),
        versions: Vec::new(),
        key_share: None,
    };
    let mut exts = Cursor { data: c.vec16() };
    assert!(c.data.is_empty(), "bytes after extensions");
    while !exts.data.is_empty() {
        let ext_type = exts.u16() as u16;
        let mut ext = Cursor { data: exts.vec16() };
        match ext_type {
            EXT_SUPPORTED_GROUPS => hello.groups = u16_list(ext.vec16()),
            EXT_SUPPORTED_VERSIONS => hello.versions = u16_list(ext.vec8()),
            EXT_KEY_SHARE => {
                let mut shares = Cursor { data: ext.vec16() };
                while !shares.data.is_empty() {
                    let group = shares.u16() as u16;
                    let key = shares.vec16();
                    if group == GROUP_SECP256R1 {
                        hello.key_share = Some(key.try_into().unwrap());
                    }
                }
            }
            _ => {}
        }
    }
    hello
}

/// ServerHello handshake message selecting `suite`, echoing the session id
/// and answering with a secp256r1 key share.
pub fn server_hello_message(
    random: &[u8; 32],
    session_id: &[u8],
    suite: u16,
    public_key: &[u8; P256_PUBLIC_KEY_LEN],
) -> Vec<u8> {
    let mut ext = Vec::new();
    ext.extend_from_slice(&EXT_SUPPORTED_VERSIONS.to_be_bytes());
    ext.extend_from_slice(&2u16.to_be_bytes());
    ext.extend_from_slice(&TLS13_VERSION.to_be_bytes());
    ext.extend_from_slice(&EXT_KEY_SHARE.to_be_bytes());
    ext.extend_from_slice(&((4 + P256_PUBLIC_KEY_LEN) as u16).to_be_bytes());
    ext.extend_from_slice(&GROUP_SECP256R1.to_be_bytes());
    ext.extend_from_slice(&(P256_PUBLIC_KEY_LEN as u16).to_be_bytes());
    ext.extend_from_slice(public_key);

    let mut body = vec![0x03, 0x03];
    body.extend_from_slice(random);
    body.push(session_id.len() as u8);
    body.extend_from_slice(session_id);
    body.extend_from_slice(&suite.to_be_bytes());
    body.push(0);
    body.extend_from_slice(&(ext.len() as u16).to_be_bytes());
    body.extend_from_slice(&ext);
    encode_handshake(HandshakeType::ServerHello, &body).unwrap()
}

pub struct ScriptedServer {
    pub provider: Aes256GcmSha384Provider,
    schedule: KeySchedule,
    transcript: Transcript,
    cipher: RecordCipher<Aes256GcmAead>,
    reader: RecordReader,
    /// Write the handshake flight one byte per write.
    pub trickle: bool,
}

impl Default for ScriptedServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedServer {
    pub fn new() -> Self {
        let provider = Aes256GcmSha384Provider;
        Self {
            provider,
            schedule: KeySchedule::new(&provider).unwrap(),
            transcript: Transcript::new(),
            cipher: RecordCipher::new(),
            reader: RecordReader::new(),
            trickle: false,
        }
    }

    /// Take the ClientHello record, return the ServerHello record followed by
    /// a middlebox-compatibility ChangeCipherSpec.
    pub fn accept(&mut self, client_hello: &Record) -> Vec<u8> {
        assert_eq!(client_hello.content_type(), ContentType::Handshake);
        assert_eq!(client_hello.header.legacy_version, 0x0304);
        let ch = &client_hello.payload;
        assert_eq!(ch[0], HandshakeType::ClientHello as u8);
        self.transcript.update(ch);

        let offered = parse_offered_hello(&ch[4..]);
        assert_eq!(offered.random, CLIENT_RANDOM);
        assert_eq!(offered.cipher_suites, [CIPHER_SUITE_AES_256_GCM_SHA384]);
        assert_eq!(offered.versions, [TLS13_VERSION]);
        assert_eq!(offered.groups, [GROUP_SECP256R1]);
        let client_public = offered.key_share.unwrap();

        let p = self.provider;
        let key_pair = p.ecdh_key_pair_from_secret(&SERVER_SECRET).unwrap();
        let sh = server_hello_message(
            &SERVER_RANDOM,
            &offered.session_id,
            CIPHER_SUITE_AES_256_GCM_SHA384,
            &p.ecdh_public_key(&key_pair),
        );
        self.transcript.update(&sh);

        let shared = p.ecdh_derive_shared_secret(&key_pair, &client_public).unwrap();
        let digest = self.transcript.current_hash(&p);
        self.schedule
            .install_handshake_secrets(&p, &shared, &digest)
            .unwrap();
        self.install_keys();

        let mut out =
            encode_plaintext_record(ContentType::Handshake, RECORD_VERSION, &sh).unwrap();
        out.extend(encode_plaintext_record(ContentType::ChangeCipherSpec, RECORD_VERSION, &[1]).unwrap());
        out
    }

    fn install_keys(&mut self) {
        let p = self.provider;
        let server = self.schedule.server_keys(&p).unwrap();
        let client = self.schedule.client_keys(&p).unwrap();
        self.cipher.install(&p, &server, &client).unwrap();
    }

    fn seal_handshake(&mut self, messages: &[Vec<u8>]) -> Vec<u8> {
        let mut content = Vec::new();
        for m in messages {
            self.transcript.update(m);
            content.extend_from_slice(m);
        }
        self.cipher.seal(&content, ContentType::Handshake).unwrap()
    }

    /// EncryptedExtensions, then Certificate + CertificateVerify coalesced in
    /// one record, then Finished.
    pub fn flight(&mut self) -> Vec<u8> {
        let ee = encode_handshake(HandshakeType::EncryptedExtensions, &[0, 0]).unwrap();
        let mut cert_body = vec![0u8];
        let cert_der = [0x30u8; 40];
        let entry_len = 3 + cert_der.len() + 2;
        cert_body.extend_from_slice(&(entry_len as u32).to_be_bytes()[1..]);
        cert_body.extend_from_slice(&(cert_der.len() as u32).to_be_bytes()[1..]);
        cert_body.extend_from_slice(&cert_der);
        cert_body.extend_from_slice(&[0, 0]);
        let cert = encode_handshake(HandshakeType::Certificate, &cert_body).unwrap();
        let cv = encode_handshake(HandshakeType::CertificateVerify, &[0x08, 0x04, 0, 2, 0xAB, 0xCD])
            .unwrap();
        // Never checked by the client.
        let fin = encode_handshake(HandshakeType::Finished, &[0x5A; HASH_LEN]).unwrap();

        let mut out = self.seal_handshake(&[ee]);
        out.extend(self.seal_handshake(&[cert, cv]));
        out.extend(self.seal_handshake(&[fin]));
        out
    }

    /// Verify the client Finished and switch to application keys.
    pub fn finish(&mut self, client_finished: &Record) {
        let p = self.provider;
        let digest = self.transcript.current_hash(&p);
        let expected = self.schedule.client_finished_verify_data(&p, &digest).unwrap();
        let (ct, content) = self.cipher.open(client_finished).unwrap();
        assert_eq!(ct, ContentType::Handshake);
        assert_eq!(&content[..4], &[20, 0, 0, HASH_LEN as u8]);
        assert_eq!(&content[4..], &expected[..]);

        self.schedule.install_application_secrets(&p, &digest).unwrap();
        self.install_keys();
    }

    pub fn client_application_keys(&self) -> TrafficKeys {
        self.schedule.client_keys(&self.provider).unwrap()
    }

    pub fn server_application_keys(&self) -> TrafficKeys {
        self.schedule.server_keys(&self.provider).unwrap()
    }

    /// What the client must put on the wire for `data` as its first
    /// application record.
    pub fn expected_first_client_record(&self, data: &[u8]) -> Vec<u8> {
        let keys = self.client_application_keys();
        let mut cipher: DirectionalCipher<Aes256GcmAead> =
            DirectionalCipher::new(&self.provider, &keys).unwrap();
        cipher.seal(data, ContentType::ApplicationData).unwrap()
    }

    pub fn seal(&mut self, data: &[u8], ct: ContentType) -> Vec<u8> {
        self.cipher.seal(data, ct).unwrap()
    }

    pub fn open(&mut self, record: &Record) -> (ContentType, Vec<u8>) {
        self.cipher.open(record).unwrap()
    }

    /// Next complete record from `io`, or `None` at EOF.
    pub async fn read_record<S: AsyncRead + Unpin>(&mut self, io: &mut S) -> Option<Record> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(record) = self.reader.next_record().unwrap() {
                return Some(record);
            }
            let n = io.read(&mut chunk).await.unwrap();
            if n == 0 {
                return None;
            }
            self.reader.feed(&chunk[..n]);
        }
    }

    pub async fn write<S: AsyncWrite + Unpin>(&self, io: &mut S, bytes: &[u8]) {
        if self.trickle {
            for b in bytes {
                io.write_all(std::slice::from_ref(b)).await.unwrap();
                io.flush().await.unwrap();
                tokio::task::yield_now().await;
            }
        } else {
            io.write_all(bytes).await.unwrap();
            io.flush().await.unwrap();
        }
    }

    /// Run the whole server side of the handshake on `io`.
    pub async fn handshake<S: AsyncRead + AsyncWrite + Unpin>(&mut self, io: &mut S) {
        let client_hello = self.read_record(io).await.expect("ClientHello");
        let mut wire = self.accept(&client_hello);
        wire.extend(self.flight());
        self.write(io, &wire).await;
        let finished = self.read_record(io).await.expect("client Finished");
        self.finish(&finished);
    }
}
