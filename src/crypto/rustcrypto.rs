//! RustCrypto-backed implementation of the TLS crypto traits.

use zeroize::Zeroize;

use crate::crypto::{
    Aead as AeadTrait, CryptoProvider, HASH_LEN, P256_PUBLIC_KEY_LEN, SHARED_SECRET_LEN,
};
use crate::error::Error;

// ---- AES-256-GCM AEAD ----

/// AES-256-GCM AEAD implementation.
pub struct Aes256GcmAead {
    cipher: aes_gcm::Aes256Gcm,
}

impl AeadTrait for Aes256GcmAead {
    const KEY_LEN: usize = 32;
    const NONCE_LEN: usize = 12;
    const TAG_LEN: usize = 16;

    fn seal_in_place(
        &self,
        nonce: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        payload_len: usize,
    ) -> Result<usize, Error> {
        use aes_gcm::aead::AeadInPlace;
        use aes_gcm::Nonce;

        if nonce.len() != Self::NONCE_LEN {
            return Err(Error::Crypto);
        }
        let total = payload_len + Self::TAG_LEN;
        if buf.len() < total {
            return Err(Error::BufferTooSmall { needed: total });
        }

        let nonce = Nonce::from_slice(nonce);
        let tag = self
            .cipher
            .encrypt_in_place_detached(nonce, aad, &mut buf[..payload_len])
            .map_err(|_| Error::Crypto)?;
        buf[payload_len..total].copy_from_slice(&tag);
        Ok(total)
    }

    fn open_in_place(
        &self,
        nonce: &[u8],
        aad: &[u8],
        buf: &mut [u8],
        ciphertext_len: usize,
    ) -> Result<usize, Error> {
        use aes_gcm::aead::AeadInPlace;
        use aes_gcm::{Nonce, Tag};

        if nonce.len() != Self::NONCE_LEN {
            return Err(Error::Crypto);
        }
        if ciphertext_len < Self::TAG_LEN || ciphertext_len > buf.len() {
            return Err(Error::DecryptFailed);
        }
        let plaintext_len = ciphertext_len - Self::TAG_LEN;
        let mut tag_bytes = [0u8; 16];
        tag_bytes.copy_from_slice(&buf[plaintext_len..ciphertext_len]);
        let tag = Tag::from(tag_bytes);
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                aad,
                &mut buf[..plaintext_len],
                &tag,
            )
            .map_err(|_| Error::DecryptFailed)?;
        Ok(plaintext_len)
    }
}

// ---- P-256 ECDHE ----

/// Ephemeral P-256 key pair.
pub struct P256KeyPair {
    secret: p256::SecretKey,
    public: p256::PublicKey,
}

impl P256KeyPair {
    fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, Error> {
        let secret = p256::SecretKey::from_slice(secret).map_err(|_| Error::Crypto)?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }
}

// ---- CryptoProvider bundle ----

/// TLS_AES_256_GCM_SHA384 with secp256r1 key exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmSha384Provider;

impl CryptoProvider for Aes256GcmSha384Provider {
    type Aead = Aes256GcmAead;
    type KeyPair = P256KeyPair;

    fn ecdh_generate_key_pair(&self) -> Result<Self::KeyPair, Error> {
        use rand::RngCore;

        // A uniformly random 32-byte string is a valid scalar except with
        // probability ~2^-32; retry a bounded number of times.
        let mut rng = rand::rng();
        for _ in 0..8 {
            let mut secret = [0u8; 32];
            rng.fill_bytes(&mut secret);
            let key_pair = P256KeyPair::from_secret_bytes(&secret);
            secret.zeroize();
            if let Ok(key_pair) = key_pair {
                return Ok(key_pair);
            }
        }
        Err(Error::Crypto)
    }

    fn ecdh_key_pair_from_secret(&self, secret: &[u8; 32]) -> Result<Self::KeyPair, Error> {
        P256KeyPair::from_secret_bytes(secret)
    }

    fn ecdh_public_key(&self, key_pair: &Self::KeyPair) -> [u8; P256_PUBLIC_KEY_LEN] {
        use p256::elliptic_curve::sec1::ToEncodedPoint;

        let point = key_pair.public.to_encoded_point(false);
        let mut out = [0u8; P256_PUBLIC_KEY_LEN];
        out.copy_from_slice(point.as_bytes());
        out
    }

    fn ecdh_derive_shared_secret(
        &self,
        key_pair: &Self::KeyPair,
        peer_public: &[u8],
    ) -> Result<[u8; SHARED_SECRET_LEN], Error> {
        if peer_public.len() != P256_PUBLIC_KEY_LEN {
            return Err(Error::Crypto);
        }
        let peer = p256::PublicKey::from_sec1_bytes(peer_public).map_err(|_| Error::Crypto)?;
        let shared = p256::ecdh::diffie_hellman(key_pair.secret.to_nonzero_scalar(), peer.as_affine());
        let mut out = [0u8; SHARED_SECRET_LEN];
        out.copy_from_slice(shared.raw_secret_bytes());
        Ok(out)
    }

    fn hmac_sign(&self, key: &[u8], message: &[u8]) -> Result<[u8; HASH_LEN], Error> {
        use hmac::{Hmac, Mac};

        let mut mac = Hmac::<sha2::Sha384>::new_from_slice(key).map_err(|_| Error::Crypto)?;
        mac.update(message);
        let tag = mac.finalize().into_bytes();
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    fn sha384_digest(&self, data: &[u8]) -> [u8; HASH_LEN] {
        use sha2::{Digest, Sha384};

        let digest = Sha384::digest(data);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        out
    }

    fn aead(&self, key: &[u8]) -> Result<Self::Aead, Error> {
        use aes_gcm::KeyInit;
        if key.len() != Aes256GcmAead::KEY_LEN {
            return Err(Error::Crypto);
        }
        let cipher = aes_gcm::Aes256Gcm::new_from_slice(key).map_err(|_| Error::Crypto)?;
        Ok(Aes256GcmAead { cipher })
    }
}
