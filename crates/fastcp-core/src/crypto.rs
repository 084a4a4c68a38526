//! Session cipher: AES-CTR keyed by `(pre-shared key, session nonce)`.
//!
//! The cipher is stateless — each call rebuilds the CTR stream from the
//! session nonce, so encrypt and decrypt are the same XOR and every payload
//! and chunk body is enciphered independently. With no key installed both
//! operations are the identity.

use aes::{Aes128, Aes256};
use ctr::Ctr128BE;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::constants::NONCE_LEN;

type Aes128Ctr = Ctr128BE<Aes128>;
type Aes256Ctr = Ctr128BE<Aes256>;

/// Installed key material, sized by the pre-shared key.
#[derive(Clone)]
enum SessionKey {
    Aes128([u8; 16]),
    Aes256([u8; 32]),
}

impl SessionKey {
    fn as_bytes(&self) -> &[u8] {
        match self {
            SessionKey::Aes128(k) => k,
            SessionKey::Aes256(k) => k,
        }
    }
}

/// AES-CTR session cipher. Passthrough when no key is installed.
#[derive(Clone)]
pub struct Cipher {
    key: Option<SessionKey>,
    nonce: [u8; NONCE_LEN],
}

impl Cipher {
    /// A null cipher: encrypt and decrypt return the input unchanged.
    pub fn plaintext() -> Self {
        Self {
            key: None,
            nonce: [0u8; NONCE_LEN],
        }
    }

    /// Install `key` with the session `nonce`.
    ///
    /// Key lengths other than 16 or 32 bytes, or nonces shorter than 16
    /// bytes, leave the cipher in plaintext mode. CLI validation rejects bad
    /// key lengths long before this point.
    pub fn with_key(key: &[u8], nonce: &[u8]) -> Self {
        if nonce.len() < NONCE_LEN {
            return Self::plaintext();
        }
        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&nonce[..NONCE_LEN]);

        let session_key = match key.len() {
            16 => {
                let mut k = [0u8; 16];
                k.copy_from_slice(key);
                Some(SessionKey::Aes128(k))
            }
            32 => {
                let mut k = [0u8; 32];
                k.copy_from_slice(key);
                Some(SessionKey::Aes256(k))
            }
            _ => None,
        };

        Self {
            key: session_key,
            nonce: iv,
        }
    }

    /// True when a key is installed and traffic is enciphered.
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Encrypt `data` in place and return it. Identity without a key.
    pub fn encrypt(&self, mut data: Vec<u8>) -> Vec<u8> {
        match &self.key {
            Some(SessionKey::Aes128(k)) => {
                let mut ctr = Aes128Ctr::new(&(*k).into(), &self.nonce.into());
                ctr.apply_keystream(&mut data);
            }
            Some(SessionKey::Aes256(k)) => {
                let mut ctr = Aes256Ctr::new(&(*k).into(), &self.nonce.into());
                ctr.apply_keystream(&mut data);
            }
            None => {}
        }
        data
    }

    /// Decrypt `data`. CTR mode is symmetric, so this is `encrypt`.
    pub fn decrypt(&self, data: Vec<u8>) -> Vec<u8> {
        self.encrypt(data)
    }

    /// Constant-time comparison of `candidate` against the installed key.
    /// Always false when no key is installed.
    pub fn match_secret(&self, candidate: &[u8]) -> bool {
        match &self.key {
            Some(key) => key.as_bytes().ct_eq(candidate).into(),
            None => false,
        }
    }
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Generate a fresh 16-byte session nonce from the OS CSPRNG.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}
