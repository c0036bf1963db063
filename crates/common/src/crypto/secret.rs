//! Symmetric keys: node keys and the per-version data keys derived from them
//!
//! A node key protects a subtree of the namespace. Content is never encrypted
//! with the node key directly; every published version gets its own data key
//! derived from the node key and the versioned content name, so two objects
//! under the same node never share a ChaCha20-Poly1305 key.
//!
//! Each block is sealed with the name of the segment that carries it as
//! associated data, so a block moved to another segment fails to open.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

pub const SECRET_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

const DATA_KEY_CONTEXT: &str = "groupkey 2025-01 content data key";

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("expected a {SECRET_SIZE} byte key, got {0} bytes")]
    Size(usize),
    #[error("sealed block of {0} bytes is shorter than nonce and tag")]
    Truncated(usize),
    #[error("block failed authentication")]
    Authentication,
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
}

/// A 256-bit symmetric key
///
/// Sealed format: `nonce (12) || ciphertext || tag (16)`.
#[derive(PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Secret([u8; SECRET_SIZE]);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Secret {
    pub fn generate() -> Self {
        let mut bytes = [0; SECRET_SIZE];
        getrandom::getrandom(&mut bytes).expect("failed to generate random bytes");
        Self(bytes)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        let bytes: [u8; SECRET_SIZE] = data
            .try_into()
            .map_err(|_| SecretError::Size(data.len()))?;
        Ok(Self(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Derive a key bound to `context` (BLAKE3 derive-key mode)
    pub fn derive(&self, context: &[u8]) -> Secret {
        let mut hasher = blake3::Hasher::new_derive_key(DATA_KEY_CONTEXT);
        hasher.update(&self.0);
        hasher.update(context);
        Secret(*hasher.finalize().as_bytes())
    }

    /// Encrypt `plaintext` under a fresh random nonce, authenticating `aad`
    ///  alongside it
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, SecretError> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Reverse [`Secret::seal`]; fails unless both the key and `aad` match
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, SecretError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(SecretError::Truncated(sealed.len()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| SecretError::Authentication)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = Secret::generate();
        let sealed = key.seal(b"quarterly numbers", b"/parc.com/q3/%00%00").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 17 + TAG_SIZE);
        assert_eq!(
            key.open(&sealed, b"/parc.com/q3/%00%00").unwrap(),
            b"quarterly numbers"
        );

        let empty = key.seal(b"", b"").unwrap();
        assert!(key.open(&empty, b"").unwrap().is_empty());
    }

    #[test]
    fn test_open_rejects_other_segment() {
        let key = Secret::generate();
        let sealed = key.seal(b"block", b"segment 0").unwrap();
        assert!(matches!(
            key.open(&sealed, b"segment 1"),
            Err(SecretError::Authentication)
        ));
    }

    #[test]
    fn test_open_rejects_tampering() {
        let key = Secret::generate();
        let mut sealed = key.seal(b"test data for integrity check", b"").unwrap();
        sealed[NONCE_SIZE + 3] ^= 0xFF;
        assert!(key.open(&sealed, b"").is_err());
        assert!(matches!(
            key.open(&sealed[..NONCE_SIZE], b""),
            Err(SecretError::Truncated(NONCE_SIZE))
        ));
    }

    #[test]
    fn test_size_validation() {
        assert!(matches!(Secret::from_slice(&[1u8; 16]), Err(SecretError::Size(16))));
        assert!(Secret::from_slice(&[1u8; 64]).is_err());
        assert!(Secret::from_slice(&[1u8; SECRET_SIZE]).is_ok());
    }

    #[test]
    fn test_derive_binds_context() {
        let node_key = Secret::generate();
        let a = node_key.derive(b"/docs/a/%FD00");
        let b = node_key.derive(b"/docs/b/%FD00");

        assert_ne!(a, b);
        assert_eq!(a, node_key.derive(b"/docs/a/%FD00"));

        let sealed = a.seal(b"block", b"").unwrap();
        assert!(b.open(&sealed, b"").is_err());
        assert!(node_key.open(&sealed, b"").is_err());
    }
}
