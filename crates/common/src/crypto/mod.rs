//! Cryptographic primitives for access-controlled publishing
//!
//! - **Identity & Signing**: Ed25519 keypairs for users and groups; every
//!   published content object is signed by its publisher
//! - **Content Encryption**: ChaCha20-Poly1305 under a data key derived from
//!   the protecting node key
//! - **Key Wrapping**: ECDH (X25519 via curve conversion) + AES-KW wraps node
//!   keys and group private keys for each principal that may hold them
//!
//! # Wrapping relationships
//!
//! ```text
//! node key v3 --wrapped for--> Alice
//!             --wrapped for--> group "editors" (key v1)
//!                                  |
//!                  group private key v1 --wrapped for--> Bob
//!                                       --wrapped for--> group "interns"
//! ```
//!
//! A reader follows these edges from its own private key until it reaches a
//! record it can unwrap.

mod keys;
mod secret;
mod wrapped_key;

pub use ed25519_dalek::Signature;
pub use keys::{KeyError, PrincipalDigest, PublicKey, SecretKey, DIGEST_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{Secret, SecretError, SECRET_SIZE};
pub use wrapped_key::{
    WrapError, WrappedKey, WrappedKeyKind, WrappedKeyRecord, WRAPPABLE_KEY_SIZE, WRAPPED_KEY_SIZE,
};

/// Any failure of the cryptographic layer
///
/// Malformed or incompatible key material. Fatal for the operation that hit
/// it; never retried.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("wrap error: {0}")]
    Wrap(#[from] WrapError),
    #[error("signature error: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),
}
