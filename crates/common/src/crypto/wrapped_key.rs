//! Key wrapping using ECDH + AES Key Wrap
//!
//! Node keys and group private keys are distributed by wrapping them under the
//! public key of each principal that should hold them:
//!
//! 1. **Generate ephemeral keypair**: a fresh Ed25519 keypair per wrap
//! 2. **Perform ECDH**: convert both sides to X25519 and compute the shared secret
//! 3. **Wrap key**: AES-KW (RFC 3394) the 32-byte key under the shared secret
//! 4. **Package**: `ephemeral_pubkey || wrapped_key`
//!
//! Unwrapping with any private key other than the target's fails the AES-KW
//! integrity check, which is what ultimately surfaces as access denial.

use aes_kw::KekAes256 as Kek;
use serde::{Deserialize, Serialize};

use super::keys::{KeyError, PrincipalDigest, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::secret::SECRET_SIZE;

/// Size of AES Key Wrap integrity block in bytes
pub const KW_NONCE_SIZE: usize = 8;
/// Size of the only key length we wrap (node keys and Ed25519 seeds)
pub const WRAPPABLE_KEY_SIZE: usize = SECRET_SIZE;
/// Total size of a wrapped key in bytes
///
/// Layout: ephemeral_pubkey (32) || wrapped_key (40) = 72 bytes
pub const WRAPPED_KEY_SIZE: usize = PUBLIC_KEY_SIZE + WRAPPABLE_KEY_SIZE + KW_NONCE_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum WrapError {
    #[error("wrap error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("unsupported key size {0}, expected {WRAPPABLE_KEY_SIZE}")]
    KeySize(usize),
    #[error("key is not wrapped for this private key")]
    NotRecipient,
}

/// A 32-byte key wrapped for exactly one recipient public key
///
/// # Wire Format
///
/// ```text
/// [ ephemeral_pubkey: 32 bytes ][ wrapped_key: 40 bytes ]
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WrappedKey([u8; WRAPPED_KEY_SIZE]);

impl Serialize for WrappedKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{Error, Visitor};
        use std::fmt;

        struct WrappedKeyVisitor;

        impl WrappedKeyVisitor {
            fn build<E: Error>(v: &[u8]) -> Result<WrappedKey, E> {
                if v.len() != WRAPPED_KEY_SIZE {
                    return Err(E::invalid_length(
                        v.len(),
                        &format!("expected {} bytes", WRAPPED_KEY_SIZE).as_str(),
                    ));
                }
                let mut array = [0u8; WRAPPED_KEY_SIZE];
                array.copy_from_slice(v);
                Ok(WrappedKey(array))
            }
        }

        impl<'de> Visitor<'de> for WrappedKeyVisitor {
            type Value = WrappedKey;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte array of WRAPPED_KEY_SIZE")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Self::build(v)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut bytes = Vec::with_capacity(WRAPPED_KEY_SIZE);
                while let Some(byte) = seq.next_element::<u8>()? {
                    bytes.push(byte);
                }
                Self::build(&bytes)
            }
        }

        // bytes for bincode, seq for JSON
        deserializer.deserialize_byte_buf(WrappedKeyVisitor)
    }
}

impl WrappedKey {
    /// Wrap `key` so that only the holder of `recipient`'s private key can recover it
    ///
    /// # Errors
    ///
    /// Fails with [`WrapError::KeySize`] if `key` is not 32 bytes, or a key
    /// error if `recipient` is not a valid curve point.
    pub fn wrap(key: &[u8], recipient: &PublicKey) -> Result<Self, WrapError> {
        if key.len() != WRAPPABLE_KEY_SIZE {
            return Err(WrapError::KeySize(key.len()));
        }

        let ephemeral_private = SecretKey::generate();
        let ephemeral_public = ephemeral_private.public();

        let recipient_x25519_public = recipient.to_x25519()?;
        let shared_secret = ephemeral_private
            .to_x25519()
            .diffie_hellman(&recipient_x25519_public);

        let kek = Kek::from(*shared_secret.as_bytes());
        let wrapped = kek
            .wrap_vec(key)
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;

        if PUBLIC_KEY_SIZE + wrapped.len() != WRAPPED_KEY_SIZE {
            return Err(anyhow::anyhow!("expected wrapped key size is incorrect").into());
        }

        let mut out = [0u8; WRAPPED_KEY_SIZE];
        out[..PUBLIC_KEY_SIZE].copy_from_slice(&ephemeral_public.to_bytes());
        out[PUBLIC_KEY_SIZE..].copy_from_slice(&wrapped);
        Ok(WrappedKey(out))
    }

    /// Recover the wrapped key bytes with the recipient's private key
    ///
    /// # Errors
    ///
    /// Returns [`WrapError::NotRecipient`] when the AES-KW integrity check
    /// fails, i.e. `recipient_secret` is not the key this was wrapped for.
    pub fn unwrap(&self, recipient_secret: &SecretKey) -> Result<[u8; WRAPPABLE_KEY_SIZE], WrapError> {
        let ephemeral_public = PublicKey::try_from(&self.0[..PUBLIC_KEY_SIZE])?;

        let shared_secret = recipient_secret
            .to_x25519()
            .diffie_hellman(&ephemeral_public.to_x25519()?);

        let kek = Kek::from(*shared_secret.as_bytes());
        let unwrapped = kek
            .unwrap_vec(&self.0[PUBLIC_KEY_SIZE..])
            .map_err(|_| WrapError::NotRecipient)?;

        if unwrapped.len() != WRAPPABLE_KEY_SIZE {
            return Err(anyhow::anyhow!("unwrapped key has wrong size").into());
        }

        let mut out = [0; WRAPPABLE_KEY_SIZE];
        out.copy_from_slice(&unwrapped);
        Ok(out)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// What a wrapped-key record carries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrappedKeyKind {
    /// A node key version
    NodeKey,
    /// A group's private key for one group key version
    GroupKey,
}

/// A published wrapped key, tagged with the digest of the key it targets
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKeyRecord {
    pub kind: WrappedKeyKind,
    pub wrapped_for: PrincipalDigest,
    pub key: WrappedKey,
}

impl WrappedKeyRecord {
    pub fn wrap(kind: WrappedKeyKind, key: &[u8], recipient: &PublicKey) -> Result<Self, WrapError> {
        Ok(Self {
            kind,
            wrapped_for: recipient.digest(),
            key: WrappedKey::wrap(key, recipient)?,
        })
    }

    /// Unwrap with `secret`, checking the digest first so the common
    /// "not for me" case skips the ECDH
    pub fn unwrap(&self, secret: &SecretKey) -> Result<[u8; WRAPPABLE_KEY_SIZE], WrapError> {
        if secret.digest() != self.wrapped_for {
            return Err(WrapError::NotRecipient);
        }
        self.key.unwrap(secret)
    }
}
