use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, SecretKey, Signature};
use crate::name::Name;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("bad signature on {0}")]
    BadSignature(Name),
    #[error("object at {expected} claims name {found}")]
    NameMismatch { expected: Name, found: Name },
}

/// What a content object's payload holds
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Application bytes
    #[default]
    Data,
    /// Application bytes encrypted under a node-derived data key
    Encrypted,
    /// Key material: public keys, wrapped keys
    Key,
    /// A record pointing at other names (ACLs, memberships, profiles)
    Link,
    /// Marks content as withdrawn
    Gone,
}

/// Where a verifier finds the publisher's key
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyLocator {
    /// The key embedded in the object's signed info
    #[default]
    Key,
    /// A published key object whose payload is the publisher's public key
    Name(Name),
}

/// The node key version that encrypted an object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRef {
    pub node: Name,
    pub version: u64,
}

/// Signed metadata carried alongside every payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInfo {
    pub publisher: PublicKey,
    /// Signing time, microseconds since the epoch
    pub timestamp: i64,
    pub content_type: ContentType,
    pub freshness_seconds: Option<u32>,
    /// Index of the last segment of the version this block belongs to
    pub final_segment: Option<u64>,
    pub key_locator: KeyLocator,
}

impl SignedInfo {
    pub fn new(publisher: PublicKey, content_type: ContentType) -> Self {
        Self {
            publisher,
            timestamp: chrono::Utc::now().timestamp_micros(),
            content_type,
            freshness_seconds: None,
            final_segment: None,
            key_locator: KeyLocator::Key,
        }
    }
}

#[derive(Serialize)]
struct Signable<'a> {
    name: &'a Name,
    info: &'a SignedInfo,
    key_ref: &'a Option<KeyRef>,
    payload: &'a [u8],
}

/// A named, signed, optionally encrypted block
///
/// Immutable once built: the signature covers the name, the signed info,
///  the key reference and the payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentObject {
    name: Name,
    info: SignedInfo,
    key_ref: Option<KeyRef>,
    payload: Vec<u8>,
    signature: Signature,
}

impl ContentObject {
    /// Sign and build an object; `info.publisher` is taken from `signer`
    pub fn sign(
        name: Name,
        mut info: SignedInfo,
        key_ref: Option<KeyRef>,
        payload: Vec<u8>,
        signer: &SecretKey,
    ) -> Result<Self, ContentError> {
        info.publisher = signer.public();
        let signed_bytes = bincode::serialize(&Signable {
            name: &name,
            info: &info,
            key_ref: &key_ref,
            payload: &payload,
        })?;
        let signature = signer.sign(&signed_bytes);
        Ok(Self {
            name,
            info,
            key_ref,
            payload,
            signature,
        })
    }

    /// Sign a serde record as the payload of a [`ContentType::Link`]
    ///  or [`ContentType::Key`] object
    pub fn sign_record<T: Serialize>(
        name: Name,
        content_type: ContentType,
        record: &T,
        signer: &SecretKey,
    ) -> Result<Self, ContentError> {
        let payload = bincode::serialize(record)?;
        Self::sign(
            name,
            SignedInfo::new(signer.public(), content_type),
            None,
            payload,
            signer,
        )
    }

    /// Check the signature against the embedded publisher key
    pub fn verify(&self) -> Result<(), ContentError> {
        let signed_bytes = bincode::serialize(&Signable {
            name: &self.name,
            info: &self.info,
            key_ref: &self.key_ref,
            payload: &self.payload,
        })?;
        self.info
            .publisher
            .verify(&signed_bytes, &self.signature)
            .map_err(|_| ContentError::BadSignature(self.name.clone()))
    }

    pub fn encode(&self) -> Result<Bytes, ContentError> {
        Ok(Bytes::from(bincode::serialize(self)?))
    }

    /// Decode an object fetched from `expected` and verify it
    pub fn decode(expected: &Name, data: &[u8]) -> Result<Self, ContentError> {
        let object: ContentObject = bincode::deserialize(data)?;
        if &object.name != expected {
            return Err(ContentError::NameMismatch {
                expected: expected.clone(),
                found: object.name,
            });
        }
        object.verify()?;
        Ok(object)
    }

    /// Decode the payload as a serde record
    pub fn record<T: DeserializeOwned>(&self) -> Result<T, ContentError> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn info(&self) -> &SignedInfo {
        &self.info
    }

    pub fn publisher(&self) -> &PublicKey {
        &self.info.publisher
    }

    pub fn key_ref(&self) -> Option<&KeyRef> {
        self.key_ref.as_ref()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn final_segment(&self) -> Option<u64> {
        self.info.final_segment
    }
}
