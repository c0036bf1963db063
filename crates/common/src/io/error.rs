use crate::access::AccessError;
use crate::content::ContentError;
use crate::crypto::{CryptoError, PrincipalDigest, SecretError};
use crate::name::Name;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("access control error: {0}")]
    Access(#[from] AccessError),
    #[error("content error: {0}")]
    Content(#[from] ContentError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("timed out fetching {0}")]
    Timeout(Name),
    #[error("put drain timed out with {outstanding} blocks unacknowledged")]
    DrainTimeout { outstanding: usize },
    #[error("{failed} blocks failed to publish, first {first}: {reason}")]
    PutFailed {
        failed: usize,
        first: Name,
        reason: StoreError,
    },
    #[error("content store error: {0}")]
    Store(StoreError),
    #[error("no version of {0} found")]
    NotFound(Name),
    #[error("malformed content at {name}: {reason}")]
    Malformed { name: Name, reason: String },
    #[error("key locator of {0} does not match its publisher")]
    KeyLocatorMismatch(Name),
    #[error("no local identity with digest {0}")]
    UnknownPublisher(PrincipalDigest),
    #[error("writer is closed")]
    Closed,
}

impl IoError {
    /// True when the caller lacks a key, as opposed to the content being
    ///  slow or missing
    pub fn is_access_denied(&self) -> bool {
        matches!(self, IoError::Access(e) if e.is_access_denied())
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            IoError::Timeout(_) | IoError::DrainTimeout { .. } => true,
            IoError::Access(e) => e.is_timeout(),
            _ => false,
        }
    }

    pub(crate) fn malformed(name: &Name, reason: impl Into<String>) -> Self {
        IoError::Malformed {
            name: name.clone(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for IoError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout(name) => IoError::Timeout(name),
            other => IoError::Store(other),
        }
    }
}

impl From<SecretError> for IoError {
    fn from(e: SecretError) -> Self {
        IoError::Crypto(e.into())
    }
}
