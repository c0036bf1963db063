use super::acl::AclOperation;
use super::principal::{Principal, Role};
use crate::content::ContentError;
use crate::crypto::{CryptoError, KeyError, SecretError, WrapError};
use crate::name::Name;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// None of the caller's keys unwraps a record for this key
    #[error("access denied: no usable key for {0}")]
    AccessDenied(Name),
    /// The caller is not a manager of the ACL it tried to change
    #[error("{principal} is not a manager of {node}")]
    NotManager { node: Name, principal: Principal },
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("timed out fetching {0}")]
    Timeout(Name),
    #[error("{0} is already covered by an acl")]
    AlreadyProtected(Name),
    #[error("{0} has no acl")]
    NotProtected(Name),
    #[error("removing {principal} would leave {node} without a manager")]
    LastManagerRemoval { node: Name, principal: Principal },
    #[error("{role} entry for {principal} not found on {node}")]
    EntryNotFound {
        node: Name,
        principal: Principal,
        role: Role,
    },
    #[error("acl update partially applied: {0}")]
    PartialAclUpdate(Box<AclUpdateReport>),
    #[error("invalid acl: {0}")]
    InvalidAcl(String),
    #[error("no public key published for {0}")]
    UnknownPrincipal(Principal),
    #[error("group already exists: {0}")]
    GroupExists(Principal),
    #[error("not a group: {0}")]
    NotAGroup(Principal),
    #[error("{member} is not a member of {group}")]
    NotAMember { group: Principal, member: Principal },
    #[error("no namespace profile covers {0}")]
    NoNamespaceProfile(Name),
    #[error("unsupported access control profile: {0}")]
    UnsupportedProfile(String),
    #[error("content store error: {0}")]
    Store(StoreError),
    #[error("content error: {0}")]
    Content(#[from] ContentError),
}

impl AccessError {
    /// Denials the caller should answer by switching identity, not retrying
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            AccessError::AccessDenied(_) | AccessError::NotManager { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AccessError::Timeout(_))
    }
}

impl From<StoreError> for AccessError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Timeout(name) => AccessError::Timeout(name),
            other => AccessError::Store(other),
        }
    }
}

impl From<WrapError> for AccessError {
    fn from(e: WrapError) -> Self {
        AccessError::Crypto(e.into())
    }
}

impl From<KeyError> for AccessError {
    fn from(e: KeyError) -> Self {
        AccessError::Crypto(e.into())
    }
}

impl From<SecretError> for AccessError {
    fn from(e: SecretError) -> Self {
        AccessError::Crypto(e.into())
    }
}

/// What an `update_acl` call did before it stopped
///
/// Each applied operation already published its key records and a new ACL
/// version, so they stay applied. The caller reconciles from here: retry
/// `failed` and `not_attempted`, do not replay `applied`.
#[derive(Debug, Default)]
pub struct AclUpdateReport {
    pub node: Name,
    pub applied: Vec<AclOperation>,
    pub failed: Option<(AclOperation, AccessError)>,
    pub not_attempted: Vec<AclOperation>,
}

impl AclUpdateReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && self.not_attempted.is_empty()
    }
}

impl std::fmt::Display for AclUpdateReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} applied on {}", self.applied.len(), self.node)?;
        if let Some((op, err)) = &self.failed {
            write!(f, ", `{}` failed ({})", op, err)?;
        }
        if !self.not_attempted.is_empty() {
            write!(f, ", {} not attempted", self.not_attempted.len())?;
        }
        Ok(())
    }
}
