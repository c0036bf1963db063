//! # ACLs
//!
//! An ACL is bound to one namespace node and lists `(principal, role)`
//! entries. ACLs are published as versioned link records under the node:
//!
//! ```text
//! <node>/%C1.M.acl/%FD<0>    first ACL
//! <node>/%C1.M.acl/%FD<1>    after the first applied operation
//! ...
//! ```
//!
//! Every applied [`AclOperation`] publishes a new ACL version, so a partially
//! applied update is visible in the namespace and can be reconciled.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AccessError;
use super::principal::{Principal, Role};
use super::profile::NamespaceProfile;
use crate::content::{ContentObject, ContentType};
use crate::identity::Identity;
use crate::name::Name;
use crate::store::ContentStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AclEntry {
    pub principal: Principal,
    pub role: Role,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    entries: BTreeSet<AclEntry>,
}

impl Acl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Acl::add`]
    pub fn with(mut self, principal: Principal, role: Role) -> Self {
        self.add(principal, role);
        self
    }

    /// Returns false if the entry was already present
    pub fn add(&mut self, principal: Principal, role: Role) -> bool {
        self.entries.insert(AclEntry { principal, role })
    }

    /// Returns false if the entry was not present
    pub fn remove(&mut self, principal: &Principal, role: Role) -> bool {
        self.entries.remove(&AclEntry {
            principal: principal.clone(),
            role,
        })
    }

    pub fn has(&self, principal: &Principal, role: Role) -> bool {
        self.entries.contains(&AclEntry {
            principal: principal.clone(),
            role,
        })
    }

    /// True if `principal` holds any role
    pub fn is_member(&self, principal: &Principal) -> bool {
        self.entries.iter().any(|e| &e.principal == principal)
    }

    pub fn entries(&self) -> impl Iterator<Item = &AclEntry> {
        self.entries.iter()
    }

    /// Every principal holding at least one role; these all get the node key
    pub fn principals(&self) -> BTreeSet<&Principal> {
        self.entries.iter().map(|e| &e.principal).collect()
    }

    pub fn managers(&self) -> impl Iterator<Item = &Principal> {
        self.entries
            .iter()
            .filter(|e| e.role == Role::Manager)
            .map(|e| &e.principal)
    }

    pub fn groups(&self) -> BTreeSet<&Principal> {
        self.entries
            .iter()
            .map(|e| &e.principal)
            .filter(|p| p.is_group())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self) -> Result<(), AccessError> {
        if self.managers().next().is_none() {
            return Err(AccessError::InvalidAcl("acl has no manager".into()));
        }
        Ok(())
    }
}

/// One step of an ACL update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AclOperation {
    AddReader(Principal),
    AddWriter(Principal),
    AddManager(Principal),
    RemoveReader(Principal),
    RemoveWriter(Principal),
    RemoveManager(Principal),
}

impl AclOperation {
    pub fn principal(&self) -> &Principal {
        match self {
            AclOperation::AddReader(p)
            | AclOperation::AddWriter(p)
            | AclOperation::AddManager(p)
            | AclOperation::RemoveReader(p)
            | AclOperation::RemoveWriter(p)
            | AclOperation::RemoveManager(p) => p,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            AclOperation::AddReader(_) | AclOperation::RemoveReader(_) => Role::Reader,
            AclOperation::AddWriter(_) | AclOperation::RemoveWriter(_) => Role::Writer,
            AclOperation::AddManager(_) | AclOperation::RemoveManager(_) => Role::Manager,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(
            self,
            AclOperation::AddReader(_) | AclOperation::AddWriter(_) | AclOperation::AddManager(_)
        )
    }
}

impl std::fmt::Display for AclOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = if self.is_add() { "add" } else { "remove" };
        write!(f, "{} {} {}", verb, self.role(), self.principal())
    }
}

/// Latest ACL version published at `node`, if any
pub(crate) async fn latest_acl_version<S: ContentStore>(
    store: &S,
    profile: &NamespaceProfile,
    node: &Name,
    timeout: Duration,
) -> Result<Option<u64>, AccessError> {
    let latest = store
        .get_latest_version(&profile.acl_base(node), timeout)
        .await?;
    Ok(latest.and_then(|name| name.version()))
}

pub(crate) async fn fetch_acl<S: ContentStore>(
    store: &S,
    profile: &NamespaceProfile,
    node: &Name,
    version: u64,
    timeout: Duration,
) -> Result<Acl, AccessError> {
    let name = profile.acl_name(node, version);
    let data = store.get(&name, timeout).await?;
    Ok(ContentObject::decode(&name, &data)?.record()?)
}

/// Latest `(version, acl)` at `node`, or `None` if the node is unprotected
pub(crate) async fn latest_acl<S: ContentStore>(
    store: &S,
    profile: &NamespaceProfile,
    node: &Name,
    timeout: Duration,
) -> Result<Option<(u64, Acl)>, AccessError> {
    match latest_acl_version(store, profile, node, timeout).await? {
        Some(version) => Ok(Some((
            version,
            fetch_acl(store, profile, node, version, timeout).await?,
        ))),
        None => Ok(None),
    }
}

pub(crate) async fn publish_acl<S: ContentStore>(
    store: &S,
    profile: &NamespaceProfile,
    node: &Name,
    version: u64,
    acl: &Acl,
    publisher: &Identity,
) -> Result<(), AccessError> {
    let name = profile.acl_name(node, version);
    let object = ContentObject::sign_record(name.clone(), ContentType::Link, acl, publisher.secret_key())?;
    store.put(&name, object.encode()?).await?;
    tracing::debug!("published acl v{} at {}", version, node);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roles_are_independent_entries() {
        let alice = Principal::user("Alice");
        let mut acl = Acl::new()
            .with(alice.clone(), Role::Manager)
            .with(alice.clone(), Role::Reader);

        assert_eq!(acl.len(), 2);
        assert_eq!(acl.principals().len(), 1);
        assert!(acl.remove(&alice, Role::Reader));
        assert!(acl.is_member(&alice));
        assert!(!acl.remove(&alice, Role::Reader));
    }

    #[test]
    fn test_validate_requires_manager() {
        let bob = Principal::user("Bob");
        assert!(Acl::new().with(bob.clone(), Role::Reader).validate().is_err());
        assert!(Acl::new().with(bob, Role::Manager).validate().is_ok());
    }

    #[test]
    fn test_groups_filter() {
        let acl = Acl::new()
            .with(Principal::user("Alice"), Role::Manager)
            .with(Principal::group("editors"), Role::Writer);
        let groups: Vec<_> = acl.groups().into_iter().collect();
        assert_eq!(groups, vec![&Principal::group("editors")]);
    }

    #[test]
    fn test_operation_accessors() {
        let op = AclOperation::RemoveManager(Principal::user("Carol"));
        assert_eq!(op.role(), Role::Manager);
        assert!(!op.is_add());
        assert_eq!(op.to_string(), "remove manager user:Carol");
    }
}
