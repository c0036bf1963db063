use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::acl::{latest_acl, latest_acl_version, publish_acl, Acl, AclOperation};
use super::directory::UserDirectory;
use super::error::{AccessError, AclUpdateReport};
use super::groups::GroupDirectory;
use super::node_keys::NodeKeyManager;
use super::principal::{Principal, Role};
use super::profile::{NamespaceProfile, GROUP_ACM_TAG};
use crate::config::Config;
use crate::crypto::Secret;
use crate::identity::{Identities, Identity};
use crate::name::Name;
use crate::store::ContentStore;

/// The node key protecting a name, at the version new content should use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionKey {
    pub node: Name,
    pub version: u64,
    pub key: Secret,
}

impl ProtectionKey {
    /// Key for the content published at `name` (a versioned name)
    pub fn data_key(&self, name: &Name) -> Secret {
        data_key(&self.key, name)
    }
}

/// Derive the per-version data key from a node key
pub fn data_key(node_key: &Secret, name: &Name) -> Secret {
    node_key.derive(name.to_uri().as_bytes())
}

/// Group-based access control over one protected domain
///
/// Binds ACLs to nodes of the name tree, keeps the node keys of protected
///  nodes wrapped for every principal with a role, and answers which key
///  protects a given name.
///
/// All mutations run as the default identity of `identities`; reads use
///  every local identity.
#[derive(Debug, Clone)]
pub struct AccessControlManager<S: ContentStore> {
    store: S,
    profile: NamespaceProfile,
    identities: Identities,
    config: Config,
    users: UserDirectory<S>,
    groups: GroupDirectory<S>,
    node_keys: NodeKeyManager<S>,
    /// name -> the node whose ACL governs it
    governing: Arc<RwLock<HashMap<Name, Name>>>,
}

impl<S: ContentStore> AccessControlManager<S> {
    pub fn new(store: S, profile: NamespaceProfile, identities: Identities, config: Config) -> Self {
        let users = UserDirectory::new(store.clone(), profile.clone(), config.timeout());
        let groups = GroupDirectory::new(
            store.clone(),
            profile.clone(),
            users.clone(),
            identities.clone(),
            config.clone(),
        );
        let node_keys = NodeKeyManager::new(
            store.clone(),
            profile.clone(),
            groups.clone(),
            identities.clone(),
            config.clone(),
        );
        Self {
            store,
            profile,
            identities,
            config,
            users,
            groups,
            node_keys,
            governing: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Locate the namespace profile covering `name` and build the manager
    ///  it names
    pub async fn find(
        store: S,
        identities: Identities,
        config: Config,
        name: &Name,
    ) -> Result<Self, AccessError> {
        let profile = NamespaceProfile::find(&store, name, config.probe_timeout()).await?;
        if profile.acm_tag != GROUP_ACM_TAG {
            return Err(AccessError::UnsupportedProfile(profile.acm_tag));
        }
        Ok(Self::new(store, profile, identities, config))
    }

    pub fn profile(&self) -> &NamespaceProfile {
        &self.profile
    }

    pub fn users(&self) -> &UserDirectory<S> {
        &self.users
    }

    pub fn groups(&self) -> &GroupDirectory<S> {
        &self.groups
    }

    pub fn node_keys(&self) -> &NodeKeyManager<S> {
        &self.node_keys
    }

    fn caller(&self) -> &Identity {
        self.identities.default_identity()
    }

    /// Protect `node` with `acl`
    ///
    /// Creates node key version 0, wrapped for everyone in `acl`, and
    ///  publishes ACL version 0.
    pub async fn set_acl(&self, node: &Name, acl: Acl) -> Result<(), AccessError> {
        if !node.starts_with(&self.profile.domain) {
            return Err(AccessError::NoNamespaceProfile(node.clone()));
        }
        acl.validate()?;
        if !self.is_manager(&acl).await? {
            return Err(AccessError::NotManager {
                node: node.clone(),
                principal: self.caller().principal().clone(),
            });
        }
        if let Some(governing) = self.lookup_governing(node).await? {
            return Err(AccessError::AlreadyProtected(governing));
        }

        self.node_keys.create_node_key(node, &acl).await?;
        publish_acl(&self.store, &self.profile, node, 0, &acl, self.caller()).await?;
        tracing::info!("protected {} with {} acl entries", node, acl.len());
        Ok(())
    }

    /// Apply `ops` to the ACL of `node`, in order
    ///
    /// Each applied operation publishes a new ACL version. If the first
    ///  operation fails its error is returned as is and nothing changed;
    ///  a later failure returns [`AccessError::PartialAclUpdate`] describing
    ///  what was applied.
    pub async fn update_acl(
        &self,
        node: &Name,
        ops: impl IntoIterator<Item = AclOperation>,
    ) -> Result<Acl, AccessError> {
        let (mut version, mut acl) = latest_acl(&self.store, &self.profile, node, self.config.timeout())
            .await?
            .ok_or_else(|| AccessError::NotProtected(node.clone()))?;

        let mut ops = ops.into_iter();
        let mut applied = Vec::new();
        while let Some(op) = ops.next() {
            match self.apply(node, &acl, version + 1, &op).await {
                Ok(Some(updated)) => {
                    acl = updated;
                    version += 1;
                    applied.push(op);
                }
                // already in place
                Ok(None) => applied.push(op),
                Err(e) if applied.is_empty() => return Err(e),
                Err(e) => {
                    let report = AclUpdateReport {
                        node: node.clone(),
                        applied,
                        failed: Some((op, e)),
                        not_attempted: ops.collect(),
                    };
                    tracing::warn!("acl update stopped partway: {}", report);
                    return Err(AccessError::PartialAclUpdate(Box::new(report)));
                }
            }
        }
        Ok(acl)
    }

    /// Run one operation against `acl` and publish the result as `version`
    ///
    /// # Returns
    /// * `Ok(None)` - the entry was already present; nothing was published
    async fn apply(
        &self,
        node: &Name,
        acl: &Acl,
        version: u64,
        op: &AclOperation,
    ) -> Result<Option<Acl>, AccessError> {
        if !self.is_manager(acl).await? {
            return Err(AccessError::NotManager {
                node: node.clone(),
                principal: self.caller().principal().clone(),
            });
        }

        let principal = op.principal();
        let role = op.role();
        let mut updated = acl.clone();

        if op.is_add() {
            if acl.has(principal, role) {
                return Ok(None);
            }
            if !acl.is_member(principal) {
                self.node_keys.add_principal(node, principal).await?;
            }
            updated.add(principal.clone(), role);
        } else {
            if !updated.remove(principal, role) {
                return Err(AccessError::EntryNotFound {
                    node: node.clone(),
                    principal: principal.clone(),
                    role,
                });
            }
            if role == Role::Manager && updated.managers().next().is_none() {
                return Err(AccessError::LastManagerRemoval {
                    node: node.clone(),
                    principal: principal.clone(),
                });
            }
            if !updated.is_member(principal) {
                self.node_keys
                    .remove_principal(node, updated.principals())
                    .await?;
            }
        }

        publish_acl(&self.store, &self.profile, node, version, &updated, self.caller()).await?;
        tracing::debug!("applied `{}` on {} (acl v{})", op, node, version);
        Ok(Some(updated))
    }

    /// The latest ACL published at `node`
    pub async fn acl(&self, node: &Name) -> Result<Acl, AccessError> {
        latest_acl(&self.store, &self.profile, node, self.config.timeout())
            .await?
            .map(|(_, acl)| acl)
            .ok_or_else(|| AccessError::NotProtected(node.clone()))
    }

    /// Node key `version` of `node`, for decrypting content that names it
    pub async fn node_key(&self, node: &Name, version: u64) -> Result<Secret, AccessError> {
        self.node_keys.resolve(node, version).await
    }

    /// The key new content at `name` should be encrypted under
    ///
    /// # Returns
    /// * `Ok(None)` - no ACL covers `name`; publish it in the clear
    pub async fn resolve_protection_key(
        &self,
        name: &Name,
    ) -> Result<Option<ProtectionKey>, AccessError> {
        let Some(node) = self.lookup_governing(name).await? else {
            return Ok(None);
        };
        let version = self
            .node_keys
            .current_version(&node)
            .await?
            .ok_or_else(|| AccessError::NotProtected(node.clone()))?;
        let key = self.node_keys.resolve(&node, version).await?;

        let acl = self.acl(&node).await?;
        if !self.node_keys.is_superseded(&node, version, &acl).await? {
            return Ok(Some(ProtectionKey { node, version, key }));
        }
        // a group in the acl rekeyed since; move the node along with it
        // before anything new goes out under the old version
        let version = self
            .node_keys
            .remove_principal(&node, acl.principals())
            .await?;
        let key = self.node_keys.resolve(&node, version).await?;
        Ok(Some(ProtectionKey { node, version, key }))
    }

    /// The nearest node at or above `name`, no higher than the domain, that
    ///  carries an ACL
    ///
    /// Only hits are cached. Another handle may protect a node at any time,
    ///  so a miss is looked up again on every call. A hit cannot go stale:
    ///  ACLs are never removed and none may be set below a protected node.
    async fn lookup_governing(&self, name: &Name) -> Result<Option<Name>, AccessError> {
        if !name.starts_with(&self.profile.domain) {
            return Ok(None);
        }

        let mut visited = Vec::new();
        let mut found = None;
        for prefix in name.ancestors() {
            if prefix.len() < self.profile.domain.len() {
                break;
            }
            let cached = self.governing.read().get(&prefix).cloned();
            if let Some(governing) = cached {
                found = Some(governing);
                break;
            }
            visited.push(prefix.clone());
            if latest_acl_version(&self.store, &self.profile, &prefix, self.config.probe_timeout())
                .await?
                .is_some()
            {
                found = Some(prefix);
                break;
            }
        }

        if let Some(node) = &found {
            let mut governing = self.governing.write();
            for prefix in visited {
                governing.insert(prefix, node.clone());
            }
        }
        Ok(found)
    }

    /// True if the caller is a manager in `acl`, directly or through a group
    async fn is_manager(&self, acl: &Acl) -> Result<bool, AccessError> {
        let caller = self.caller().principal();
        let managers: Vec<Principal> = acl.managers().cloned().collect();
        if managers.contains(caller) {
            return Ok(true);
        }
        for manager in managers.iter().filter(|p| p.is_group()) {
            if self.groups.is_member_transitive(&manager.name, caller).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::MemoryContentStore;

    async fn manager(
        store: &MemoryContentStore,
        profile: &NamespaceProfile,
        name: &str,
    ) -> AccessControlManager<MemoryContentStore> {
        let identity = Identity::generate(name);
        let acm = AccessControlManager::new(
            store.clone(),
            profile.clone(),
            Identities::new(identity.clone()),
            Config::default(),
        );
        acm.users().publish_user_key(&identity).await.unwrap();
        acm
    }

    fn name(s: &str) -> Name {
        Name::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_protection_is_inherited() {
        let store = MemoryContentStore::new();
        let profile = NamespaceProfile::new(name("/parc.com"));
        let alice = manager(&store, &profile, "Alice").await;

        assert!(alice
            .resolve_protection_key(&name("/parc.com/docs/a"))
            .await
            .unwrap()
            .is_none());

        alice
            .set_acl(
                &name("/parc.com/docs"),
                Acl::new().with(Principal::user("Alice"), Role::Manager),
            )
            .await
            .unwrap();

        let key = alice
            .resolve_protection_key(&name("/parc.com/docs/a/b"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key.node, name("/parc.com/docs"));
        assert_eq!(key.version, 0);
        assert!(alice
            .resolve_protection_key(&name("/parc.com/public"))
            .await
            .unwrap()
            .is_none());
        assert!(alice
            .resolve_protection_key(&name("/other/docs"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_set_acl_preconditions() {
        let store = MemoryContentStore::new();
        let profile = NamespaceProfile::new(name("/parc.com"));
        let alice = manager(&store, &profile, "Alice").await;
        let _bob = manager(&store, &profile, "Bob").await;
        let node = name("/parc.com/docs");

        let no_manager = Acl::new().with(Principal::user("Alice"), Role::Reader);
        assert!(matches!(
            alice.set_acl(&node, no_manager).await,
            Err(AccessError::InvalidAcl(_))
        ));

        let not_me = Acl::new().with(Principal::user("Bob"), Role::Manager);
        assert!(matches!(
            alice.set_acl(&node, not_me).await,
            Err(AccessError::NotManager { .. })
        ));

        let acl = Acl::new().with(Principal::user("Alice"), Role::Manager);
        alice.set_acl(&node, acl.clone()).await.unwrap();
        assert!(matches!(
            alice.set_acl(&name("/parc.com/docs/inner"), acl).await,
            Err(AccessError::AlreadyProtected(n)) if n == node
        ));
    }

    #[tokio::test]
    async fn test_last_manager_cannot_be_removed() {
        let store = MemoryContentStore::new();
        let profile = NamespaceProfile::new(name("/parc.com"));
        let alice = manager(&store, &profile, "Alice").await;
        let node = name("/parc.com/docs");
        alice
            .set_acl(&node, Acl::new().with(Principal::user("Alice"), Role::Manager))
            .await
            .unwrap();

        let result = alice
            .update_acl(&node, [AclOperation::RemoveManager(Principal::user("Alice"))])
            .await;
        assert!(matches!(result, Err(AccessError::LastManagerRemoval { .. })));
        assert!(alice
            .acl(&node)
            .await
            .unwrap()
            .has(&Principal::user("Alice"), Role::Manager));
    }

    #[tokio::test]
    async fn test_remove_missing_entry() {
        let store = MemoryContentStore::new();
        let profile = NamespaceProfile::new(name("/parc.com"));
        let alice = manager(&store, &profile, "Alice").await;
        let node = name("/parc.com/docs");
        alice
            .set_acl(&node, Acl::new().with(Principal::user("Alice"), Role::Manager))
            .await
            .unwrap();

        let result = alice
            .update_acl(&node, [AclOperation::RemoveReader(Principal::user("Bob"))])
            .await;
        assert!(matches!(result, Err(AccessError::EntryNotFound { role: Role::Reader, .. })));
    }

    #[tokio::test]
    async fn test_rekey_only_on_last_role() {
        let store = MemoryContentStore::new();
        let profile = NamespaceProfile::new(name("/parc.com"));
        let alice = manager(&store, &profile, "Alice").await;
        let _bob = manager(&store, &profile, "Bob").await;
        let node = name("/parc.com/docs");
        let bob = Principal::user("Bob");
        alice
            .set_acl(
                &node,
                Acl::new()
                    .with(Principal::user("Alice"), Role::Manager)
                    .with(bob.clone(), Role::Reader)
                    .with(bob.clone(), Role::Writer),
            )
            .await
            .unwrap();

        alice
            .update_acl(&node, [AclOperation::RemoveWriter(bob.clone())])
            .await
            .unwrap();
        assert_eq!(alice.node_keys().current_version(&node).await.unwrap(), Some(0));

        alice
            .update_acl(&node, [AclOperation::RemoveReader(bob)])
            .await
            .unwrap();
        assert_eq!(alice.node_keys().current_version(&node).await.unwrap(), Some(1));
    }
}
