//! # Node keys
//!
//! Every protected node has a symmetric node key with a version number. A
//! version is wrapped for each principal that held a role when it was made,
//! and for principals granted access while it is current. Content is never
//! encrypted under the node key itself but under a key derived from it and
//! the content name, see [`ProtectionKey`](super::ProtectionKey).
//!
//! - Granting reuses the current version: a new reader can open content
//!   published from now on *and* anything already under that version, but
//!   nothing under earlier versions.
//! - Revoking creates the next version for the remaining principals. Content
//!   under earlier versions stays readable to whoever held them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::try_join_all;
use parking_lot::RwLock;

use super::acl::{fetch_acl, latest_acl_version, Acl};
use super::error::AccessError;
use super::groups::GroupDirectory;
use super::key_log::KeyLog;
use super::principal::Principal;
use super::profile::NamespaceProfile;
use super::resolve::KeyRing;
use crate::config::Config;
use crate::content::{ContentObject, ContentType};
use crate::crypto::{PrincipalDigest, PublicKey, Secret, WrappedKeyKind, WrappedKeyRecord};
use crate::identity::Identities;
use crate::name::Name;
use crate::store::ContentStore;

#[derive(Debug, Clone)]
pub struct NodeKeyManager<S: ContentStore> {
    store: S,
    profile: NamespaceProfile,
    groups: GroupDirectory<S>,
    identities: Identities,
    config: Config,
    logs: Arc<RwLock<HashMap<Name, KeyLog>>>,
    /// Versions are immutable, so an unwrapped key never goes stale
    keys: Arc<RwLock<HashMap<(Name, u64), Secret>>>,
}

impl<S: ContentStore> NodeKeyManager<S> {
    pub fn new(
        store: S,
        profile: NamespaceProfile,
        groups: GroupDirectory<S>,
        identities: Identities,
        config: Config,
    ) -> Self {
        Self {
            store,
            profile,
            groups,
            identities,
            config,
            logs: Arc::new(RwLock::new(HashMap::new())),
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Generate version 0 of the node key, wrapped for every principal in
    ///  `acl`
    pub async fn create_node_key(&self, node: &Name, acl: &Acl) -> Result<u64, AccessError> {
        if self.current_version(node).await?.is_some() {
            return Err(AccessError::AlreadyProtected(node.clone()));
        }
        self.publish_version(node, 0, acl.principals()).await?;
        tracing::info!("created node key v0 for {}", node);
        Ok(0)
    }

    /// Wrap the current version for `principal`
    ///
    /// Earlier versions are left alone, so the grant covers the current
    ///  version and later ones only.
    pub async fn add_principal(&self, node: &Name, principal: &Principal) -> Result<u64, AccessError> {
        let version = self
            .current_version(node)
            .await?
            .ok_or_else(|| AccessError::NotProtected(node.clone()))?;
        let key = self.resolve(node, version).await?;
        let recipient = self.groups.public_key_of(principal).await?;
        self.publish_wrap(node, version, &key, &recipient).await?;

        self.logs
            .write()
            .entry(node.clone())
            .or_default()
            .grant(version, recipient.digest());
        tracing::debug!("granted {} node key v{} for {}", principal, version, node);
        Ok(version)
    }

    /// Create the next version, wrapped only for `remaining`
    pub async fn remove_principal<'a>(
        &self,
        node: &Name,
        remaining: impl IntoIterator<Item = &'a Principal>,
    ) -> Result<u64, AccessError> {
        let current = self
            .current_version(node)
            .await?
            .ok_or_else(|| AccessError::NotProtected(node.clone()))?;
        let version = current + 1;
        self.publish_version(node, version, remaining).await?;
        tracing::info!("rekeyed {} to node key v{}", node, version);
        Ok(version)
    }

    /// The newest node key version published for `node`
    pub async fn current_version(&self, node: &Name) -> Result<Option<u64>, AccessError> {
        let latest = self
            .store
            .get_latest_version(&self.profile.node_key_base(node), self.config.probe_timeout())
            .await?;
        let published = latest.and_then(|name| name.version());
        let local = self
            .logs
            .read()
            .get(node)
            .and_then(KeyLog::current_version);
        Ok(published.max(local))
    }

    /// Unwrap node key `version` of `node`
    ///
    /// Tries the records wrapped directly for a local identity first. Failing
    ///  that, unlocks the groups named by any version of the node's ACL and
    ///  retries with their keys.
    pub async fn resolve(&self, node: &Name, version: u64) -> Result<Secret, AccessError> {
        let cache_key = (node.clone(), version);
        if let Some(key) = self.keys.read().get(&cache_key) {
            return Ok(key.clone());
        }

        let mut ring = self.groups.key_ring();
        let mut tried = BTreeSet::new();
        if let Some(key) = self.probe(node, version, &ring, &mut tried).await? {
            return Ok(self.remember(node, version, key));
        }

        let candidates = self.acl_groups(node).await?;
        if !candidates.is_empty() {
            let unlocked = self.groups.unlock(candidates, &mut ring).await?;
            if unlocked > 0 {
                if let Some(key) = self.probe(node, version, &ring, &mut tried).await? {
                    return Ok(self.remember(node, version, key));
                }
            }
        }

        tracing::debug!("no usable wrap for {} node key v{}", node, version);
        Err(AccessError::AccessDenied(
            self.profile.node_key_base(node).with_version(version),
        ))
    }

    /// True if `version` of `node` is not wrapped for the current key of
    ///  every group in `acl`
    ///
    /// A group rekeys when it loses a member. Until the node follows, the
    ///  removed member still opens the node key through the old group key
    ///  and members added since cannot.
    pub async fn is_superseded(
        &self,
        node: &Name,
        version: u64,
        acl: &Acl,
    ) -> Result<bool, AccessError> {
        for group in acl.groups() {
            let current = self.groups.public_key(&group.name).await?;
            let name = self.profile.node_key_name(node, version, &current.digest());
            if self
                .store
                .get_optional(&name, self.config.probe_timeout())
                .await?
                .is_none()
            {
                tracing::debug!(
                    "{} node key v{} predates the current key of {}",
                    node,
                    version,
                    group
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Local log of versions this manager created or granted
    pub fn key_log(&self, node: &Name) -> Option<KeyLog> {
        self.logs.read().get(node).cloned()
    }

    async fn probe(
        &self,
        node: &Name,
        version: u64,
        ring: &KeyRing,
        tried: &mut BTreeSet<PrincipalDigest>,
    ) -> Result<Option<Secret>, AccessError> {
        for holder in ring.keys() {
            if !tried.insert(holder.digest()) {
                continue;
            }
            let name = self.profile.node_key_name(node, version, &holder.digest());
            let Some(data) = self
                .store
                .get_optional(&name, self.config.probe_timeout())
                .await?
            else {
                continue;
            };
            let record: WrappedKeyRecord = ContentObject::decode(&name, &data)?.record()?;
            let key = Secret::from(record.unwrap(holder)?);
            tracing::debug!("resolved {} node key v{} via {}", node, version, holder.digest());
            return Ok(Some(key));
        }
        Ok(None)
    }

    /// Groups named by any ACL version of `node`
    ///
    /// Older versions count too: a group dropped from the ACL still holds
    ///  the versions it was granted.
    async fn acl_groups(&self, node: &Name) -> Result<BTreeSet<String>, AccessError> {
        let mut groups = BTreeSet::new();
        let Some(latest) =
            latest_acl_version(&self.store, &self.profile, node, self.config.probe_timeout()).await?
        else {
            return Ok(groups);
        };
        for version in 0..=latest {
            let acl = fetch_acl(&self.store, &self.profile, node, version, self.config.timeout()).await?;
            groups.extend(acl.groups().into_iter().map(|p| p.name.clone()));
        }
        Ok(groups)
    }

    fn remember(&self, node: &Name, version: u64, key: Secret) -> Secret {
        self.keys
            .write()
            .insert((node.clone(), version), key.clone());
        key
    }

    async fn publish_version<'a>(
        &self,
        node: &Name,
        version: u64,
        principals: impl IntoIterator<Item = &'a Principal>,
    ) -> Result<Secret, AccessError> {
        let mut recipients = Vec::new();
        for principal in principals {
            recipients.push(self.groups.public_key_of(principal).await?);
        }

        let key = Secret::generate();
        try_join_all(
            recipients
                .iter()
                .map(|recipient| self.publish_wrap(node, version, &key, recipient)),
        )
        .await?;

        self.logs
            .write()
            .entry(node.clone())
            .or_default()
            .append(version, recipients.iter().map(PublicKey::digest).collect());
        Ok(self.remember(node, version, key))
    }

    async fn publish_wrap(
        &self,
        node: &Name,
        version: u64,
        key: &Secret,
        recipient: &PublicKey,
    ) -> Result<Name, AccessError> {
        let name = self
            .profile
            .node_key_name(node, version, &recipient.digest());
        let record = WrappedKeyRecord::wrap(WrappedKeyKind::NodeKey, key.bytes(), recipient)?;
        let object = ContentObject::sign_record(
            name.clone(),
            ContentType::Key,
            &record,
            self.identities.default_identity().secret_key(),
        )?;
        self.store.put(&name, object.encode()?).await?;
        Ok(name)
    }
}
