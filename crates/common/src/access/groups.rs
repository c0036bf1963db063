//! # Groups
//!
//! A group is a principal with its own versioned keypair. Each key version's
//! private key is wrapped for every member at the time the version was
//! created, and for members added while it is current. Members may be users
//! or other groups, so access can flow through several hops.
//!
//! Removing a member rekeys the group: a new version is generated and wrapped
//! for the remaining members only. Earlier versions stay readable to whoever
//! held them, which is what keeps previously granted node keys reachable.
//!
//! Membership changes need the current group private key, so only a member
//! (directly or through another group) can change a group.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use futures::future::try_join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::directory::UserDirectory;
use super::error::AccessError;
use super::key_log::KeyLog;
use super::principal::{Principal, PrincipalKind};
use super::profile::NamespaceProfile;
use super::resolve::{reachable_groups, unlock_groups, KeyRing};
use crate::config::Config;
use crate::content::{ContentObject, ContentType};
use crate::crypto::{PrincipalDigest, PublicKey, SecretKey, WrappedKeyKind, WrappedKeyRecord};
use crate::identity::{Identities, Identity};
use crate::name::Name;
use crate::store::ContentStore;

/// Published public key of one group key version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupKeyRecord {
    pub group: String,
    pub version: u64,
    pub public_key: PublicKey,
}

/// Published membership of a group
///
/// `key_version` is the group key version current when this membership was
///  published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group: String,
    pub version: u64,
    pub key_version: u64,
    pub members: BTreeSet<Principal>,
}

#[derive(Debug, Clone)]
pub struct GroupDirectory<S: ContentStore> {
    store: S,
    profile: NamespaceProfile,
    users: UserDirectory<S>,
    identities: Identities,
    config: Config,
    logs: Arc<RwLock<HashMap<String, KeyLog>>>,
    /// Group private keys this directory has created or unwrapped
    unlocked: Arc<RwLock<BTreeMap<(String, u64), SecretKey>>>,
    /// Memberships are immutable per version
    memberships: Arc<RwLock<HashMap<(String, u64), GroupMembership>>>,
}

impl<S: ContentStore> GroupDirectory<S> {
    pub fn new(
        store: S,
        profile: NamespaceProfile,
        users: UserDirectory<S>,
        identities: Identities,
        config: Config,
    ) -> Self {
        Self {
            store,
            profile,
            users,
            identities,
            config,
            logs: Arc::new(RwLock::new(HashMap::new())),
            unlocked: Arc::new(RwLock::new(BTreeMap::new())),
            memberships: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn publisher(&self) -> &Identity {
        self.identities.default_identity()
    }

    /// Create `group` with key version 0 wrapped for `members`
    pub async fn create_group(
        &self,
        group: &str,
        members: impl IntoIterator<Item = Principal>,
    ) -> Result<u64, AccessError> {
        if self.latest_membership(group).await?.is_some() {
            return Err(AccessError::GroupExists(Principal::group(group)));
        }
        let members: BTreeSet<Principal> = members.into_iter().collect();

        let key = SecretKey::generate();
        let wrapped_for = self.publish_key_version(group, 0, &key, &members).await?;
        self.publish_membership(group, 0, 0, members).await?;

        self.logs
            .write()
            .entry(group.to_string())
            .or_default()
            .append(0, wrapped_for);
        self.remember(group, 0, key);
        tracing::info!("created group {}", group);
        Ok(0)
    }

    /// Grant `member` the current group key
    ///
    /// # Returns
    /// * the membership version now current
    pub async fn add_member(&self, group: &str, member: Principal) -> Result<u64, AccessError> {
        let membership = self
            .latest_membership(group)
            .await?
            .ok_or_else(|| AccessError::NotAGroup(Principal::group(group)))?;
        if membership.members.contains(&member) {
            return Ok(membership.version);
        }

        let key_version = membership.key_version;
        let key = self.group_key(group, key_version).await?;
        let public_key = self.public_key_of(&member).await?;
        self.publish_wrap(group, key_version, &key, &public_key)
            .await?;

        let mut members = membership.members;
        members.insert(member.clone());
        let version = membership.version + 1;
        self.publish_membership(group, version, key_version, members)
            .await?;

        self.logs
            .write()
            .entry(group.to_string())
            .or_default()
            .grant(key_version, public_key.digest());
        tracing::info!("added {} to group {}", member, group);
        Ok(version)
    }

    /// Drop `member` and rekey the group for everyone left
    ///
    /// # Returns
    /// * the new group key version
    pub async fn remove_member(&self, group: &str, member: &Principal) -> Result<u64, AccessError> {
        let membership = self
            .latest_membership(group)
            .await?
            .ok_or_else(|| AccessError::NotAGroup(Principal::group(group)))?;
        if !membership.members.contains(member) {
            return Err(AccessError::NotAMember {
                group: Principal::group(group),
                member: member.clone(),
            });
        }
        // only someone holding the current key may change the group
        self.group_key(group, membership.key_version).await?;

        let mut members = membership.members;
        members.remove(member);
        let key_version = membership.key_version + 1;
        let key = SecretKey::generate();
        let wrapped_for = self
            .publish_key_version(group, key_version, &key, &members)
            .await?;
        self.publish_membership(group, membership.version + 1, key_version, members)
            .await?;

        self.logs
            .write()
            .entry(group.to_string())
            .or_default()
            .append(key_version, wrapped_for);
        self.remember(group, key_version, key);
        tracing::info!(
            "removed {} from group {}, rekeyed to v{}",
            member,
            group,
            key_version
        );
        Ok(key_version)
    }

    pub async fn members(&self, group: &str) -> Result<BTreeSet<Principal>, AccessError> {
        self.latest_membership(group)
            .await?
            .map(|m| m.members)
            .ok_or_else(|| AccessError::NotAGroup(Principal::group(group)))
    }

    pub async fn current_key_version(&self, group: &str) -> Result<u64, AccessError> {
        self.latest_key_version(group)
            .await?
            .ok_or_else(|| AccessError::NotAGroup(Principal::group(group)))
    }

    /// Public key of the current group key version
    pub async fn public_key(&self, group: &str) -> Result<PublicKey, AccessError> {
        let version = self.current_key_version(group).await?;
        Ok(self.key_record(group, version).await?.public_key)
    }

    /// The key new wraps for `principal` should target
    pub async fn public_key_of(&self, principal: &Principal) -> Result<PublicKey, AccessError> {
        match principal.kind {
            PrincipalKind::User => self.users.user_key(&principal.name).await,
            PrincipalKind::Group => match self.public_key(&principal.name).await {
                Err(AccessError::NotAGroup(p)) => Err(AccessError::UnknownPrincipal(p)),
                other => other,
            },
        }
    }

    /// True if `principal` is a current member of `group`, directly or
    ///  through nested groups
    pub async fn is_member_transitive(
        &self,
        group: &str,
        principal: &Principal,
    ) -> Result<bool, AccessError> {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([(group.to_string(), 0usize)]);
        while let Some((group, depth)) = queue.pop_front() {
            if !visited.insert(group.clone()) {
                continue;
            }
            let Some(membership) = self.latest_membership(&group).await? else {
                continue;
            };
            if membership.members.contains(principal) {
                return Ok(true);
            }
            if depth >= self.config.max_group_depth {
                continue;
            }
            for member in membership.members.into_iter().filter(Principal::is_group) {
                queue.push_back((member.name, depth + 1));
            }
        }
        Ok(false)
    }

    /// The private key of `group` at `version`, unwrapped through whatever
    ///  chain of memberships the local identities have
    pub async fn group_key(&self, group: &str, version: u64) -> Result<SecretKey, AccessError> {
        if let Some(key) = self.cached_key(group, version) {
            return Ok(key);
        }
        let mut ring = self.key_ring();
        self.unlock([group.to_string()], &mut ring).await?;
        self.cached_key(group, version)
            .ok_or_else(|| AccessError::AccessDenied(self.profile.group_key_name(group, version)))
    }

    /// Local identities plus every group key unlocked so far
    pub fn key_ring(&self) -> KeyRing {
        let mut ring = KeyRing::from_identities(&self.identities);
        for ((group, version), key) in self.unlocked.read().iter() {
            ring.insert_group_key(group, *version, key.clone());
        }
        ring
    }

    /// Extend `ring` with every group key reachable from `roots`
    pub(crate) async fn unlock(
        &self,
        roots: impl IntoIterator<Item = String>,
        ring: &mut KeyRing,
    ) -> Result<usize, AccessError> {
        let reachable = reachable_groups(self, roots, self.config.max_group_depth).await?;
        unlock_groups(self, ring, &reachable).await
    }

    /// Local log of the key versions this directory created or granted
    pub fn key_log(&self, group: &str) -> Option<KeyLog> {
        self.logs.read().get(group).cloned()
    }

    /// Group members of `group` across every membership version
    pub(crate) async fn member_groups(&self, group: &str) -> Result<BTreeSet<String>, AccessError> {
        let Some(latest) = self.latest_membership_version(group).await? else {
            return Ok(BTreeSet::new());
        };
        let mut groups = BTreeSet::new();
        for version in 0..=latest {
            let membership = self.membership_at(group, version).await?;
            groups.extend(
                membership
                    .members
                    .into_iter()
                    .filter(Principal::is_group)
                    .map(|p| p.name),
            );
        }
        Ok(groups)
    }

    pub(crate) async fn latest_key_version(&self, group: &str) -> Result<Option<u64>, AccessError> {
        let latest = self
            .store
            .get_latest_version(&self.profile.group_key_base(group), self.config.probe_timeout())
            .await?;
        Ok(latest.and_then(|name| name.version()))
    }

    /// Try to open the record of `group` key `version` wrapped for `holder`
    pub(crate) async fn probe_group_key(
        &self,
        group: &str,
        version: u64,
        holder: &SecretKey,
    ) -> Result<Option<SecretKey>, AccessError> {
        let name = self.profile.group_wrap_name(group, version, &holder.digest());
        let Some(data) = self
            .store
            .get_optional(&name, self.config.probe_timeout())
            .await?
        else {
            return Ok(None);
        };
        let record: WrappedKeyRecord = ContentObject::decode(&name, &data)?.record()?;
        let key = SecretKey::from(record.unwrap(holder)?);

        let published = self.key_record(group, version).await?;
        if key.public() != published.public_key {
            tracing::warn!(
                "wrapped key at {} does not match group {} v{}, ignoring",
                name,
                group,
                version
            );
            return Ok(None);
        }
        self.remember(group, version, key.clone());
        Ok(Some(key))
    }

    fn cached_key(&self, group: &str, version: u64) -> Option<SecretKey> {
        self.unlocked
            .read()
            .get(&(group.to_string(), version))
            .cloned()
    }

    fn remember(&self, group: &str, version: u64, key: SecretKey) {
        self.unlocked
            .write()
            .insert((group.to_string(), version), key);
    }

    async fn key_record(&self, group: &str, version: u64) -> Result<GroupKeyRecord, AccessError> {
        let name = self.profile.group_key_name(group, version);
        let data = self.store.get(&name, self.config.timeout()).await?;
        Ok(ContentObject::decode(&name, &data)?.record()?)
    }

    async fn latest_membership_version(&self, group: &str) -> Result<Option<u64>, AccessError> {
        let latest = self
            .store
            .get_latest_version(&self.profile.members_base(group), self.config.probe_timeout())
            .await?;
        Ok(latest.and_then(|name| name.version()))
    }

    async fn latest_membership(&self, group: &str) -> Result<Option<GroupMembership>, AccessError> {
        match self.latest_membership_version(group).await? {
            Some(version) => Ok(Some(self.membership_at(group, version).await?)),
            None => Ok(None),
        }
    }

    async fn membership_at(&self, group: &str, version: u64) -> Result<GroupMembership, AccessError> {
        let cache_key = (group.to_string(), version);
        if let Some(membership) = self.memberships.read().get(&cache_key) {
            return Ok(membership.clone());
        }
        let name = self.profile.members_name(group, version);
        let data = self.store.get(&name, self.config.timeout()).await?;
        let membership: GroupMembership = ContentObject::decode(&name, &data)?.record()?;
        self.memberships
            .write()
            .insert(cache_key, membership.clone());
        Ok(membership)
    }

    /// Publish the public half of `key` and wrap the private half for
    ///  each member
    async fn publish_key_version(
        &self,
        group: &str,
        version: u64,
        key: &SecretKey,
        members: &BTreeSet<Principal>,
    ) -> Result<BTreeSet<PrincipalDigest>, AccessError> {
        let mut recipients = Vec::with_capacity(members.len());
        for member in members {
            recipients.push(self.public_key_of(member).await?);
        }

        let name = self.profile.group_key_name(group, version);
        let record = GroupKeyRecord {
            group: group.to_string(),
            version,
            public_key: key.public(),
        };
        let object = ContentObject::sign_record(
            name.clone(),
            ContentType::Key,
            &record,
            self.publisher().secret_key(),
        )?;
        self.store.put(&name, object.encode()?).await?;

        try_join_all(
            recipients
                .iter()
                .map(|recipient| self.publish_wrap(group, version, key, recipient)),
        )
        .await?;
        Ok(recipients.iter().map(PublicKey::digest).collect())
    }

    async fn publish_wrap(
        &self,
        group: &str,
        version: u64,
        key: &SecretKey,
        recipient: &PublicKey,
    ) -> Result<Name, AccessError> {
        let name = self
            .profile
            .group_wrap_name(group, version, &recipient.digest());
        let record = WrappedKeyRecord::wrap(WrappedKeyKind::GroupKey, &key.to_bytes(), recipient)?;
        let object = ContentObject::sign_record(
            name.clone(),
            ContentType::Key,
            &record,
            self.publisher().secret_key(),
        )?;
        self.store.put(&name, object.encode()?).await?;
        Ok(name)
    }

    async fn publish_membership(
        &self,
        group: &str,
        version: u64,
        key_version: u64,
        members: BTreeSet<Principal>,
    ) -> Result<(), AccessError> {
        let name = self.profile.members_name(group, version);
        let membership = GroupMembership {
            group: group.to_string(),
            version,
            key_version,
            members,
        };
        let object = ContentObject::sign_record(
            name.clone(),
            ContentType::Link,
            &membership,
            self.publisher().secret_key(),
        )?;
        self.store.put(&name, object.encode()?).await?;
        self.memberships
            .write()
            .insert((group.to_string(), version), membership);
        Ok(())
    }
}
