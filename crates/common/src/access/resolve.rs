//! # Key resolution
//!
//! Wrapped keys form a graph: a node key version is wrapped for users and
//! groups, a group key version is wrapped for users and other groups. A
//! reader starts from the private keys it holds and follows wrap edges
//! until it can open the record it wants.
//!
//! ```text
//! node key v2 <- wrapped for <- group "staff" key v0 <- wrapped for <- Bob
//!                                      ^
//!                                      +-- wrapped for <- group "interns" key v1 <- Carol
//! ```
//!
//! Resolution runs in two phases. Discovery walks the membership records
//! breadth-first from the groups named in an ACL, bounded by a depth limit
//! and guarded by a visited set, so cyclic memberships terminate. Unlocking
//! then repeatedly probes each discovered group key version for a record
//! wrapped under a key already in the [`KeyRing`], until a full pass adds
//! nothing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::error::AccessError;
use super::groups::GroupDirectory;
use crate::crypto::{PrincipalDigest, SecretKey};
use crate::identity::Identities;
use crate::store::ContentStore;

/// The private keys available to one resolution
#[derive(Clone, Default)]
pub struct KeyRing {
    keys: BTreeMap<PrincipalDigest, SecretKey>,
    group_keys: BTreeSet<(String, u64)>,
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing")
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .field("group_keys", &self.group_keys)
            .finish()
    }
}

impl KeyRing {
    /// A ring holding the keys of every local identity
    pub fn from_identities(identities: &Identities) -> Self {
        let mut ring = Self::default();
        for identity in identities.iter() {
            ring.insert(identity.secret_key().clone());
        }
        ring
    }

    pub fn insert(&mut self, key: SecretKey) -> bool {
        self.keys.insert(key.digest(), key).is_none()
    }

    pub fn insert_group_key(&mut self, group: &str, version: u64, key: SecretKey) -> bool {
        self.group_keys.insert((group.to_string(), version));
        self.insert(key)
    }

    pub fn holds_group_key(&self, group: &str, version: u64) -> bool {
        self.group_keys.contains(&(group.to_string(), version))
    }

    pub fn get(&self, digest: &PrincipalDigest) -> Option<&SecretKey> {
        self.keys.get(digest)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SecretKey> {
        self.keys.values()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Groups reachable from `roots` through group membership, shallowest first
///
/// Roots sit at depth 0. Members deeper than `max_depth` are not followed.
pub(crate) async fn reachable_groups<S: ContentStore>(
    groups: &GroupDirectory<S>,
    roots: impl IntoIterator<Item = String>,
    max_depth: usize,
) -> Result<Vec<String>, AccessError> {
    let mut visited = BTreeSet::new();
    let mut reachable = Vec::new();
    let mut queue: VecDeque<(String, usize)> = roots.into_iter().map(|g| (g, 0)).collect();

    while let Some((group, depth)) = queue.pop_front() {
        if !visited.insert(group.clone()) {
            continue;
        }
        reachable.push(group.clone());

        let members = groups.member_groups(&group).await?;
        if depth >= max_depth {
            if !members.is_empty() {
                tracing::warn!(
                    "group depth limit {} reached at {}, not following {} nested groups",
                    max_depth,
                    group,
                    members.len()
                );
            }
            continue;
        }
        for member in members {
            if !visited.contains(&member) {
                queue.push_back((member, depth + 1));
            }
        }
    }

    Ok(reachable)
}

/// Unwrap every key version of `reachable` the ring can open, adding each
///  one to the ring as it goes
///
/// # Returns
/// * the number of group key versions newly unlocked
pub(crate) async fn unlock_groups<S: ContentStore>(
    groups: &GroupDirectory<S>,
    ring: &mut KeyRing,
    reachable: &[String],
) -> Result<usize, AccessError> {
    let mut tried = BTreeSet::new();
    let mut latest = BTreeMap::new();
    for group in reachable {
        if let Some(version) = groups.latest_key_version(group).await? {
            latest.insert(group.as_str(), version);
        }
    }

    let mut unlocked = 0;
    loop {
        let mut progress = false;
        for (group, latest) in &latest {
            for version in 0..=*latest {
                if ring.holds_group_key(group, version) {
                    continue;
                }
                let holders: Vec<SecretKey> = ring.keys().cloned().collect();
                for holder in holders {
                    if !tried.insert((group.to_string(), version, holder.digest())) {
                        continue;
                    }
                    if let Some(key) = groups.probe_group_key(group, version, &holder).await? {
                        tracing::debug!("unlocked group {} key v{}", group, version);
                        ring.insert_group_key(group, version, key);
                        unlocked += 1;
                        progress = true;
                        break;
                    }
                }
            }
        }
        if !progress {
            break;
        }
    }

    Ok(unlocked)
}
