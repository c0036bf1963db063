//! # Namespace profiles
//!
//! A protected domain announces how it is protected with a marker object at
//! `<domain>/%C1.M.POLICY`. The marker names the namespaces users and groups
//! publish their keys under, and tags the access control scheme in use.
//!
//! Every record the access layer publishes lives at a name derived here:
//!
//! ```text
//! <domain>/%C1.M.POLICY                         profile marker
//! <users>/<name>/%C1.M.KEY                      user public key
//! <groups>/<group>/%C1.M.GK/%FD<v>              group public key, version v
//! <groups>/<group>/%C1.M.GK/%FD<v>/<digest>     group private key v, wrapped
//! <groups>/<group>/%C1.M.MEMBERS/%FD<v>         group membership
//! <node>/%C1.M.acl/%FD<v>                       acl
//! <node>/%C1.M.nodekey/%FD<v>/<digest>          node key v, wrapped
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AccessError;
use crate::content::{ContentObject, ContentType};
use crate::crypto::PrincipalDigest;
use crate::identity::Identity;
use crate::name::{Component, Name};
use crate::store::ContentStore;

pub const POLICY_MARKER: &[u8] = b"\xC1.M.POLICY";
pub const ACL_MARKER: &[u8] = b"\xC1.M.acl";
pub const NODE_KEY_MARKER: &[u8] = b"\xC1.M.nodekey";
pub const USER_KEY_MARKER: &[u8] = b"\xC1.M.KEY";
pub const GROUP_KEY_MARKER: &[u8] = b"\xC1.M.GK";
pub const MEMBERS_MARKER: &[u8] = b"\xC1.M.MEMBERS";

/// The only access control scheme this crate implements
pub const GROUP_ACM_TAG: &str = "group";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceProfile {
    pub domain: Name,
    pub user_namespace: Name,
    pub group_namespace: Name,
    pub acm_tag: String,
}

impl NamespaceProfile {
    /// Group-based profile with users under `<domain>/Users` and groups
    ///  under `<domain>/Groups`
    pub fn new(domain: Name) -> Self {
        Self {
            user_namespace: domain.child("Users"),
            group_namespace: domain.child("Groups"),
            domain,
            acm_tag: GROUP_ACM_TAG.to_string(),
        }
    }

    pub fn with_namespaces(domain: Name, user_namespace: Name, group_namespace: Name) -> Self {
        Self {
            domain,
            user_namespace,
            group_namespace,
            acm_tag: GROUP_ACM_TAG.to_string(),
        }
    }

    pub fn marker_name(domain: &Name) -> Name {
        domain.child(POLICY_MARKER)
    }

    /// True for names the access layer itself publishes, which are never
    ///  encrypted
    pub fn is_access_record(name: &Name) -> bool {
        name.components().iter().any(|c| {
            let bytes = c.as_bytes();
            bytes == POLICY_MARKER
                || bytes == ACL_MARKER
                || bytes == NODE_KEY_MARKER
                || bytes == USER_KEY_MARKER
                || bytes == GROUP_KEY_MARKER
                || bytes == MEMBERS_MARKER
        })
    }

    pub fn user_key_name(&self, user: &str) -> Name {
        self.user_namespace.child(user).child(USER_KEY_MARKER)
    }

    pub fn group_key_base(&self, group: &str) -> Name {
        self.group_namespace.child(group).child(GROUP_KEY_MARKER)
    }

    pub fn group_key_name(&self, group: &str, version: u64) -> Name {
        self.group_key_base(group).with_version(version)
    }

    pub fn group_wrap_name(&self, group: &str, version: u64, member: &PrincipalDigest) -> Name {
        self.group_key_name(group, version)
            .child(digest_component(member))
    }

    pub fn members_base(&self, group: &str) -> Name {
        self.group_namespace.child(group).child(MEMBERS_MARKER)
    }

    pub fn members_name(&self, group: &str, version: u64) -> Name {
        self.members_base(group).with_version(version)
    }

    pub fn acl_base(&self, node: &Name) -> Name {
        node.child(ACL_MARKER)
    }

    pub fn acl_name(&self, node: &Name, version: u64) -> Name {
        self.acl_base(node).with_version(version)
    }

    pub fn node_key_base(&self, node: &Name) -> Name {
        node.child(NODE_KEY_MARKER)
    }

    pub fn node_key_name(&self, node: &Name, version: u64, holder: &PrincipalDigest) -> Name {
        self.node_key_base(node)
            .with_version(version)
            .child(digest_component(holder))
    }

    /// Publish the marker at `<domain>/%C1.M.POLICY`
    pub async fn publish<S: ContentStore>(
        &self,
        store: &S,
        publisher: &Identity,
    ) -> Result<Name, AccessError> {
        let name = Self::marker_name(&self.domain);
        let object =
            ContentObject::sign_record(name.clone(), ContentType::Link, self, publisher.secret_key())?;
        store.put(&name, object.encode()?).await?;
        tracing::info!("published namespace profile for {}", self.domain);
        Ok(name)
    }

    /// Walk from `name` up to the root and return the first profile marker
    ///
    /// Each lookup waits at most `timeout`; a marker that does not show up
    ///  in time counts as absent.
    pub async fn find<S: ContentStore>(
        store: &S,
        name: &Name,
        timeout: Duration,
    ) -> Result<Self, AccessError> {
        for domain in name.ancestors() {
            let marker = Self::marker_name(&domain);
            if let Some(data) = store.get_optional(&marker, timeout).await? {
                let profile: NamespaceProfile = ContentObject::decode(&marker, &data)?.record()?;
                if profile.domain != domain {
                    return Err(AccessError::InvalidAcl(format!(
                        "profile at {} claims domain {}",
                        marker, profile.domain
                    )));
                }
                tracing::debug!("found namespace profile for {} at {}", name, domain);
                return Ok(profile);
            }
        }
        Err(AccessError::NoNamespaceProfile(name.clone()))
    }
}

fn digest_component(digest: &PrincipalDigest) -> Component {
    Component::new(digest.as_bytes().to_vec())
}
