//! # Principals
//!
//! A principal is anything that can appear in an ACL: an individual user or a
//! group. Both hold Ed25519 keypairs; a group's private key is itself wrapped
//! for each of its members, so groups can contain groups.
//!
//! Principals are named, not keyed: the public key of a user is looked up
//! under the user namespace, and a group's key changes every time a member
//! is removed. Published records refer to the key a wrap targeted through its
//! [`PrincipalDigest`](crate::crypto::PrincipalDigest).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Group,
}

/// The role of a principal in an ACL.
///
/// Managers administer the ACL itself. Readers and writers get the node
/// key. Every role receives the node key, so a manager can also read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Manager,
    Writer,
    Reader,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Manager => write!(f, "manager"),
            Role::Writer => write!(f, "writer"),
            Role::Reader => write!(f, "reader"),
        }
    }
}

/// A user or group, identified by name within its namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub name: String,
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::User,
            name: name.into(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::Group,
            name: name.into(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == PrincipalKind::Group
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            PrincipalKind::User => write!(f, "user:{}", self.name),
            PrincipalKind::Group => write!(f, "group:{}", self.name),
        }
    }
}
