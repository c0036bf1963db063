//! Group-based access control
//!
//! A manager attaches an [`Acl`] to a node of the name tree. Everything at or
//! below the node (down to the next protected node) is then encrypted under
//! the node's key, and that key is wrapped for every principal with a role.
//! Principals are users or [groups](GroupDirectory); reading through a group
//! means first unwrapping the group's private key.
//!
//! ```text
//! /parc.com                                <- namespace profile marker
//!   /Users/Alice/%C1.M.KEY                 <- user public keys
//!   /Groups/staff/%C1.M.GK/...             <- group keys
//!   /docs/%C1.M.acl/%FD..                  <- acl on /parc.com/docs
//!   /docs/%C1.M.nodekey/%FD../<digest>     <- node key, wrapped per principal
//!   /docs/report/%FD../%00..               <- encrypted content
//! ```
//!
//! [`AccessControlManager`] is the entry point; the other types are its
//! parts.

mod acl;
mod directory;
mod error;
mod groups;
mod key_log;
mod manager;
mod node_keys;
mod principal;
mod profile;
mod resolve;

pub use acl::{Acl, AclEntry, AclOperation};
pub use directory::{UserDirectory, UserKeyRecord};
pub use error::{AccessError, AclUpdateReport};
pub use groups::{GroupDirectory, GroupKeyRecord, GroupMembership};
pub use key_log::{KeyGrant, KeyLog, KeyVersion};
pub use manager::{data_key, AccessControlManager, ProtectionKey};
pub use node_keys::NodeKeyManager;
pub use principal::{Principal, PrincipalKind, Role};
pub use profile::{NamespaceProfile, GROUP_ACM_TAG};
pub use resolve::KeyRing;
