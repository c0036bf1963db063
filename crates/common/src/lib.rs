/**
 * Group-based access control for published content.
 *  ACLs bound to name-tree nodes, node keys wrapped
 *  for users and groups, revocation by rekey.
 */
pub mod access;
/**
 * Runtime configuration, loaded from TOML.
 */
pub mod config;
/**
 * Signed content objects: the unit everything
 *  is published as.
 */
pub mod content;
/**
 * Cryptographic types and operations.
 *  - Public and Private key implementations
 *  - Symmetric content encryption
 *  - Key wrapping for a principal's public key
 */
pub mod crypto;
/**
 * Per-identity entry point tying the store,
 *  identities and access control together.
 */
pub mod handle;
/**
 * Local identities: a principal name plus the
 *  private key it signs and unwraps with.
 */
pub mod identity;
/**
 * Segmented, flow-controlled publishing and
 *  reassembling reads.
 */
pub mod io;
/**
 * Hierarchical names with version and
 *  segment components.
 */
pub mod name;
/**
 * The content object store seam and an
 *  in-memory implementation.
 */
pub mod store;

pub mod prelude {
    pub use crate::access::{
        AccessControlManager, AccessError, Acl, AclOperation, NamespaceProfile, Principal, Role,
    };
    pub use crate::config::Config;
    pub use crate::crypto::{PublicKey, SecretKey};
    pub use crate::handle::Handle;
    pub use crate::identity::{Identities, Identity};
    pub use crate::io::{ContentStream, IoError, NewVersionOptions, PutOptions, Reader, Writer};
    pub use crate::name::Name;
    pub use crate::store::{ContentStore, MemoryContentStore};
}
