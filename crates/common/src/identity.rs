//! Local identities
//!
//! An [`Identity`] is a user principal together with its private key. A
//! handle carries one default identity and may hold others to publish under.

use std::collections::BTreeMap;
use std::fmt;

use crate::access::Principal;
use crate::crypto::{PrincipalDigest, PublicKey, SecretKey};

#[derive(Clone)]
pub struct Identity {
    principal: Principal,
    secret_key: SecretKey,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("principal", &self.principal)
            .field("digest", &self.digest())
            .finish()
    }
}

impl Identity {
    pub fn new(name: impl Into<String>, secret_key: SecretKey) -> Self {
        Self {
            principal: Principal::user(name),
            secret_key,
        }
    }

    /// A user identity with a freshly generated keypair
    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(name, SecretKey::generate())
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn name(&self) -> &str {
        &self.principal.name
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret_key.public()
    }

    pub fn digest(&self) -> PrincipalDigest {
        self.secret_key.digest()
    }
}

/// The identities a handle can publish under
#[derive(Debug, Clone)]
pub struct Identities {
    default: Identity,
    others: BTreeMap<PrincipalDigest, Identity>,
}

impl Identities {
    pub fn new(default: Identity) -> Self {
        Self {
            default,
            others: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, identity: Identity) {
        self.others.insert(identity.digest(), identity);
    }

    pub fn default_identity(&self) -> &Identity {
        &self.default
    }

    pub fn get(&self, digest: &PrincipalDigest) -> Option<&Identity> {
        if *digest == self.default.digest() {
            return Some(&self.default);
        }
        self.others.get(digest)
    }

    /// The default identity first, then the others
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        std::iter::once(&self.default).chain(self.others.values())
    }
}
