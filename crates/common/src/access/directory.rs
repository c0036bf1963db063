use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::error::AccessError;
use super::principal::Principal;
use super::profile::NamespaceProfile;
use crate::content::{ContentObject, ContentType};
use crate::crypto::PublicKey;
use crate::identity::Identity;
use crate::name::Name;
use crate::store::ContentStore;

/// Published form of a user's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKeyRecord {
    pub user: String,
    pub public_key: PublicKey,
}

/// Lookup of user public keys under a profile's user namespace
///
/// Provisioning users is somebody else's job; this only publishes the key of
///  a local identity and reads keys others have published. Keys are cached
///  per user name for the lifetime of the directory.
#[derive(Debug, Clone)]
pub struct UserDirectory<S: ContentStore> {
    store: S,
    profile: NamespaceProfile,
    timeout: Duration,
    cache: Arc<RwLock<HashMap<String, PublicKey>>>,
}

impl<S: ContentStore> UserDirectory<S> {
    pub fn new(store: S, profile: NamespaceProfile, timeout: Duration) -> Self {
        Self {
            store,
            profile,
            timeout,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish the public key of `identity`, self-signed
    pub async fn publish_user_key(&self, identity: &Identity) -> Result<Name, AccessError> {
        let name = self.profile.user_key_name(identity.name());
        let record = UserKeyRecord {
            user: identity.name().to_string(),
            public_key: identity.public_key(),
        };
        let object =
            ContentObject::sign_record(name.clone(), ContentType::Key, &record, identity.secret_key())?;
        self.store.put(&name, object.encode()?).await?;
        self.cache
            .write()
            .insert(record.user.clone(), record.public_key);
        tracing::debug!("published key for user {}", record.user);
        Ok(name)
    }

    /// The published public key of `user`
    pub async fn user_key(&self, user: &str) -> Result<PublicKey, AccessError> {
        if let Some(key) = self.cache.read().get(user) {
            return Ok(*key);
        }

        let name = self.profile.user_key_name(user);
        let data = match self.store.get(&name, self.timeout).await {
            Ok(data) => data,
            Err(e) if e.is_timeout() => {
                return Err(AccessError::UnknownPrincipal(Principal::user(user)));
            }
            Err(e) => return Err(e.into()),
        };
        let object = ContentObject::decode(&name, &data)?;
        let record: UserKeyRecord = object.record()?;
        // user keys are self-signed
        if object.publisher() != &record.public_key || record.user != user {
            return Err(AccessError::UnknownPrincipal(Principal::user(user)));
        }

        self.cache.write().insert(user.to_string(), record.public_key);
        Ok(record.public_key)
    }

    pub fn profile(&self) -> &NamespaceProfile {
        &self.profile
    }
}
