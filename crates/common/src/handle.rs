use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::access::{AccessControlManager, AccessError, NamespaceProfile, ProtectionKey};
use crate::config::{Config, ConfigError};
use crate::identity::{Identities, Identity};
use crate::io::{Reader, Writer};
use crate::name::Name;
use crate::store::ContentStore;

/// One identity's view of the network
///
/// Bundles the store, the local identities and the config, and caches the
///  access control manager of each protected domain it has touched.
#[derive(Debug, Clone)]
pub struct Handle<S: ContentStore> {
    store: S,
    identities: Identities,
    config: Config,
    /// domain -> manager
    managers: Arc<RwLock<HashMap<Name, AccessControlManager<S>>>>,
}

impl<S: ContentStore> Handle<S> {
    pub fn new(store: S, identity: Identity, config: Config) -> Result<Self, ConfigError> {
        Self::with_identities(store, Identities::new(identity), config)
    }

    /// Fails if `config` does not validate; a zero block size or flow
    ///  capacity would leave every writer stuck
    pub fn with_identities(
        store: S,
        identities: Identities,
        config: Config,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            identities,
            config,
            managers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn identities(&self) -> &Identities {
        &self.identities
    }

    /// The default identity
    pub fn identity(&self) -> &Identity {
        self.identities.default_identity()
    }

    /// Add another identity to publish under
    ///
    /// Cached managers are dropped so that key resolution sees the new key.
    pub fn add_identity(&mut self, identity: Identity) {
        self.identities.add(identity);
        self.managers = Arc::new(RwLock::new(HashMap::new()));
    }

    pub fn writer(&self) -> Writer<S> {
        Writer::new(self.clone())
    }

    pub fn reader(&self) -> Reader<S> {
        Reader::new(self.clone())
    }

    /// The access control manager of the domain covering `name`
    pub async fn access_control(&self, name: &Name) -> Result<AccessControlManager<S>, AccessError> {
        let cached = self
            .managers
            .read()
            .iter()
            .filter(|(domain, _)| name.starts_with(domain))
            .max_by_key(|(domain, _)| domain.len())
            .map(|(_, acm)| acm.clone());
        if let Some(acm) = cached {
            return Ok(acm);
        }

        let acm = AccessControlManager::find(
            self.store.clone(),
            self.identities.clone(),
            self.config.clone(),
            name,
        )
        .await?;
        self.managers
            .write()
            .insert(acm.profile().domain.clone(), acm.clone());
        Ok(acm)
    }

    /// The key new content at `name` should be encrypted under, if any
    ///
    /// Names outside every protected domain, and the access layer's own
    ///  records, are published in the clear.
    pub async fn protection_key(&self, name: &Name) -> Result<Option<ProtectionKey>, AccessError> {
        if NamespaceProfile::is_access_record(name) {
            return Ok(None);
        }
        match self.access_control(name).await {
            Ok(acm) => acm.resolve_protection_key(name).await,
            Err(AccessError::NoNamespaceProfile(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Publish the public key of every local identity under the user
    ///  namespace of the domain covering `name`
    pub async fn publish_identities(&self, name: &Name) -> Result<(), AccessError> {
        let acm = self.access_control(name).await?;
        for identity in self.identities.iter() {
            acm.users().publish_user_key(identity).await?;
        }
        Ok(())
    }
}
