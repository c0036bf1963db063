//! Shared test utilities for access control integration tests
#![allow(dead_code)]

use std::io::Read;

use common::access::{AccessControlManager, NamespaceProfile};
use common::config::Config;
use common::handle::Handle;
use common::identity::Identity;
use common::io::{IoError, PutOptions};
use common::name::Name;
use common::store::MemoryContentStore;
use tracing_subscriber::EnvFilter;

pub const DOMAIN: &str = "/parc.com";

/// Install a test subscriber once; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A protected domain with three users, all sharing one store
pub struct Domain {
    pub store: MemoryContentStore,
    pub profile: NamespaceProfile,
    pub config: Config,
    pub alice: Handle<MemoryContentStore>,
    pub bob: Handle<MemoryContentStore>,
    pub carol: Handle<MemoryContentStore>,
}

/// Publish the domain's profile, then register Alice, Bob and Carol
pub async fn setup_domain(config: Config) -> Domain {
    init_tracing();
    let store = MemoryContentStore::new();
    let profile = NamespaceProfile::new(name(DOMAIN));

    let alice = Handle::new(store.clone(), Identity::generate("Alice"), config.clone()).unwrap();
    profile.publish(&store, alice.identity()).await.unwrap();

    let domain = Domain {
        bob: Handle::new(store.clone(), Identity::generate("Bob"), config.clone()).unwrap(),
        carol: Handle::new(store.clone(), Identity::generate("Carol"), config.clone()).unwrap(),
        store,
        profile,
        config,
        alice,
    };
    for handle in [&domain.alice, &domain.bob, &domain.carol] {
        handle.publish_identities(&domain.profile.domain).await.unwrap();
    }
    domain
}

impl Domain {
    /// Register one more user in the domain
    pub async fn user(&self, user: &str) -> Handle<MemoryContentStore> {
        self.user_with_config(user, self.config.clone()).await
    }

    pub async fn user_with_config(&self, user: &str, config: Config) -> Handle<MemoryContentStore> {
        let handle = Handle::new(self.store.clone(), Identity::generate(user), config).unwrap();
        handle
            .publish_identities(&self.profile.domain)
            .await
            .unwrap();
        handle
    }

    /// `path` below the domain
    pub fn name(&self, path: &str) -> Name {
        name(&format!("{}/{}", DOMAIN, path))
    }
}

pub fn name(uri: &str) -> Name {
    Name::parse(uri).unwrap()
}

pub async fn acm(handle: &Handle<MemoryContentStore>) -> AccessControlManager<MemoryContentStore> {
    handle.access_control(&name(DOMAIN)).await.unwrap()
}

/// Deterministic test payload
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

/// Publish `data` at `name` and wait for the store to acknowledge it
pub async fn write(handle: &Handle<MemoryContentStore>, name: &Name, data: &[u8]) -> Name {
    let mut writer = handle.writer();
    let versioned = writer
        .put(name, data, PutOptions::default())
        .await
        .unwrap();
    writer.close().await.unwrap();
    versioned
}

/// Open `name` and read it to the end through `std::io::Read`
pub async fn read(handle: &Handle<MemoryContentStore>, name: &Name) -> Result<Vec<u8>, IoError> {
    let mut stream = handle.reader().open(name).await?;
    let mut data = Vec::new();
    stream.read_to_end(&mut data).unwrap();
    Ok(data)
}
