//! Finding the namespace profile that covers a name

mod common;

use std::time::Duration;

use ::common::access::{AccessError, NamespaceProfile};
use ::common::config::Config;
use ::common::handle::Handle;
use ::common::identity::Identity;
use ::common::store::MemoryContentStore;

#[tokio::test]
async fn test_profile_found_from_deep_name() {
    let domain = common::setup_domain(Config::default()).await;
    let deep = domain.name("projects/widget/plans/v2/draft");

    let profile = NamespaceProfile::find(&domain.store, &deep, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(profile, domain.profile);
    assert_eq!(profile.user_namespace, domain.name("Users"));

    let acm = domain.bob.access_control(&deep).await.unwrap();
    assert_eq!(acm.profile().domain, common::name(common::DOMAIN));
}

#[tokio::test]
async fn test_nested_domain_wins() {
    let domain = common::setup_domain(Config::default()).await;
    let inner = NamespaceProfile::new(domain.name("labs"));
    inner
        .publish(&domain.store, domain.alice.identity())
        .await
        .unwrap();

    let profile = NamespaceProfile::find(&domain.store, &domain.name("labs/notes"), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(profile.domain, domain.name("labs"));

    let outer = NamespaceProfile::find(&domain.store, &domain.name("other"), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(outer.domain, common::name(common::DOMAIN));
}

#[tokio::test]
async fn test_names_outside_any_domain() {
    common::init_tracing();
    let store = MemoryContentStore::new();
    let handle = Handle::new(store.clone(), Identity::generate("Alice"), Config::default()).unwrap();
    let name = common::name("/elsewhere/notes");

    let err = handle.access_control(&name).await.unwrap_err();
    assert!(matches!(err, AccessError::NoNamespaceProfile(_)));
    assert!(handle.protection_key(&name).await.unwrap().is_none());

    let versioned = common::write(&handle, &name, b"in the clear").await;
    assert_eq!(common::read(&handle, &versioned).await.unwrap(), b"in the clear");
}

#[tokio::test]
async fn test_unsupported_profile() {
    common::init_tracing();
    let store = MemoryContentStore::new();
    let alice = Identity::generate("Alice");
    let mut profile = NamespaceProfile::new(common::name("/acme.org"));
    profile.acm_tag = "capabilities".to_string();
    profile.publish(&store, &alice).await.unwrap();

    let handle = Handle::new(store, alice, Config::default()).unwrap();
    let err = handle
        .access_control(&common::name("/acme.org/docs"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::UnsupportedProfile(tag) if tag == "capabilities"));
}

#[tokio::test]
async fn test_access_records_are_never_protected() {
    let domain = common::setup_domain(Config::default()).await;
    let marker = NamespaceProfile::marker_name(&domain.profile.domain);
    assert!(domain.alice.protection_key(&marker).await.unwrap().is_none());
    assert!(domain
        .alice
        .protection_key(&domain.profile.user_key_name("Bob"))
        .await
        .unwrap()
        .is_none());
}
