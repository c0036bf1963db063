//! Segmenting and reassembling content, versions, publishers and key
//! locators

mod common;

use std::time::Duration;

use ::common::access::{Acl, Principal, Role};
use ::common::config::Config;
use ::common::content::{ContentObject, ContentType, KeyLocator, SignedInfo};
use ::common::identity::Identity;
use ::common::io::{IoError, NewVersionOptions, PutOptions, SegmentOptions, Segmenter};
use ::common::store::ContentStore;

const BLOCK: usize = 64;

async fn protected_domain() -> common::Domain {
    let domain = common::setup_domain(Config::default().with_block_size(BLOCK)).await;
    common::acm(&domain.alice)
        .await
        .set_acl(
            &domain.name("vault"),
            Acl::new()
                .with(Principal::user("Alice"), Role::Manager)
                .with(Principal::user("Bob"), Role::Reader),
        )
        .await
        .unwrap();
    domain
}

#[tokio::test]
async fn test_roundtrip_around_block_boundaries() {
    let domain = protected_domain().await;
    for len in [0, 1, BLOCK - 1, BLOCK, BLOCK + 1, 3 * BLOCK + 5] {
        let name = domain.name(&format!("vault/blob-{}", len));
        let data = common::payload(len);
        let versioned = common::write(&domain.alice, &name, &data).await;

        let expected_segments = len.div_ceil(BLOCK).max(1);
        assert_eq!(domain.store.names_under(&versioned).len(), expected_segments);

        let stream = domain.bob.reader().open(&name).await.unwrap();
        assert_eq!(stream.segments(), expected_segments as u64);
        assert_eq!(stream.name(), &versioned);
        assert_eq!(stream.into_bytes(), data);
    }
}

#[tokio::test]
async fn test_reading_twice_gives_the_same_bytes() {
    let domain = protected_domain().await;
    let name = domain.name("vault/ledger");
    let data = common::payload(5 * BLOCK + 17);
    let versioned = common::write(&domain.alice, &name, &data).await;

    let first = common::read(&domain.bob, &versioned).await.unwrap();
    let second = common::read(&domain.bob, &versioned).await.unwrap();
    assert_eq!(first, data);
    assert_eq!(first, second);

    // a segment name opens the whole version
    let via_segment = common::read(&domain.bob, &versioned.add_segment(3)).await.unwrap();
    assert_eq!(via_segment, data);
}

#[tokio::test]
async fn test_new_version_supersedes() {
    let domain = protected_domain().await;
    let name = domain.name("vault/status");
    let mut writer = domain.alice.writer();

    let first = writer
        .new_version(&name, b"draft", NewVersionOptions::default())
        .await
        .unwrap();
    let second = writer
        .new_version(&first, b"final", NewVersionOptions::default())
        .await
        .unwrap();
    writer.close().await.unwrap();

    assert!(second.version().unwrap() > first.version().unwrap());
    assert_eq!(second.base(), name);
    assert_eq!(common::read(&domain.bob, &name).await.unwrap(), b"final");
    assert_eq!(common::read(&domain.bob, &first).await.unwrap(), b"draft");
}

#[tokio::test]
async fn test_missing_content() {
    let domain = protected_domain().await;
    let err = common::read(&domain.bob, &domain.name("vault/never"))
        .await
        .unwrap_err();
    assert!(matches!(err, IoError::NotFound(_)));
}

#[tokio::test]
async fn test_key_locator_is_checked() {
    let domain = protected_domain().await;
    let name = domain.name("vault/signed");
    let mut writer = domain.alice.writer();

    let good = writer
        .new_version(
            &name,
            b"located",
            NewVersionOptions {
                locator: KeyLocator::Name(domain.profile.user_key_name("Alice")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let bad = writer
        .new_version(
            &name,
            b"mislabelled",
            NewVersionOptions {
                locator: KeyLocator::Name(domain.profile.user_key_name("Bob")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    writer.close().await.unwrap();

    assert_eq!(common::read(&domain.bob, &good).await.unwrap(), b"located");
    assert!(matches!(
        common::read(&domain.bob, &bad).await,
        Err(IoError::KeyLocatorMismatch(_))
    ));
}

#[tokio::test]
async fn test_publisher_selection() {
    let domain = protected_domain().await;
    let signing = Identity::generate("Alice-signing");
    let mut alice = domain.alice.clone();
    alice.add_identity(signing.clone());

    let mut writer = alice.writer();
    let versioned = writer
        .put(
            &domain.name("vault/memo"),
            b"signed elsewhere",
            PutOptions {
                publisher: Some(signing.digest()),
                freshness_seconds: Some(60),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    writer.close().await.unwrap();

    let stream = domain.bob.reader().open(&versioned).await.unwrap();
    assert_eq!(stream.publisher(), &signing.public_key());
    assert_eq!(stream.info().freshness_seconds, Some(60));

    let stranger = Identity::generate("Mallory");
    let mut writer = alice.writer();
    let result = writer
        .put(
            &domain.name("vault/memo"),
            b"nope",
            PutOptions {
                publisher: Some(stranger.digest()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(IoError::UnknownPublisher(_))));
}

#[tokio::test]
async fn test_segments_arriving_out_of_order() {
    let domain = protected_domain().await;
    let versioned = domain.name("vault/stream").add_version();
    let data = common::payload(4 * BLOCK + 9);

    let protection = domain.alice.protection_key(&versioned).await.unwrap();
    assert!(protection.is_some());
    let segments = Segmenter::new(BLOCK)
        .segment(
            &versioned,
            &data,
            &SegmentOptions::default(),
            protection.as_ref(),
            domain.alice.identity().secret_key(),
        )
        .unwrap();
    assert_eq!(segments.len(), 5);

    // bob starts reading before anything is published; blocks then trickle
    // in with segment 0 neither first nor last
    let publish = async {
        for index in [3, 0, 4, 1, 2] {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let segment = &segments[index];
            domain
                .store
                .put(segment.name(), segment.encode().unwrap())
                .await
                .unwrap();
        }
    };
    let (read, ()) = tokio::join!(common::read(&domain.bob, &versioned), publish);
    assert_eq!(read.unwrap(), data);
}

#[tokio::test]
async fn test_implausible_segment_count_is_rejected() {
    let domain = protected_domain().await;
    let versioned = domain.name("open/huge").add_version();
    let first = versioned.add_segment(0);

    let mut info = SignedInfo::new(domain.alice.identity().public_key(), ContentType::Data);
    info.final_segment = Some(u64::MAX);
    let object = ContentObject::sign(
        first.clone(),
        info,
        None,
        b"tiny".to_vec(),
        domain.alice.identity().secret_key(),
    )
    .unwrap();
    domain.store.put(&first, object.encode().unwrap()).await.unwrap();

    let err = common::read(&domain.bob, &versioned).await.unwrap_err();
    assert!(matches!(err, IoError::Malformed { .. }));
}
