//! Access through groups, nested groups and cyclic memberships

mod common;

use ::common::access::{AccessError, Acl, AclOperation, Principal, Role};
use ::common::config::Config;
use ::common::handle::Handle;

#[tokio::test]
async fn test_group_member_reads() {
    let domain = common::setup_domain(Config::default()).await;
    let acm = common::acm(&domain.alice).await;
    acm.groups()
        .create_group("staff", [Principal::user("Alice"), Principal::user("Bob")])
        .await
        .unwrap();

    let node = domain.name("staff-only");
    acm.set_acl(
        &node,
        Acl::new()
            .with(Principal::user("Alice"), Role::Manager)
            .with(Principal::group("staff"), Role::Reader),
    )
    .await
    .unwrap();

    let memo = common::write(&domain.alice, &domain.name("staff-only/memo"), b"all hands").await;
    assert_eq!(common::read(&domain.bob, &memo).await.unwrap(), b"all hands");
    assert!(common::read(&domain.carol, &memo)
        .await
        .unwrap_err()
        .is_access_denied());

    // joining the group is enough, the acl is untouched
    acm.groups()
        .add_member("staff", Principal::user("Carol"))
        .await
        .unwrap();
    assert_eq!(common::read(&domain.carol, &memo).await.unwrap(), b"all hands");
}

#[tokio::test]
async fn test_group_of_groups() {
    let domain = common::setup_domain(Config::default()).await;
    let acm = common::acm(&domain.alice).await;
    let groups = acm.groups();
    groups
        .create_group("interns", [Principal::user("Alice"), Principal::user("Carol")])
        .await
        .unwrap();
    groups
        .create_group("engineering", [Principal::user("Alice"), Principal::group("interns")])
        .await
        .unwrap();

    let node = domain.name("eng");
    acm.set_acl(
        &node,
        Acl::new()
            .with(Principal::user("Alice"), Role::Manager)
            .with(Principal::group("engineering"), Role::Reader),
    )
    .await
    .unwrap();

    let design = common::write(&domain.alice, &domain.name("eng/design"), b"architecture").await;
    assert_eq!(common::read(&domain.carol, &design).await.unwrap(), b"architecture");
    assert!(common::read(&domain.bob, &design)
        .await
        .unwrap_err()
        .is_access_denied());
}

#[tokio::test]
async fn test_group_depth_limit() {
    let domain = common::setup_domain(Config::default()).await;
    let acm = common::acm(&domain.alice).await;
    let groups = acm.groups();
    groups
        .create_group("g3", [Principal::user("Alice"), Principal::user("Carol")])
        .await
        .unwrap();
    groups
        .create_group("g2", [Principal::user("Alice"), Principal::group("g3")])
        .await
        .unwrap();
    groups
        .create_group("g1", [Principal::user("Alice"), Principal::group("g2")])
        .await
        .unwrap();

    acm.set_acl(
        &domain.name("deep"),
        Acl::new()
            .with(Principal::user("Alice"), Role::Manager)
            .with(Principal::group("g1"), Role::Reader),
    )
    .await
    .unwrap();
    let doc = common::write(&domain.alice, &domain.name("deep/doc"), b"three hops").await;

    // carol sits two hops below the acl entry
    assert_eq!(common::read(&domain.carol, &doc).await.unwrap(), b"three hops");

    let mut shallow = Config::default();
    shallow.max_group_depth = 1;
    let carol_shallow = Handle::new(domain.store.clone(), domain.carol.identity().clone(), shallow).unwrap();
    assert!(common::read(&carol_shallow, &doc)
        .await
        .unwrap_err()
        .is_access_denied());
}

#[tokio::test]
async fn test_cyclic_groups_terminate() {
    let domain = common::setup_domain(Config::default()).await;
    let acm = common::acm(&domain.alice).await;
    let groups = acm.groups();
    groups
        .create_group("red", [Principal::user("Alice")])
        .await
        .unwrap();
    groups
        .create_group("blue", [Principal::user("Alice"), Principal::group("red")])
        .await
        .unwrap();
    groups
        .add_member("red", Principal::group("blue"))
        .await
        .unwrap();
    groups
        .add_member("blue", Principal::user("Bob"))
        .await
        .unwrap();

    acm.set_acl(
        &domain.name("loop"),
        Acl::new()
            .with(Principal::user("Alice"), Role::Manager)
            .with(Principal::group("red"), Role::Reader),
    )
    .await
    .unwrap();
    let doc = common::write(&domain.alice, &domain.name("loop/doc"), b"round and round").await;

    // bob reaches red through blue
    assert_eq!(common::read(&domain.bob, &doc).await.unwrap(), b"round and round");
    // carol is in neither; the walk ends in a denial, not a hang
    assert!(common::read(&domain.carol, &doc)
        .await
        .unwrap_err()
        .is_access_denied());
}

#[tokio::test]
async fn test_group_rekey_carries_over_to_node() {
    let domain = common::setup_domain(Config::default()).await;
    let acm = common::acm(&domain.alice).await;
    let bob = Principal::user("Bob");
    acm.groups()
        .create_group("staff", [Principal::user("Alice"), bob.clone()])
        .await
        .unwrap();

    let node = domain.name("ops");
    acm.set_acl(
        &node,
        Acl::new()
            .with(Principal::user("Alice"), Role::Manager)
            .with(Principal::group("staff"), Role::Reader),
    )
    .await
    .unwrap();
    let before = common::write(&domain.alice, &domain.name("ops/runbook"), b"old runbook").await;

    assert_eq!(acm.groups().remove_member("staff", &bob).await.unwrap(), 1);
    acm.groups()
        .add_member("staff", Principal::user("Carol"))
        .await
        .unwrap();

    // the next write moves the node onto a key wrapped for staff's new key
    let after = common::write(&domain.alice, &domain.name("ops/runbook"), b"new runbook").await;
    let versions = acm.node_keys().key_log(&node).unwrap();
    assert_eq!(versions.current_version(), Some(1));

    assert_eq!(common::read(&domain.carol, &after).await.unwrap(), b"new runbook");
    assert!(common::read(&domain.bob, &after)
        .await
        .unwrap_err()
        .is_access_denied());
    // what bob could read before he left stays readable
    assert_eq!(common::read(&domain.bob, &before).await.unwrap(), b"old runbook");

    // no further rekey while the group stays put
    common::write(&domain.alice, &domain.name("ops/rota"), b"rota").await;
    assert_eq!(
        acm.node_keys().key_log(&node).unwrap().current_version(),
        Some(1)
    );
}

#[tokio::test]
async fn test_removed_member_loses_access_after_acl_cycle() {
    let domain = common::setup_domain(Config::default()).await;
    let acm = common::acm(&domain.alice).await;
    let bob = Principal::user("Bob");
    acm.groups()
        .create_group("staff", [Principal::user("Alice"), bob.clone()])
        .await
        .unwrap();

    let node = domain.name("ops");
    acm.set_acl(
        &node,
        Acl::new()
            .with(Principal::user("Alice"), Role::Manager)
            .with(Principal::group("staff"), Role::Reader),
    )
    .await
    .unwrap();
    let before = common::write(&domain.alice, &domain.name("ops/runbook"), b"old runbook").await;

    assert_eq!(acm.groups().remove_member("staff", &bob).await.unwrap(), 1);
    acm.update_acl(
        &node,
        [
            AclOperation::RemoveReader(Principal::group("staff")),
            AclOperation::AddReader(Principal::group("staff")),
        ],
    )
    .await
    .unwrap();
    let after = common::write(&domain.alice, &domain.name("ops/runbook"), b"new runbook").await;

    assert_eq!(common::read(&domain.bob, &before).await.unwrap(), b"old runbook");
    assert!(common::read(&domain.bob, &after)
        .await
        .unwrap_err()
        .is_access_denied());
}

#[tokio::test]
async fn test_group_management_errors() {
    let config = Config {
        timeout_ms: 200,
        ..Config::default()
    };
    let domain = common::setup_domain(config).await;
    let acm = common::acm(&domain.alice).await;
    acm.groups()
        .create_group("staff", [Principal::user("Alice")])
        .await
        .unwrap();

    assert!(matches!(
        acm.groups().create_group("staff", [Principal::user("Bob")]).await,
        Err(AccessError::GroupExists(_))
    ));
    assert!(matches!(
        acm.groups().add_member("ghosts", Principal::user("Bob")).await,
        Err(AccessError::NotAGroup(_))
    ));
    assert!(matches!(
        acm.groups().add_member("staff", Principal::user("Nobody")).await,
        Err(AccessError::UnknownPrincipal(_))
    ));

    // bob is no member and holds no key to change the group with
    let bob_acm = common::acm(&domain.bob).await;
    assert!(matches!(
        bob_acm.groups().add_member("staff", Principal::user("Bob")).await,
        Err(AccessError::AccessDenied(_))
    ));
}
