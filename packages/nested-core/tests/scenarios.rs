//! End-to-end scenarios through the public API.

use nested_core::access::Permission;
use nested_core::place::Receptive;
use nested_core::{
    is_sub_place, AccountId, CoreConfig, NestedCore, Place, PlaceId, PostId,
};

async fn core() -> NestedCore {
    core_with(CoreConfig::default()).await
}

async fn core_with(config: CoreConfig) -> NestedCore {
    NestedCore::open(config).await.unwrap()
}

fn register(core: &NestedCore, id: &str) -> AccountId {
    let id = AccountId::parse(id).unwrap();
    core.accounts.register(&id, id.as_str()).unwrap();
    id
}

fn grand(core: &NestedCore, id: &str, creator: &AccountId) -> Place {
    let id = PlaceId::parse(id).unwrap();
    core.lifecycle.create_grand_place(&id, id.as_str(), creator).unwrap()
}

#[tokio::test]
async fn keyholder_limit_is_never_exceeded() {
    let mut config = CoreConfig::default();
    config.defaults.grand.keyholders = 2;
    config.defaults.grand.creators = 2;
    let core = core_with(config).await;

    let owner = register(&core, "owner");
    let sales = grand(&core, "sales", &owner);

    let a = register(&core, "a");
    let b = register(&core, "b");
    let c = register(&core, "c");
    assert!(core.membership.add_keyholder(&sales.id, &a).unwrap());
    assert!(core.membership.add_keyholder(&sales.id, &b).unwrap());
    assert!(!core.membership.add_keyholder(&sales.id, &c).unwrap());

    // One creator slot left: a can be promoted, b cannot
    assert!(core.membership.promote(&sales.id, &a).unwrap());
    assert!(!core.membership.promote(&sales.id, &b).unwrap());

    let place = core.lifecycle.get(&sales.id).unwrap();
    assert_eq!(place.counter.creators, 2);
    assert_eq!(place.counter.keyholders, 1);
    assert!(place.counter.creators <= place.limit.creators);
    assert!(place.counter.keyholders <= place.limit.keyholders);
    assert!(place.invariant_violations().is_empty());
}

#[tokio::test]
async fn permission_map_always_has_ten_keys() {
    let core = core().await;
    let owner = register(&core, "owner");
    let stranger = register(&core, "stranger");
    let sales = grand(&core, "sales", &owner);

    for account in [&owner, &stranger] {
        let map = core.access.get_access(&sales, account).to_map();
        assert_eq!(map.len(), 10);
        for key in [
            "read-post",
            "write-post",
            "remove-post",
            "add-place",
            "remove-place",
            "see-place",
            "add-members",
            "remove-members",
            "see-members",
            "control",
        ] {
            assert!(map.contains_key(key), "missing {key}");
        }
    }
    assert!(core.access.get_access(&sales, &stranger).to_map().values().all(|v| !v));
}

#[tokio::test]
async fn mark_read_twice_changes_nothing_the_second_time() {
    let core = core().await;
    let owner = register(&core, "owner");
    let reader = register(&core, "reader");
    let sales = grand(&core, "sales", &owner);
    core.membership.add_keyholder(&sales.id, &reader).unwrap();

    let post = PostId::new("p1");
    core.posts.record(&post, &owner, &[sales.id.clone()]).unwrap();
    assert_eq!(core.reads.unread_count(&reader, &sales.id).unwrap(), 1);

    assert_eq!(core.reads.mark_read(post.as_str(), &reader).unwrap(), 1);
    assert_eq!(core.reads.unread_count(&reader, &sales.id).unwrap(), 0);

    assert_eq!(core.reads.mark_read(post.as_str(), &reader).unwrap(), 0);
    assert_eq!(core.reads.unread_count(&reader, &sales.id).unwrap(), 0);
}

#[tokio::test]
async fn add_then_remove_keyholder_restores_the_place() {
    let core = core().await;
    let owner = register(&core, "owner");
    let guest = register(&core, "guest");
    let sales = grand(&core, "sales", &owner);
    let before = core.lifecycle.get(&sales.id).unwrap();

    assert!(core.membership.add_keyholder(&sales.id, &guest).unwrap());
    assert!(core.accounts.get(&guest).unwrap().has_access_to(&sales.id));

    assert!(core.membership.remove_keyholder(&sales.id, &guest).unwrap());
    let after = core.lifecycle.get(&sales.id).unwrap();
    assert_eq!(after.keyholder_ids, before.keyholder_ids);
    assert_eq!(after.counter, before.counter);
    assert!(!core.accounts.get(&guest).unwrap().has_access_to(&sales.id));
}

#[test]
fn sub_place_checks_respect_segments() {
    assert!(is_sub_place("sales", "sales.eu"));
    assert!(is_sub_place("sales", "sales.eu.uk"));
    assert!(is_sub_place("sales.eu", "sales.eu.uk"));
    assert!(!is_sub_place("sales", "salesforce"));
    assert!(!is_sub_place("sales.eu", "sales"));
}

#[tokio::test]
async fn unlocked_child_of_external_grand_place() {
    let core = core().await;
    let owner = register(&core, "owner");
    let a = register(&core, "a");

    let g_id = PlaceId::parse("g").unwrap();
    core.lifecycle.create_grand_place(&g_id, "G", &owner).unwrap();
    assert!(core.membership.add_keyholder(&g_id, &a).unwrap());
    let child_id = g_id.child("c").unwrap();
    let child = core.lifecycle.create_unlocked_place(&child_id, "c", &owner).unwrap();

    // G: locked, receptive external. There is no settings API, so G is
    // adjusted on the loaded value.
    let mut g = core.lifecycle.get(&g_id).unwrap();
    g.privacy.receptive = Receptive::External;
    assert!(g.privacy.locked);
    let on_g = core.access.get_access(&g, &a);
    assert!(on_g.has(Permission::ReadPost));
    assert!(on_g.has(Permission::WritePost));
    assert!(on_g.has(Permission::SeeMembers));

    // G.c keeps its creation defaults
    assert!(!child.privacy.locked);
    assert!(!child.is_member(&a));
    let on_child = core.access.get_access(&child, &a);
    assert!(on_child.has(Permission::ReadPost));
    assert!(on_child.has(Permission::WritePost));
    assert!(on_child.has(Permission::SeeMembers));
    assert!(!on_child.has(Permission::Control));
}

#[tokio::test]
async fn post_fans_out_to_every_reader_but_the_sender() {
    let core = core().await;
    let sender = register(&core, "sender");
    let sales = grand(&core, "sales", &sender);
    let readers: Vec<AccountId> = ["k1", "k2", "k3"]
        .iter()
        .map(|id| {
            let account = register(&core, id);
            assert!(core.membership.add_keyholder(&sales.id, &account).unwrap());
            account
        })
        .collect();

    let post = PostId::new("hello");
    let landed = core.posts.record(&post, &sender, &[sales.id.clone()]).unwrap();
    assert_eq!(landed, vec![sales.id.clone()]);

    for reader in &readers {
        assert_eq!(core.reads.unread_count(reader, &sales.id).unwrap(), 1);
        assert!(core.reads.is_unread(reader, &sales.id, post.as_str()).unwrap());
    }
    assert_eq!(core.reads.unread_count(&sender, &sales.id).unwrap(), 0);
    assert!(!core.reads.is_unread(&sender, &sales.id, post.as_str()).unwrap());
}

#[tokio::test]
async fn place_with_children_cannot_be_removed() {
    let core = core().await;
    let owner = register(&core, "owner");
    let sales = grand(&core, "sales", &owner);
    for segment in ["eu", "us"] {
        let id = sales.id.child(segment).unwrap();
        core.lifecycle.create_locked_place(&id, segment, &owner).unwrap();
    }
    let before = core.lifecycle.get(&sales.id).unwrap();
    assert_eq!(before.counter.children, 2);

    assert!(!core.lifecycle.remove(&sales.id, &owner).unwrap());
    let after = core.lifecycle.get(&sales.id).unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn reconciler_finds_nothing_after_normal_operation() {
    let core = core().await;
    let owner = register(&core, "owner");
    let sales = grand(&core, "sales", &owner);
    let reader = register(&core, "reader");
    core.membership.add_keyholder(&sales.id, &reader).unwrap();
    core.posts.record(&PostId::new("p1"), &owner, &[sales.id.clone()]).unwrap();

    let report = core.reconciler.run().unwrap();
    assert!(report.is_clean(), "unexpected drift: {report:?}");
}

#[test]
fn state_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested.db").to_string_lossy().into_owned();
    let config = CoreConfig { database_path: Some(path), ..CoreConfig::default() };

    tokio_test::block_on(async {
        let core = core_with(config.clone()).await;
        let owner = register(&core, "owner");
        grand(&core, "sales", &owner);
    });

    tokio_test::block_on(async {
        let core = core_with(config).await;
        let sales = core.lifecycle.get(&PlaceId::parse("sales").unwrap()).unwrap();
        assert!(sales.is_creator(&AccountId::parse("owner").unwrap()));
    });
}
