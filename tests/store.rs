mod common;

use common::TestPlanet;
use planetgate::db;
use planetgate::error::AppError;
use planetgate::models::channel::CreateChannel;
use planetgate::models::node::{NodeKey, PermissionNode};
use planetgate::models::permission::{category, chat, ChannelKind, PermissionState};
use planetgate::models::role::{CreateRole, RolePositionUpdate};
use planetgate::position::{ChannelPosition, PositionError};
use planetgate::store::PermissionStore;

#[tokio::test]
async fn test_create_planet_creates_default_role() {
    let t = TestPlanet::new().await;
    let role = db::roles::get_default_role(t.pool(), t.planet.id).await.unwrap();
    assert_eq!(role.id, t.default_role.id);
    assert_eq!(role.flag_bit_index, 0);
    assert!(role.is_default);
    assert_eq!(role.authority(), 0);

    let member = t.member(5, &[]).await;
    assert!(member.role_membership.has_role(0));
    assert_eq!(member.role_membership.role_count(), 1);
}

#[tokio::test]
async fn test_role_indices_are_allocated_lowest_first() {
    let t = TestPlanet::new().await;
    let a = t.role("a", 1).await;
    let b = t.role("b", 2).await;
    assert_eq!(a.flag_bit_index, 1);
    assert_eq!(b.flag_bit_index, 2);

    let high = t
        .role_with(CreateRole {
            flag_bit_index: Some(255),
            ..CreateRole::named("high")
        })
        .await;
    assert_eq!(high.flag_bit_index, 255);

    db::roles::delete_role(t.pool(), a.id).await.unwrap();
    let c = t.role("c", 3).await;
    assert_eq!(c.flag_bit_index, 1);
}

#[tokio::test]
async fn test_invalid_role_index_is_rejected() {
    let t = TestPlanet::new().await;
    for index in [256, 1000, -1] {
        let err = db::roles::create_role(
            t.pool(),
            t.planet.id,
            &CreateRole {
                flag_bit_index: Some(index),
                ..CreateRole::named("bad")
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "index {index}");
    }

    let err = db::roles::create_role(
        t.pool(),
        t.planet.id,
        &CreateRole {
            flag_bit_index: Some(0),
            ..CreateRole::named("clash")
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_role_slots_run_out_at_256() {
    let t = TestPlanet::new().await;
    for i in 1..256u32 {
        t.role(&format!("r{i}"), i).await;
    }
    let err = db::roles::create_role(t.pool(), t.planet.id, &CreateRole::named("overflow"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_delete_role_rewrites_memberships_and_nodes() {
    let t = TestPlanet::new().await;
    let general = t.channel("general", ChannelKind::Chat, None).await;
    let doomed = t.role("doomed", 1).await;
    let kept = t.role("kept", 2).await;
    let a = t.member(2, &[&doomed, &kept]).await;
    let b = t.member(3, &[&doomed]).await;
    let c = t.member(4, &[]).await;
    t.set_node(&general, &doomed, ChannelKind::Chat, &[(chat::VIEW, PermissionState::Deny)])
        .await;

    let resolver = t.resolver();
    assert!(!resolver.has_permission(a.id, general.id, chat::VIEW).await.unwrap());

    let cleared = db::roles::delete_role(t.pool(), doomed.id).await.unwrap();
    assert_eq!(cleared, 2);

    let a = db::members::get_member(t.pool(), a.id).await.unwrap();
    let b = db::members::get_member(t.pool(), b.id).await.unwrap();
    let c = db::members::get_member(t.pool(), c.id).await.unwrap();
    assert_eq!(
        a.role_membership.role_ids().collect::<Vec<_>>(),
        vec![0, kept.flag_bit_index]
    );
    assert_eq!(b.role_membership.role_ids().collect::<Vec<_>>(), vec![0]);
    assert_eq!(c.role_membership.role_ids().collect::<Vec<_>>(), vec![0]);

    let key = NodeKey::new(general.id, doomed.id, ChannelKind::Chat);
    assert!(db::nodes::find_node(t.pool(), &key).await.unwrap().is_none());
    assert!(resolver.has_permission(a.id, general.id, chat::VIEW).await.unwrap());
}

#[tokio::test]
async fn test_default_role_cannot_be_deleted_or_revoked() {
    let t = TestPlanet::new().await;
    let member = t.member(2, &[]).await;

    let err = db::roles::delete_role(t.pool(), t.default_role.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let err = db::members::revoke_role(t.pool(), member.id, t.default_role.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_grant_and_revoke_role() {
    let t = TestPlanet::new().await;
    let high = t
        .role_with(CreateRole {
            flag_bit_index: Some(200),
            position: Some(1),
            ..CreateRole::named("high")
        })
        .await;
    let member = t.member(2, &[&high]).await;
    assert!(member.role_membership.has_role(200));

    let roles = t.resolver().store().fetch_roles(member.id).await.unwrap();
    let ids: Vec<i64> = roles.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![high.id, t.default_role.id]);

    let member = db::members::revoke_role(t.pool(), member.id, high.id).await.unwrap();
    assert!(!member.role_membership.has_role(200));
    assert!(member.role_membership.has_role(0));
}

#[tokio::test]
async fn test_reorder_roles_changes_primary_role() {
    let t = TestPlanet::new().await;
    let a = t.role("a", 1).await;
    let b = t.role("b", 2).await;
    let member = t.member(2, &[&a, &b]).await;
    let resolver = t.resolver();

    let primary = resolver.store().fetch_roles(member.id).await.unwrap()[0].id;
    assert_eq!(primary, a.id);

    db::roles::reorder_roles(
        t.pool(),
        t.planet.id,
        &[
            RolePositionUpdate { id: a.id, position: 5 },
            RolePositionUpdate { id: b.id, position: 0 },
        ],
    )
    .await
    .unwrap();
    let primary = resolver.store().fetch_roles(member.id).await.unwrap()[0].id;
    assert_eq!(primary, b.id);
    // Membership indices are untouched by reordering.
    assert_eq!(db::roles::get_role(t.pool(), a.id).await.unwrap().flag_bit_index, a.flag_bit_index);

    let err = db::roles::reorder_roles(
        t.pool(),
        t.planet.id,
        &[RolePositionUpdate {
            id: t.default_role.id,
            position: 3,
        }],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_channels_are_appended_in_order() {
    let t = TestPlanet::new().await;
    let first = t.channel("first", ChannelKind::Chat, None).await;
    let cat = t.channel("cat", ChannelKind::Category, None).await;
    let inner_a = t.channel("a", ChannelKind::Chat, Some(&cat)).await;
    let inner_b = t.channel("b", ChannelKind::Voice, Some(&cat)).await;

    assert_eq!(first.position.raw(), 0x0100_0000);
    assert_eq!(cat.position.raw(), 0x0200_0000);
    assert_eq!(inner_a.position.raw(), 0x0201_0000);
    assert_eq!(inner_b.position.raw(), 0x0202_0000);
    assert_eq!(inner_b.position.parent(), cat.position);

    let listed: Vec<i64> = db::channels::list_channels(t.pool(), t.planet.id)
        .await
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(listed, vec![first.id, cat.id, inner_a.id, inner_b.id]);
}

#[tokio::test]
async fn test_channels_only_nest_under_categories() {
    let t = TestPlanet::new().await;
    let chat = t.channel("chat", ChannelKind::Chat, None).await;
    let err = db::channels::create_channel(
        t.pool(),
        t.planet.id,
        &CreateChannel::new("child", ChannelKind::Chat).under(chat.id),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_fifth_level_is_rejected() {
    let t = TestPlanet::new().await;
    let l1 = t.channel("l1", ChannelKind::Category, None).await;
    let l2 = t.channel("l2", ChannelKind::Category, Some(&l1)).await;
    let l3 = t.channel("l3", ChannelKind::Category, Some(&l2)).await;
    let l4 = t.channel("l4", ChannelKind::Category, Some(&l3)).await;
    assert_eq!(l4.position.depth(), 4);
    assert_eq!(l4.position.raw(), 0x0101_0101);

    let err = db::channels::create_channel(
        t.pool(),
        t.planet.id,
        &CreateChannel::new("l5", ChannelKind::Chat).under(l4.id),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        AppError::Position(PositionError::DepthExceeded { raw: 0x0101_0101 })
    ));
}

#[tokio::test]
async fn test_move_channel_recomputes_subtree_positions() {
    let t = TestPlanet::new().await;
    let a = t.channel("a", ChannelKind::Category, None).await;
    let b = t.channel("b", ChannelKind::Category, None).await;
    let existing = t.channel("existing", ChannelKind::Chat, Some(&b)).await;
    let nested = t.channel("nested", ChannelKind::Category, Some(&a)).await;
    let leaf = t.channel("leaf", ChannelKind::Chat, Some(&nested)).await;
    assert_eq!(nested.position.raw(), 0x0101_0000);
    assert_eq!(leaf.position.raw(), 0x0101_0100);

    let moved = db::channels::move_channel(t.pool(), nested.id, Some(b.id)).await.unwrap();
    assert_eq!(moved.parent_id, Some(b.id));
    assert_eq!(moved.position.raw(), 0x0202_0000);

    let leaf = db::channels::get_channel(t.pool(), leaf.id).await.unwrap();
    assert_eq!(leaf.position.raw(), 0x0202_0100);
    assert!(leaf.position.is_descendant_of(b.position));
    assert!(leaf.position.is_direct_child_of(moved.position));

    let existing = db::channels::get_channel(t.pool(), existing.id).await.unwrap();
    assert_eq!(existing.position.raw(), 0x0201_0000);

    // And back out to the top level.
    let top = db::channels::move_channel(t.pool(), nested.id, None).await.unwrap();
    assert_eq!(top.position, ChannelPosition::top_level(3).unwrap());
    let leaf = db::channels::get_channel(t.pool(), leaf.id).await.unwrap();
    assert_eq!(leaf.position.raw(), 0x0301_0000);
}

#[tokio::test]
async fn test_move_rejects_cycles_and_overflow() {
    let t = TestPlanet::new().await;
    let outer = t.channel("outer", ChannelKind::Category, None).await;
    let inner = t.channel("inner", ChannelKind::Category, Some(&outer)).await;

    let err = db::channels::move_channel(t.pool(), outer.id, Some(inner.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let l2 = t.channel("l2", ChannelKind::Category, Some(&inner)).await;
    let l3 = t.channel("l3", ChannelKind::Category, Some(&l2)).await;
    let deep = t.channel("deep", ChannelKind::Category, None).await;
    let deep_child = t.channel("deep-child", ChannelKind::Category, Some(&deep)).await;
    t.channel("deep-leaf", ChannelKind::Chat, Some(&deep_child)).await;

    // l3 is already four deep and `deep` carries two levels below it.
    let err = db::channels::move_channel(t.pool(), deep.id, Some(l3.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Position(PositionError::DepthExceeded { .. })));
    let err = db::channels::move_channel(t.pool(), deep.id, Some(l2.id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let deep = db::channels::get_channel(t.pool(), deep.id).await.unwrap();
    assert_eq!(deep.parent_id, None);
}

#[tokio::test]
async fn test_node_validation() {
    let t = TestPlanet::new().await;
    let voice_channel = t.channel("voice", ChannelKind::Voice, None).await;
    let key = NodeKey::new(voice_channel.id, t.default_role.id, ChannelKind::Chat);
    let mut node = PermissionNode::empty(key);
    node.set_state(chat::POST_MESSAGES, PermissionState::Allow);

    let err = db::nodes::upsert_node(t.pool(), &node).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Clearing every bit removes the stored node.
    let general = t.channel("general", ChannelKind::Chat, None).await;
    t.set_node(&general, &t.default_role, ChannelKind::Chat, &[(chat::EMBED, PermissionState::Deny)])
        .await;
    let stored = t
        .set_node(&general, &t.default_role, ChannelKind::Chat, &[(chat::EMBED, PermissionState::Undefined)])
        .await;
    assert!(stored.is_empty());
    let key = NodeKey::new(general.id, t.default_role.id, ChannelKind::Chat);
    assert!(db::nodes::find_node(t.pool(), &key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_member_lookups() {
    let t = TestPlanet::new().await;
    let mod_role = t.role("mod", 1).await;
    let first = t.member(20, &[]).await;
    let second = t.member(21, &[&mod_role]).await;

    let planet = db::planets::get_planet(t.pool(), t.planet.id).await.unwrap();
    assert_eq!(planet, t.planet);

    let listed = db::members::list_members(t.pool(), t.planet.id).await.unwrap();
    assert_eq!(listed, vec![first.clone(), second.clone()]);

    let found = db::members::get_member_by_user(t.pool(), t.planet.id, 21).await.unwrap();
    assert_eq!(found, second);
    assert!(found.role_membership.has_role(u32::from(mod_role.flag_bit_index)));

    let err = db::members::get_member_by_user(t.pool(), t.planet.id, 99)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = db::planets::get_planet(t.pool(), t.planet.id + 1).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = db::members::add_member(t.pool(), t.planet.id, 20).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_nodes_listed_per_target() {
    let t = TestPlanet::new().await;
    let staff = t.channel("staff", ChannelKind::Category, None).await;
    let other = t.channel("other", ChannelKind::Chat, None).await;
    t.set_node(&staff, &t.default_role, ChannelKind::Category, &[(category::VIEW, PermissionState::Deny)])
        .await;
    t.set_node(&staff, &t.default_role, ChannelKind::Chat, &[(chat::EMBED, PermissionState::Allow)])
        .await;
    t.set_node(&other, &t.default_role, ChannelKind::Chat, &[(chat::EMBED, PermissionState::Deny)])
        .await;

    let nodes = db::nodes::list_nodes_for_target(t.pool(), staff.id).await.unwrap();
    let kinds: Vec<ChannelKind> = nodes.iter().map(|n| n.target_kind).collect();
    assert_eq!(kinds, vec![ChannelKind::Category, ChannelKind::Chat]);
    assert!(nodes.iter().all(|n| n.target_id == staff.id));
    assert_eq!(nodes[1].state(chat::EMBED), PermissionState::Allow);
}
