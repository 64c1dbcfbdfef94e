#![allow(dead_code)]

use std::sync::Arc;

use planetgate::cache::NodeCache;
use planetgate::db::{self, SqliteStore};
use planetgate::models::channel::{Channel, CreateChannel};
use planetgate::models::member::Member;
use planetgate::models::node::{NodeKey, PermissionNode};
use planetgate::models::permission::{ChannelKind, ChannelPermission, PermissionState};
use planetgate::models::planet::{CreatePlanet, Planet};
use planetgate::models::role::{CreateRole, Role};
use planetgate::resolver::PermissionResolver;
use sqlx::SqlitePool;

pub const OWNER_ID: i64 = 1000;

/// An in-memory database holding one planet.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestPlanet {
    pub pool: SqlitePool,
    pub planet: Planet,
    pub default_role: Role,
}

impl TestPlanet {
    pub async fn new() -> Self {
        // One connection keeps every statement on the same in-memory database.
        let pool = db::create_pool("sqlite::memory:", 1)
            .await
            .expect("failed to create test pool");

        let (planet, default_role) = db::planets::create_planet(
            &pool,
            &CreatePlanet {
                name: "Test Planet".to_string(),
                owner_id: OWNER_ID,
            },
        )
        .await
        .expect("failed to create test planet");

        Self {
            pool,
            planet,
            default_role,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Resolver reading straight from the database.
    pub fn resolver(&self) -> PermissionResolver<SqliteStore> {
        PermissionResolver::new(SqliteStore::new(self.pool.clone()))
    }

    /// Resolver reading nodes through the cache.
    pub fn cached_resolver(&self) -> PermissionResolver<Arc<NodeCache<SqliteStore>>> {
        PermissionResolver::new(Arc::new(NodeCache::new(SqliteStore::new(self.pool.clone()))))
    }

    pub async fn role(&self, name: &str, position: u32) -> Role {
        let input = CreateRole {
            position: Some(position),
            ..CreateRole::named(name)
        };
        db::roles::create_role(self.pool(), self.planet.id, &input)
            .await
            .expect("failed to create test role")
    }

    pub async fn role_with(&self, input: CreateRole) -> Role {
        db::roles::create_role(self.pool(), self.planet.id, &input)
            .await
            .expect("failed to create test role")
    }

    pub async fn channel(&self, name: &str, kind: ChannelKind, parent: Option<&Channel>) -> Channel {
        let mut input = CreateChannel::new(name, kind);
        if let Some(parent) = parent {
            input = input.under(parent.id);
        }
        db::channels::create_channel(self.pool(), self.planet.id, &input)
            .await
            .expect("failed to create test channel")
    }

    /// A member holding the default role plus `roles`.
    pub async fn member(&self, user_id: i64, roles: &[&Role]) -> Member {
        let mut member = db::members::add_member(self.pool(), self.planet.id, user_id)
            .await
            .expect("failed to add test member");
        for role in roles {
            member = db::members::grant_role(self.pool(), member.id, role.id)
                .await
                .expect("failed to grant test role");
        }
        member
    }

    pub async fn set_node(
        &self,
        target: &Channel,
        role: &Role,
        kind: ChannelKind,
        states: &[(ChannelPermission, PermissionState)],
    ) -> PermissionNode {
        let key = NodeKey::new(target.id, role.id, kind);
        let mut node = db::nodes::find_node(self.pool(), &key)
            .await
            .expect("failed to read test node")
            .unwrap_or(PermissionNode::empty(key));
        for (permission, state) in states {
            node.set_state_of(permission.value, *state);
        }
        db::nodes::upsert_node(self.pool(), &node)
            .await
            .expect("failed to store test node");
        node
    }
}
