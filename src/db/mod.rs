pub mod channels;
pub mod members;
pub mod nodes;
pub mod planets;
pub mod roles;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::channel::Channel;
use crate::models::member::Member;
use crate::models::node::{NodeKey, PermissionNode};
use crate::models::role::Role;
use crate::store::{self, PermissionStore};

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

/// Convert a stored integer into the narrower type the model uses.
pub(crate) fn narrow<T: TryFrom<i64>>(value: i64, column: &str) -> Result<T, AppError> {
    T::try_from(value)
        .map_err(|_| AppError::Internal(format!("{column} value {value} is out of range")))
}

/// [`PermissionStore`] backed by the SQLite tables.
///
/// Every read is a single statement, so each one observes a committed
/// snapshot of the row it returns.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PermissionStore for SqliteStore {
    async fn fetch_member(&self, member_id: i64) -> Result<Option<Member>, AppError> {
        members::find_member(&self.pool, member_id).await
    }

    async fn fetch_channel(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        channels::find_channel(&self.pool, channel_id).await
    }

    async fn list_channels(&self, planet_id: i64) -> Result<Vec<Channel>, AppError> {
        channels::list_channels(&self.pool, planet_id).await
    }

    async fn fetch_owner_id(&self, planet_id: i64) -> Result<i64, AppError> {
        planets::get_owner_id(&self.pool, planet_id).await
    }

    async fn fetch_roles(&self, member_id: i64) -> Result<Vec<Role>, AppError> {
        let member = members::get_member(&self.pool, member_id).await?;
        let planet_roles = roles::list_roles(&self.pool, member.planet_id).await?;
        Ok(store::materialize_roles(
            &member.role_membership,
            &planet_roles,
            member.planet_id,
        ))
    }

    async fn fetch_default_role(&self, planet_id: i64) -> Result<Role, AppError> {
        roles::get_default_role(&self.pool, planet_id).await
    }

    async fn fetch_node(&self, key: NodeKey) -> Result<Option<PermissionNode>, AppError> {
        nodes::find_node(&self.pool, &key).await
    }

    async fn fetch_parent(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        channels::find_parent(&self.pool, channel_id).await
    }
}
