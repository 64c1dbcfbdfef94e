use sqlx::{Row, SqlitePool};

use super::channels::get_channel;
use super::roles::get_role;
use crate::error::AppError;
use crate::models::node::{NodeKey, PermissionNode};
use crate::models::permission::ChannelKind;

fn row_to_node(row: sqlx::sqlite::SqliteRow) -> Result<PermissionNode, AppError> {
    let kind: String = row.get("target_type");
    Ok(PermissionNode {
        target_id: row.get("target_id"),
        role_id: row.get("role_id"),
        target_kind: kind.parse().map_err(AppError::Internal)?,
        code: row.get("code"),
        mask: row.get("mask"),
    })
}

const SELECT_NODES: &str = "SELECT target_id, role_id, target_type, code, mask FROM permission_nodes";

pub async fn find_node(pool: &SqlitePool, key: &NodeKey) -> Result<Option<PermissionNode>, AppError> {
    sqlx::query(&format!(
        "{SELECT_NODES} WHERE target_id = ? AND role_id = ? AND target_type = ?"
    ))
    .bind(key.target_id)
    .bind(key.role_id)
    .bind(key.target_kind.as_str())
    .fetch_optional(pool)
    .await?
    .map(row_to_node)
    .transpose()
}

pub async fn list_nodes_for_target(
    pool: &SqlitePool,
    target_id: i64,
) -> Result<Vec<PermissionNode>, AppError> {
    let rows = sqlx::query(&format!(
        "{SELECT_NODES} WHERE target_id = ? ORDER BY role_id, target_type"
    ))
    .bind(target_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_node).collect()
}

/// Store a node, replacing any node with the same key. `code` and `mask`
/// are written by one statement. A node with nothing decided is removed.
///
/// Categories hold nodes of every kind, for the channels that inherit from
/// them; other channels only hold nodes of their own kind.
pub async fn upsert_node(pool: &SqlitePool, node: &PermissionNode) -> Result<(), AppError> {
    let target = get_channel(pool, node.target_id).await?;
    let role = get_role(pool, node.role_id).await?;
    if role.planet_id != target.planet_id {
        return Err(AppError::BadRequest(
            "role and channel are not on the same planet".to_string(),
        ));
    }
    if target.kind != ChannelKind::Category && target.kind != node.target_kind {
        return Err(AppError::BadRequest(format!(
            "{} nodes cannot be attached to {} channel {}",
            node.target_kind, target.kind, target.id
        )));
    }

    if node.is_empty() {
        return delete_node(pool, &node.key()).await;
    }

    sqlx::query(
        "INSERT INTO permission_nodes (target_id, role_id, target_type, planet_id, code, mask) VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT (target_id, role_id, target_type) DO UPDATE SET code = excluded.code, mask = excluded.mask",
    )
    .bind(node.target_id)
    .bind(node.role_id)
    .bind(node.target_kind.as_str())
    .bind(target.planet_id)
    .bind(node.effective_code())
    .bind(node.mask)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_node(pool: &SqlitePool, key: &NodeKey) -> Result<(), AppError> {
    sqlx::query("DELETE FROM permission_nodes WHERE target_id = ? AND role_id = ? AND target_type = ?")
        .bind(key.target_id)
        .bind(key.role_id)
        .bind(key.target_kind.as_str())
        .execute(pool)
        .await?;
    Ok(())
}
