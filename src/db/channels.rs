use sqlx::{Row, SqliteConnection, SqlitePool};

use super::narrow;
use crate::error::AppError;
use crate::models::channel::{self, Channel, CreateChannel};
use crate::models::permission::ChannelKind;
use crate::position::{ChannelPosition, MAX_LOCAL_POSITION, PositionError};
use crate::snowflake;

fn row_to_channel(row: sqlx::sqlite::SqliteRow) -> Result<Channel, AppError> {
    let kind: String = row.get("type");
    Ok(Channel {
        id: row.get("id"),
        planet_id: row.get("planet_id"),
        name: row.get("name"),
        kind: kind.parse().map_err(AppError::Internal)?,
        position: ChannelPosition::from_raw(narrow(row.get("raw_position"), "channels.raw_position")?)?,
        parent_id: row.get("parent_id"),
        inherits_perms: row.get("inherits_perms"),
        is_default: row.get("is_default"),
    })
}

const SELECT_CHANNELS: &str = "SELECT id, planet_id, name, type, raw_position, parent_id, inherits_perms, is_default FROM channels";

pub async fn find_channel(pool: &SqlitePool, channel_id: i64) -> Result<Option<Channel>, AppError> {
    let mut conn = pool.acquire().await?;
    find_channel_in(&mut conn, channel_id).await
}

async fn find_channel_in(
    conn: &mut SqliteConnection,
    channel_id: i64,
) -> Result<Option<Channel>, AppError> {
    sqlx::query(&format!("{SELECT_CHANNELS} WHERE id = ?"))
        .bind(channel_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(row_to_channel)
        .transpose()
}

pub async fn get_channel(pool: &SqlitePool, channel_id: i64) -> Result<Channel, AppError> {
    find_channel(pool, channel_id)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_channel".to_string()))
}

pub async fn find_parent(pool: &SqlitePool, channel_id: i64) -> Result<Option<Channel>, AppError> {
    sqlx::query(
        "SELECT p.id, p.planet_id, p.name, p.type, p.raw_position, p.parent_id, p.inherits_perms, p.is_default \
         FROM channels c INNER JOIN channels p ON p.id = c.parent_id WHERE c.id = ?",
    )
    .bind(channel_id)
    .fetch_optional(pool)
    .await?
    .map(row_to_channel)
    .transpose()
}

/// Every channel of the planet in channel list order.
pub async fn list_channels(pool: &SqlitePool, planet_id: i64) -> Result<Vec<Channel>, AppError> {
    let mut conn = pool.acquire().await?;
    list_channels_in(&mut conn, planet_id).await
}

async fn list_channels_in(
    conn: &mut SqliteConnection,
    planet_id: i64,
) -> Result<Vec<Channel>, AppError> {
    let rows = sqlx::query(&format!(
        "{SELECT_CHANNELS} WHERE planet_id = ? ORDER BY raw_position, id"
    ))
    .bind(planet_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(row_to_channel).collect()
}

/// Parent channel checks shared by create and move.
fn require_category(parent: &Channel, planet_id: i64) -> Result<(), AppError> {
    if parent.planet_id != planet_id {
        return Err(AppError::BadRequest(
            "parent category belongs to another planet".to_string(),
        ));
    }
    if parent.kind != ChannelKind::Category {
        return Err(AppError::BadRequest(format!(
            "channel {} is not a category",
            parent.id
        )));
    }
    Ok(())
}

/// Position for a new last child of `parent`, ignoring `skip_id`.
fn next_child_position(
    channels: &[Channel],
    parent: ChannelPosition,
    skip_id: Option<i64>,
) -> Result<ChannelPosition, AppError> {
    let last = channel::direct_children(channels, parent)
        .filter(|c| Some(c.id) != skip_id)
        .map(|c| c.position.local_position())
        .max()
        .unwrap_or(0);
    if last >= MAX_LOCAL_POSITION {
        return Err(AppError::Conflict(format!(
            "{parent} already holds {MAX_LOCAL_POSITION} channels"
        )));
    }
    Ok(parent.append(last + 1)?)
}

/// Create a channel as the last child of its parent (or of the planet).
///
/// A channel under a category inherits the category's permissions unless
/// told otherwise.
pub async fn create_channel(
    pool: &SqlitePool,
    planet_id: i64,
    input: &CreateChannel,
) -> Result<Channel, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("channel name must not be empty".to_string()));
    }

    let mut tx = pool.begin().await?;

    let parent_position = match input.parent_id {
        Some(parent_id) => {
            let parent = find_channel_in(&mut tx, parent_id)
                .await?
                .ok_or_else(|| AppError::NotFound("unknown_channel".to_string()))?;
            require_category(&parent, planet_id)?;
            parent.position
        }
        None => ChannelPosition::ROOT,
    };
    let channels = list_channels_in(&mut tx, planet_id).await?;
    let position = next_child_position(&channels, parent_position, None)?;

    let is_default = input.is_default.unwrap_or(false);
    if is_default {
        sqlx::query("UPDATE channels SET is_default = 0 WHERE planet_id = ?")
            .bind(planet_id)
            .execute(&mut *tx)
            .await?;
    }

    let created = Channel {
        id: snowflake::generate(),
        planet_id,
        name: input.name.clone(),
        kind: input.kind,
        position,
        parent_id: input.parent_id,
        inherits_perms: input.inherits_perms.unwrap_or(input.parent_id.is_some()),
        is_default,
    };
    sqlx::query(
        "INSERT INTO channels (id, planet_id, name, type, raw_position, parent_id, inherits_perms, is_default) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(created.id)
    .bind(created.planet_id)
    .bind(&created.name)
    .bind(created.kind.as_str())
    .bind(i64::from(created.position.raw()))
    .bind(created.parent_id)
    .bind(created.inherits_perms)
    .bind(created.is_default)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::debug!(
        planet_id,
        channel_id = created.id,
        position = %created.position,
        "created channel"
    );
    Ok(created)
}

/// Move a channel, with everything nested in it, to the end of another
/// parent. All affected positions are rewritten in one transaction.
pub async fn move_channel(
    pool: &SqlitePool,
    channel_id: i64,
    new_parent_id: Option<i64>,
) -> Result<Channel, AppError> {
    let mut tx = pool.begin().await?;

    let moved = find_channel_in(&mut tx, channel_id)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_channel".to_string()))?;
    let channels = list_channels_in(&mut tx, moved.planet_id).await?;

    let new_parent_position = match new_parent_id {
        Some(parent_id) => {
            let parent = channels
                .iter()
                .find(|c| c.id == parent_id)
                .ok_or_else(|| AppError::NotFound("unknown_channel".to_string()))?;
            require_category(parent, moved.planet_id)?;
            if parent.id == moved.id || parent.position.is_descendant_of(moved.position) {
                return Err(AppError::BadRequest(
                    "a category cannot be moved into itself".to_string(),
                ));
            }
            parent.position
        }
        None => ChannelPosition::ROOT,
    };

    let new_position = next_child_position(&channels, new_parent_position, Some(moved.id))?;
    let subtree = channel::descendants(&channels, moved.position);

    // Validate every new position before touching any row.
    let mut rewrites = Vec::with_capacity(subtree.len() + 1);
    rewrites.push((moved.id, new_position));
    for nested in subtree {
        let rebased = nested
            .position
            .rebase(moved.position, new_position)
            .map_err(|e| match e {
                PositionError::DepthExceeded { .. } => AppError::BadRequest(format!(
                    "moving channel {} would nest channel {} too deep",
                    moved.id, nested.id
                )),
                other => AppError::Position(other),
            })?;
        rewrites.push((nested.id, rebased));
    }

    for (id, position) in &rewrites {
        sqlx::query("UPDATE channels SET raw_position = ? WHERE id = ?")
            .bind(i64::from(position.raw()))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("UPDATE channels SET parent_id = ? WHERE id = ?")
        .bind(new_parent_id)
        .bind(moved.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(
        channel_id,
        from = %moved.position,
        to = %new_position,
        nested = subtree.len(),
        "moved channel"
    );
    get_channel(pool, channel_id).await
}

pub async fn set_inherits_perms(
    pool: &SqlitePool,
    channel_id: i64,
    inherits: bool,
) -> Result<Channel, AppError> {
    let changed = sqlx::query("UPDATE channels SET inherits_perms = ? WHERE id = ?")
        .bind(inherits)
        .bind(channel_id)
        .execute(pool)
        .await?
        .rows_affected();
    if changed == 0 {
        return Err(AppError::NotFound("unknown_channel".to_string()));
    }
    get_channel(pool, channel_id).await
}
