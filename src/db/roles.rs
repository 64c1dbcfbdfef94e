use std::collections::HashSet;

use sqlx::{Row, SqliteConnection, SqlitePool};

use super::members::membership_column;
use super::narrow;
use super::planets::DEFAULT_ROLE_POSITION;
use crate::error::AppError;
use crate::membership::ROLE_SLOTS;
use crate::models::permission;
use crate::models::role::{CreateRole, Role, RolePositionUpdate};
use crate::snowflake;

fn row_to_role(row: sqlx::sqlite::SqliteRow) -> Result<Role, AppError> {
    Ok(Role {
        id: row.get("id"),
        planet_id: row.get("planet_id"),
        name: row.get("name"),
        position: narrow(row.get("position"), "roles.position")?,
        flag_bit_index: narrow(row.get("flag_bit_index"), "roles.flag_bit_index")?,
        is_admin: row.get("is_admin"),
        is_default: row.get("is_default"),
        permissions: row.get("permissions"),
        chat_permissions: row.get("chat_permissions"),
        category_permissions: row.get("category_permissions"),
        voice_permissions: row.get("voice_permissions"),
    })
}

const SELECT_ROLES: &str = "SELECT id, planet_id, name, position, flag_bit_index, is_admin, is_default, permissions, chat_permissions, category_permissions, voice_permissions FROM roles";

pub async fn get_role(pool: &SqlitePool, role_id: i64) -> Result<Role, AppError> {
    let row = sqlx::query(&format!("{SELECT_ROLES} WHERE id = ?"))
        .bind(role_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_role".to_string()))?;

    row_to_role(row)
}

/// Every role of the planet, highest authority first.
pub async fn list_roles(pool: &SqlitePool, planet_id: i64) -> Result<Vec<Role>, AppError> {
    let rows = sqlx::query(&format!(
        "{SELECT_ROLES} WHERE planet_id = ? ORDER BY position, id"
    ))
    .bind(planet_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_role).collect()
}

pub async fn get_default_role(pool: &SqlitePool, planet_id: i64) -> Result<Role, AppError> {
    let row = sqlx::query(&format!(
        "{SELECT_ROLES} WHERE planet_id = ? AND is_default = 1"
    ))
    .bind(planet_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("planet has no default role".to_string()))?;

    row_to_role(row)
}

pub(crate) async fn insert_role(conn: &mut SqliteConnection, role: &Role) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO roles (id, planet_id, name, position, flag_bit_index, is_admin, is_default, permissions, chat_permissions, category_permissions, voice_permissions) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    )
    .bind(role.id)
    .bind(role.planet_id)
    .bind(&role.name)
    .bind(i64::from(role.position))
    .bind(i64::from(role.flag_bit_index))
    .bind(role.is_admin)
    .bind(role.is_default)
    .bind(role.permissions)
    .bind(role.chat_permissions)
    .bind(role.category_permissions)
    .bind(role.voice_permissions)
    .execute(&mut *conn)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!(
            "role index {} is already taken",
            role.flag_bit_index
        )),
        _ => AppError::from(e),
    })?;
    Ok(())
}

/// Pick the membership slot for a new role: the requested one if it is
/// valid and free, otherwise the lowest free slot.
fn allocate_flag_index(requested: Option<i64>, used: &HashSet<u8>) -> Result<u8, AppError> {
    match requested {
        Some(index) => {
            let index = u8::try_from(index).map_err(|_| {
                AppError::BadRequest(format!(
                    "role index {index} is outside 0..{ROLE_SLOTS}"
                ))
            })?;
            if used.contains(&index) {
                return Err(AppError::Conflict(format!("role index {index} is already taken")));
            }
            Ok(index)
        }
        None => (0..=u8::MAX)
            .find(|index| !used.contains(index))
            .ok_or_else(|| {
                AppError::Conflict(format!("planet already has {ROLE_SLOTS} roles"))
            }),
    }
}

pub async fn create_role(
    pool: &SqlitePool,
    planet_id: i64,
    input: &CreateRole,
) -> Result<Role, AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("role name must not be empty".to_string()));
    }
    if input.position == Some(DEFAULT_ROLE_POSITION) {
        return Err(AppError::BadRequest(
            "that position is reserved for the default role".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let used: HashSet<u8> = sqlx::query_scalar::<_, i64>(
        "SELECT flag_bit_index FROM roles WHERE planet_id = ?",
    )
    .bind(planet_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .filter_map(|index| u8::try_from(index).ok())
    .collect();
    let flag_bit_index = allocate_flag_index(input.flag_bit_index, &used)?;

    let position = match input.position {
        Some(position) => position,
        None => {
            let max_pos: Option<i64> = sqlx::query_scalar(
                "SELECT MAX(position) FROM roles WHERE planet_id = ? AND is_default = 0",
            )
            .bind(planet_id)
            .fetch_one(&mut *tx)
            .await?;
            let next = max_pos.map_or(0, |p| p + 1);
            narrow::<u32>(next, "roles.position")?.min(DEFAULT_ROLE_POSITION - 1)
        }
    };

    let role = Role {
        id: snowflake::generate(),
        planet_id,
        name: input.name.clone(),
        position,
        flag_bit_index,
        is_admin: input.is_admin.unwrap_or(false),
        is_default: false,
        permissions: input.permissions.unwrap_or(permission::planet::DEFAULT),
        chat_permissions: input.chat_permissions(),
        category_permissions: input.category_permissions(),
        voice_permissions: input.voice_permissions(),
    };
    insert_role(&mut tx, &role).await?;
    tx.commit().await?;

    tracing::debug!(planet_id, role_id = role.id, flag_bit_index, "created role");
    Ok(role)
}

/// Delete a role, its permission nodes and its bit in every membership, in
/// one transaction. Returns the number of members that held the role.
pub async fn delete_role(pool: &SqlitePool, role_id: i64) -> Result<u64, AppError> {
    let role = get_role(pool, role_id).await?;
    if role.is_default {
        return Err(AppError::BadRequest("the default role cannot be deleted".to_string()));
    }
    let (column, bit) = membership_column(role.flag_bit_index);

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM permission_nodes WHERE role_id = ?")
        .bind(role.id)
        .execute(&mut *tx)
        .await?;
    let cleared = sqlx::query(&format!(
        "UPDATE members SET {column} = {column} & ? WHERE planet_id = ? AND ({column} & ?) != 0"
    ))
    .bind(!bit)
    .bind(role.planet_id)
    .bind(bit)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(role.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(
        planet_id = role.planet_id,
        role_id,
        members = cleared,
        "deleted role"
    );
    Ok(cleared)
}

/// Change role positions. Membership indices stay as they are.
pub async fn reorder_roles(
    pool: &SqlitePool,
    planet_id: i64,
    updates: &[RolePositionUpdate],
) -> Result<(), AppError> {
    if updates.iter().any(|u| u.position == DEFAULT_ROLE_POSITION) {
        return Err(AppError::BadRequest(
            "that position is reserved for the default role".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;
    for update in updates {
        let changed = sqlx::query(
            "UPDATE roles SET position = ? WHERE id = ? AND planet_id = ? AND is_default = 0",
        )
        .bind(i64::from(update.position))
        .bind(update.id)
        .bind(planet_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if changed == 0 {
            return Err(AppError::NotFound(format!(
                "role {} is not a movable role of planet {planet_id}",
                update.id
            )));
        }
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_lowest_free_index() {
        let used: HashSet<u8> = [0, 1, 3].into_iter().collect();
        assert_eq!(allocate_flag_index(None, &used).unwrap(), 2);
        assert_eq!(allocate_flag_index(Some(200), &used).unwrap(), 200);
    }

    #[test]
    fn test_rejects_out_of_range_and_taken_indices() {
        let used: HashSet<u8> = [0].into_iter().collect();
        assert!(matches!(
            allocate_flag_index(Some(256), &used),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            allocate_flag_index(Some(-1), &used),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            allocate_flag_index(Some(0), &used),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_exhausted_slots_are_rejected() {
        let used: HashSet<u8> = (0..=u8::MAX).collect();
        assert!(matches!(
            allocate_flag_index(None, &used),
            Err(AppError::Conflict(_))
        ));
    }
}
