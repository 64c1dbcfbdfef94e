use sqlx::{Row, SqlitePool};

use super::roles::get_role;
use crate::error::AppError;
use crate::membership::RoleMembership;
use crate::models::member::Member;
use crate::snowflake;

/// Column and bit that store membership index `index`.
pub(crate) fn membership_column(index: u8) -> (&'static str, i64) {
    const COLUMNS: [&str; 4] = ["rf0", "rf1", "rf2", "rf3"];
    let bit = 1u64 << (index & 63);
    (COLUMNS[usize::from(index >> 6)], bit as i64)
}

fn row_to_member(row: sqlx::sqlite::SqliteRow) -> Member {
    Member {
        id: row.get("id"),
        user_id: row.get("user_id"),
        planet_id: row.get("planet_id"),
        role_membership: RoleMembership::from_columns([
            row.get("rf0"),
            row.get("rf1"),
            row.get("rf2"),
            row.get("rf3"),
        ]),
    }
}

const SELECT_MEMBERS: &str = "SELECT id, user_id, planet_id, rf0, rf1, rf2, rf3 FROM members";

pub async fn find_member(pool: &SqlitePool, member_id: i64) -> Result<Option<Member>, AppError> {
    let row = sqlx::query(&format!("{SELECT_MEMBERS} WHERE id = ?"))
        .bind(member_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(row_to_member))
}

pub async fn get_member(pool: &SqlitePool, member_id: i64) -> Result<Member, AppError> {
    find_member(pool, member_id)
        .await?
        .ok_or_else(|| AppError::NotFound("member not found".to_string()))
}

pub async fn get_member_by_user(
    pool: &SqlitePool,
    planet_id: i64,
    user_id: i64,
) -> Result<Member, AppError> {
    let row = sqlx::query(&format!(
        "{SELECT_MEMBERS} WHERE planet_id = ? AND user_id = ?"
    ))
    .bind(planet_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("member not found".to_string()))?;

    Ok(row_to_member(row))
}

pub async fn list_members(pool: &SqlitePool, planet_id: i64) -> Result<Vec<Member>, AppError> {
    let rows = sqlx::query(&format!(
        "{SELECT_MEMBERS} WHERE planet_id = ? ORDER BY id"
    ))
    .bind(planet_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(row_to_member).collect())
}

/// Join a user to a planet holding only the default role.
pub async fn add_member(pool: &SqlitePool, planet_id: i64, user_id: i64) -> Result<Member, AppError> {
    let member = Member {
        id: snowflake::generate(),
        user_id,
        planet_id,
        role_membership: RoleMembership::DEFAULT,
    };
    let [rf0, rf1, rf2, rf3] = member.role_membership.to_columns();

    sqlx::query(
        "INSERT INTO members (id, user_id, planet_id, rf0, rf1, rf2, rf3) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(member.id)
    .bind(member.user_id)
    .bind(member.planet_id)
    .bind(rf0)
    .bind(rf1)
    .bind(rf2)
    .bind(rf3)
    .execute(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("user is already a member of this planet".to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::NotFound("unknown_planet".to_string())
        }
        _ => AppError::from(e),
    })?;

    Ok(member)
}

/// Give a member a role of their planet. Setting the bit is a single
/// statement, so concurrent grants never lose each other's bits.
pub async fn grant_role(pool: &SqlitePool, member_id: i64, role_id: i64) -> Result<Member, AppError> {
    let member = get_member(pool, member_id).await?;
    let role = get_role(pool, role_id).await?;
    if role.planet_id != member.planet_id {
        return Err(AppError::BadRequest(
            "role and member are not on the same planet".to_string(),
        ));
    }

    let (column, bit) = membership_column(role.flag_bit_index);
    sqlx::query(&format!("UPDATE members SET {column} = {column} | ? WHERE id = ?"))
        .bind(bit)
        .bind(member.id)
        .execute(pool)
        .await?;

    get_member(pool, member_id).await
}

pub async fn revoke_role(pool: &SqlitePool, member_id: i64, role_id: i64) -> Result<Member, AppError> {
    let member = get_member(pool, member_id).await?;
    let role = get_role(pool, role_id).await?;
    if role.planet_id != member.planet_id {
        return Err(AppError::BadRequest(
            "role and member are not on the same planet".to_string(),
        ));
    }
    if role.is_default {
        return Err(AppError::BadRequest(
            "the default role cannot be removed from members".to_string(),
        ));
    }

    let (column, bit) = membership_column(role.flag_bit_index);
    sqlx::query(&format!("UPDATE members SET {column} = {column} & ? WHERE id = ?"))
        .bind(!bit)
        .bind(member.id)
        .execute(pool)
        .await?;

    get_member(pool, member_id).await
}
