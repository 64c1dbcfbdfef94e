use sqlx::{Row, SqlitePool};

use crate::error::AppError;
use crate::models::permission::{category, chat, planet, voice};
use crate::models::planet::{CreatePlanet, Planet};
use crate::models::role::Role;
use crate::snowflake;

/// The default role sits below every other role.
pub const DEFAULT_ROLE_POSITION: u32 = u32::MAX;

pub async fn get_planet(pool: &SqlitePool, planet_id: i64) -> Result<Planet, AppError> {
    let row = sqlx::query("SELECT id, name, owner_id FROM planets WHERE id = ?")
        .bind(planet_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_planet".to_string()))?;

    Ok(Planet {
        id: row.get("id"),
        name: row.get("name"),
        owner_id: row.get("owner_id"),
    })
}

pub async fn get_owner_id(pool: &SqlitePool, planet_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar("SELECT owner_id FROM planets WHERE id = ?")
        .bind(planet_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("unknown_planet".to_string()))
}

/// Create a planet together with its default role, which takes membership
/// index 0 and the lowest authority.
pub async fn create_planet(
    pool: &SqlitePool,
    input: &CreatePlanet,
) -> Result<(Planet, Role), AppError> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("planet name must not be empty".to_string()));
    }

    let planet = Planet {
        id: snowflake::generate(),
        name: input.name.clone(),
        owner_id: input.owner_id,
    };
    let default_role = Role {
        id: snowflake::generate(),
        planet_id: planet.id,
        name: "everyone".to_string(),
        position: DEFAULT_ROLE_POSITION,
        flag_bit_index: 0,
        is_admin: false,
        is_default: true,
        permissions: planet::DEFAULT,
        chat_permissions: chat::DEFAULT,
        category_permissions: category::DEFAULT,
        voice_permissions: voice::DEFAULT,
    };

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO planets (id, name, owner_id) VALUES (?, ?, ?)")
        .bind(planet.id)
        .bind(&planet.name)
        .bind(planet.owner_id)
        .execute(&mut *tx)
        .await?;
    super::roles::insert_role(&mut tx, &default_role).await?;
    tx.commit().await?;

    tracing::info!(planet_id = planet.id, owner_id = planet.owner_id, "created planet");
    Ok((planet, default_role))
}
