use chrono::Utc;
use log::info;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{AdminBootstrap, AppConfig};
use crate::errors::AppError;
use crate::models::permission::DEFAULT_PERMISSIONS;
use crate::utils::password;

pub async fn create_pool(config: &AppConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

/// Inserts any catalogue permission that is not present yet.
pub async fn seed_permissions(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut inserted = 0;
    for (codename, name) in DEFAULT_PERMISSIONS {
        let result = sqlx::query(
            "INSERT INTO permissions (id, codename, name) VALUES ($1, $2, $3) ON CONFLICT (codename) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(*codename)
        .bind(*name)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }
    if inserted > 0 {
        info!("Seeded {} permissions", inserted);
    }
    Ok(())
}

/// Creates an active staff account unless the username is already taken.
pub async fn bootstrap_admin(pool: &PgPool, admin: &AdminBootstrap) -> Result<(), AppError> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
        .bind(&admin.username)
        .fetch_one(pool)
        .await?;
    if exists {
        return Ok(());
    }

    let password_hash = password::hash_password(&admin.password)?;
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, username, password, is_staff, is_active, date_joined, updated_at) \
         VALUES ($1, $2, $3, TRUE, TRUE, $4, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(&admin.username)
    .bind(&password_hash)
    .bind(now)
    .execute(pool)
    .await?;

    info!("Created staff account '{}'", admin.username);
    Ok(())
}
