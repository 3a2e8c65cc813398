use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::utils::validation::validate_payload;
use crate::utils::{jwt, password};

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150))]
    username: String,
    #[validate(length(min = 1))]
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    user_id: Uuid,
    username: String,
    token: String,
    token_type: &'static str,
}

#[derive(sqlx::FromRow)]
struct Credentials {
    id: Uuid,
    username: String,
    password: String,
    is_active: bool,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("No active account found with the given credentials".to_string())
}

pub async fn login(
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    req: web::Json<LoginRequest>,
) -> AppResult<HttpResponse> {
    validate_payload(&*req)?;

    let user = sqlx::query_as::<_, Credentials>(
        "SELECT id, username, password, is_active FROM users WHERE username = $1",
    )
    .bind(&req.username)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(invalid_credentials)?;

    if !password::verify_password(&req.password, &user.password) || !user.is_active {
        log::warn!("Rejected login for '{}'", req.username);
        return Err(invalid_credentials());
    }

    sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(user.id)
        .execute(&**pool)
        .await?;

    let token = jwt::generate_token(user.id, &config.jwt_secret, config.jwt_ttl_hours)
        .map_err(|err| AppError::InternalServerError(format!("Token generation error: {}", err)))?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
        token_type: "Bearer",
    }))
}
