use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::utils::jwt;

/// The caller behind a valid bearer token. Extraction fails with 401 when the
/// token is missing, invalid, or belongs to a missing or inactive account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub is_staff: bool,
    pub is_active: bool,
}

impl AuthUser {
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You do not have permission to perform this action.".to_string(),
            ))
        }
    }
}

/// An authenticated caller with the staff flag set; 403 otherwise.
#[derive(Debug, Clone)]
pub struct StaffUser(pub AuthUser);

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

async fn authenticate(
    token: Option<String>,
    config: Option<web::Data<AppConfig>>,
    pool: Option<web::Data<PgPool>>,
) -> Result<AuthUser, AppError> {
    let token = token.ok_or_else(|| {
        AppError::Unauthorized("Authentication credentials were not provided.".to_string())
    })?;
    let (config, pool) = config.zip(pool).ok_or_else(|| {
        AppError::InternalServerError("Application state is not registered".to_string())
    })?;

    let claims = jwt::validate_token(&token, &config.jwt_secret)
        .map_err(|err| AppError::Unauthorized(format!("Given token not valid: {}", err)))?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;

    let user = sqlx::query_as::<_, AuthUser>(
        "SELECT id, username, is_staff, is_active FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if !user.is_active {
        return Err(AppError::Unauthorized("User is inactive".to_string()));
    }
    Ok(user)
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = bearer_token(req).map(str::to_owned);
        let config = req.app_data::<web::Data<AppConfig>>().cloned();
        let pool = req.app_data::<web::Data<PgPool>>().cloned();

        Box::pin(async move { authenticate(token, config, pool).await.map_err(Into::into) })
    }
}

impl FromRequest for StaffUser {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let user = AuthUser::from_request(req, payload);
        Box::pin(async move {
            let user = user.await?;
            user.require_staff()?;
            Ok(StaffUser(user))
        })
    }
}
