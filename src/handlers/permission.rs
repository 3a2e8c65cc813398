use actix_web::{web, HttpResponse};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::permission::Permission;
use crate::utils::auth::StaffUser;

/// Ids from `ids` that exist in the permission catalogue.
pub(crate) async fn existing_permission_ids<'e, E>(executor: E, ids: &[Uuid]) -> AppResult<Vec<Uuid>>
where
    E: sqlx::PgExecutor<'e>,
{
    let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM permissions WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(executor)
        .await?;
    Ok(found)
}

pub async fn list_permissions(_staff: StaffUser, pool: web::Data<PgPool>) -> AppResult<HttpResponse> {
    let permissions = sqlx::query_as::<_, Permission>(
        "SELECT id, codename, name FROM permissions ORDER BY codename",
    )
    .fetch_all(&**pool)
    .await?;
    Ok(HttpResponse::Ok().json(permissions))
}

pub async fn get_permission(
    _staff: StaffUser,
    pool: web::Data<PgPool>,
    permission_id: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let permission = sqlx::query_as::<_, Permission>(
        "SELECT id, codename, name FROM permissions WHERE id = $1",
    )
    .bind(permission_id.into_inner())
    .fetch_optional(&**pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Not found.".to_string()))?;
    Ok(HttpResponse::Ok().json(permission))
}
