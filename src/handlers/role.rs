use actix_web::{web, HttpResponse};
use serde::Deserialize;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::errors::{AppError, AppResult, FieldErrors};
use crate::handlers::permission::existing_permission_ids;
use crate::models::role::{Role, RoleResponse};
use crate::utils::auth::StaffUser;
use crate::utils::validation::{missing_ids, unique_ids, validate_not_blank, validate_payload};

#[derive(Deserialize, Validate)]
pub struct NewRole {
    #[validate(length(min = 1, max = 150), custom = "validate_not_blank")]
    name: String,
    permissions: Vec<Uuid>,
}

#[derive(Deserialize, Validate)]
pub struct RoleUpdate {
    #[validate(length(min = 1, max = 150), custom = "validate_not_blank")]
    name: Option<String>,
    permissions: Option<Vec<Uuid>>,
}

fn role_not_found() -> AppError {
    AppError::NotFound("Not found.".to_string())
}

async fn role_permission_ids(pool: &PgPool, role_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT permission_id FROM role_permissions WHERE role_id = $1 ORDER BY permission_id",
    )
    .bind(role_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Field errors for a role name clash and unknown permission ids.
async fn check_role(
    pool: &PgPool,
    name: Option<&str>,
    role_id: Option<Uuid>,
    permissions: Option<&[Uuid]>,
) -> AppResult<FieldErrors> {
    let mut fields = FieldErrors::new();

    if let Some(name) = name {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM roles WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(name)
        .bind(role_id)
        .fetch_one(pool)
        .await?;
        if taken {
            fields.insert("name".to_string(), vec!["group with this name already exists.".to_string()]);
        }
    }

    if let Some(permissions) = permissions {
        let found = existing_permission_ids(pool, permissions).await?;
        let missing = missing_ids(permissions, &found);
        if !missing.is_empty() {
            fields.insert(
                "permissions".to_string(),
                missing
                    .iter()
                    .map(|id| format!("Invalid pk \"{}\" - object does not exist.", id))
                    .collect(),
            );
        }
    }

    Ok(fields)
}

async fn replace_permissions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    role_id: Uuid,
    permissions: &[Uuid],
) -> AppResult<()> {
    sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
        .bind(role_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        "INSERT INTO role_permissions (role_id, permission_id) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
    )
    .bind(role_id)
    .bind(permissions)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn list_roles(_staff: StaffUser, pool: web::Data<PgPool>) -> AppResult<HttpResponse> {
    let roles = sqlx::query_as::<_, Role>("SELECT id, name FROM roles ORDER BY name")
        .fetch_all(&**pool)
        .await?;

    let links = sqlx::query_as::<_, (Uuid, Uuid)>(
        "SELECT role_id, permission_id FROM role_permissions ORDER BY permission_id",
    )
    .fetch_all(&**pool)
    .await?;

    let mut by_role: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (role_id, permission_id) in links {
        by_role.entry(role_id).or_default().push(permission_id);
    }

    let response: Vec<RoleResponse> = roles
        .into_iter()
        .map(|role| {
            let permissions = by_role.remove(&role.id).unwrap_or_default();
            RoleResponse::new(role, permissions)
        })
        .collect();
    Ok(HttpResponse::Ok().json(response))
}

pub async fn create_role(
    StaffUser(user): StaffUser,
    pool: web::Data<PgPool>,
    new_role: web::Json<NewRole>,
) -> AppResult<HttpResponse> {
    validate_payload(&*new_role)?;
    let new_role = new_role.into_inner();
    let permissions = unique_ids(&new_role.permissions);

    let fields = check_role(&pool, Some(&new_role.name), None, Some(&permissions)).await?;
    if !fields.is_empty() {
        return Err(AppError::Validation(fields));
    }

    let role = Role { id: Uuid::new_v4(), name: new_role.name };

    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO roles (id, name) VALUES ($1, $2)")
        .bind(role.id)
        .bind(&role.name)
        .execute(&mut *tx)
        .await?;
    replace_permissions(&mut tx, role.id, &permissions).await?;
    tx.commit().await?;

    log::info!("Role '{}' created by {}", role.name, user.username);
    Ok(HttpResponse::Created().json(RoleResponse::new(role, permissions)))
}

pub async fn get_role(
    _staff: StaffUser,
    pool: web::Data<PgPool>,
    role_id: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let role = sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE id = $1")
        .bind(role_id.into_inner())
        .fetch_optional(&**pool)
        .await?
        .ok_or_else(role_not_found)?;
    let permissions = role_permission_ids(&pool, role.id).await?;
    Ok(HttpResponse::Ok().json(RoleResponse::new(role, permissions)))
}

/// Renames the role and, when `permissions` is present, replaces its
/// permission set.
pub async fn update_role(
    StaffUser(user): StaffUser,
    pool: web::Data<PgPool>,
    role_id: web::Path<Uuid>,
    updates: web::Json<RoleUpdate>,
) -> AppResult<HttpResponse> {
    validate_payload(&*updates)?;
    let updates = updates.into_inner();
    let role_id = role_id.into_inner();

    let mut role = sqlx::query_as::<_, Role>("SELECT id, name FROM roles WHERE id = $1")
        .bind(role_id)
        .fetch_optional(&**pool)
        .await?
        .ok_or_else(role_not_found)?;

    let permissions = updates.permissions.as_deref().map(unique_ids);
    let fields = check_role(
        &pool,
        updates.name.as_deref(),
        Some(role_id),
        permissions.as_deref(),
    )
    .await?;
    if !fields.is_empty() {
        return Err(AppError::Validation(fields));
    }

    let mut tx = pool.begin().await?;
    if let Some(name) = updates.name {
        sqlx::query("UPDATE roles SET name = $1 WHERE id = $2")
            .bind(&name)
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        role.name = name;
    }
    if let Some(permissions) = &permissions {
        replace_permissions(&mut tx, role_id, permissions).await?;
    }
    tx.commit().await?;

    log::info!("Role {} updated by {}", role_id, user.username);

    let permissions = role_permission_ids(&pool, role_id).await?;
    Ok(HttpResponse::Ok().json(RoleResponse::new(role, permissions)))
}

pub async fn delete_role(
    StaffUser(user): StaffUser,
    pool: web::Data<PgPool>,
    role_id: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let role_id = role_id.into_inner();
    let result = sqlx::query("DELETE FROM roles WHERE id = $1")
        .bind(role_id)
        .execute(&**pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(role_not_found());
    }
    log::info!("Role {} deleted by {}", role_id, user.username);
    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_role_requires_permissions_list() {
        assert!(serde_json::from_str::<NewRole>(r#"{"name": "Nurses"}"#).is_err());
        let role: NewRole =
            serde_json::from_str(r#"{"name": "Nurses", "permissions": []}"#).unwrap();
        assert!(validate_payload(&role).is_ok());
    }

    #[test]
    fn role_name_cannot_be_blank() {
        let role: NewRole = serde_json::from_str(r#"{"name": "  ", "permissions": []}"#).unwrap();
        assert!(matches!(validate_payload(&role), Err(AppError::Validation(_))));
    }
}
