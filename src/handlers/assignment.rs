use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::errors::{AppError, AppResult};
use crate::handlers::permission::existing_permission_ids;
use crate::models::role::{Role, UserRolesResponse};
use crate::utils::auth::StaffUser;
use crate::utils::validation::{missing_ids, unique_ids, validate_payload};

#[derive(Deserialize)]
pub struct AssignRoleRequest {
    user_id: Uuid,
    #[serde(default)]
    group_id: Option<Uuid>,
    #[serde(default, alias = "role_ids")]
    group_ids: Vec<Uuid>,
}

impl AssignRoleRequest {
    fn role_ids(&self) -> Vec<Uuid> {
        let mut ids = self.group_ids.clone();
        ids.extend(self.group_id);
        unique_ids(&ids)
    }
}

#[derive(Deserialize, Validate)]
pub struct PermissionAssignRequest {
    user_id: Uuid,
    #[validate(length(min = 1, message = "This list may not be empty."))]
    permission_ids: Vec<Uuid>,
}

#[derive(Clone, Copy, Debug)]
enum PermissionChange {
    Assign,
    Remove,
}

async fn user_exists<'e, E>(executor: E, user_id: Uuid) -> AppResult<bool>
where
    E: sqlx::PgExecutor<'e>,
{
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

async fn direct_permission_ids(pool: &PgPool, user_id: Uuid) -> AppResult<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT permission_id FROM user_permissions WHERE user_id = $1 ORDER BY permission_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

fn group_not_found() -> AppError {
    AppError::NotFound("Group not found.".to_string())
}

/// Adds roles to a user. Existing links are kept, so repeating a call is
/// harmless.
pub async fn assign_role(
    StaffUser(staff): StaffUser,
    pool: web::Data<PgPool>,
    req: web::Json<AssignRoleRequest>,
) -> AppResult<HttpResponse> {
    let role_ids = req.role_ids();
    if role_ids.is_empty() {
        return Err(group_not_found());
    }

    let mut tx = pool.begin().await?;

    if !user_exists(&mut *tx, req.user_id).await? {
        return Err(AppError::NotFound("User not found.".to_string()));
    }
    let found = sqlx::query_scalar::<_, Uuid>("SELECT id FROM roles WHERE id = ANY($1)")
        .bind(&role_ids)
        .fetch_all(&mut *tx)
        .await?;
    if !missing_ids(&role_ids, &found).is_empty() {
        return Err(group_not_found());
    }

    sqlx::query(
        "INSERT INTO user_roles (user_id, role_id) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
    )
    .bind(req.user_id)
    .bind(&role_ids)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    log::info!("{} assigned {} role(s) to user {}", staff.username, role_ids.len(), req.user_id);
    Ok(HttpResponse::Ok().json(json!({ "detail": "Role assigned successfully." })))
}

pub async fn user_roles(
    _staff: StaffUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let user_id = user_id.into_inner();
    let username = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&**pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

    let roles = sqlx::query_as::<_, Role>(
        "SELECT r.id, r.name FROM roles r JOIN user_roles ur ON ur.role_id = r.id \
         WHERE ur.user_id = $1 ORDER BY r.name",
    )
    .bind(user_id)
    .fetch_all(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(UserRolesResponse { user: username, roles }))
}

/// Checks the user and every requested permission inside `tx`, then applies
/// the change. Nothing is written when any check fails.
async fn change_permissions(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    permission_ids: &[Uuid],
    change: PermissionChange,
) -> AppResult<()> {
    if !user_exists(&mut **tx, user_id).await? {
        return Err(AppError::non_field("User not found."));
    }
    let found = existing_permission_ids(&mut **tx, permission_ids).await?;
    if !missing_ids(permission_ids, &found).is_empty() {
        return Err(AppError::non_field("Some permissions not found."));
    }

    let sql = match change {
        PermissionChange::Assign => {
            "INSERT INTO user_permissions (user_id, permission_id) SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING"
        }
        PermissionChange::Remove => {
            "DELETE FROM user_permissions WHERE user_id = $1 AND permission_id = ANY($2)"
        }
    };
    sqlx::query(sql)
        .bind(user_id)
        .bind(permission_ids)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn handle_permission_change(
    staff: StaffUser,
    pool: web::Data<PgPool>,
    req: web::Json<PermissionAssignRequest>,
    change: PermissionChange,
) -> AppResult<HttpResponse> {
    validate_payload(&*req)?;
    let permission_ids = unique_ids(&req.permission_ids);

    let mut tx = pool.begin().await?;
    change_permissions(&mut tx, req.user_id, &permission_ids, change).await?;
    tx.commit().await?;

    log::info!(
        "{} {:?} {} permission(s) for user {}",
        staff.0.username,
        change,
        permission_ids.len(),
        req.user_id
    );

    let detail = match change {
        PermissionChange::Assign => "Permissions assigned to user.",
        PermissionChange::Remove => "Permissions removed from user.",
    };
    let permissions = direct_permission_ids(&pool, req.user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "detail": detail, "permissions": permissions })))
}

/// Adds to the user's direct permissions; existing grants are untouched.
pub async fn assign_user_permissions(
    staff: StaffUser,
    pool: web::Data<PgPool>,
    req: web::Json<PermissionAssignRequest>,
) -> AppResult<HttpResponse> {
    handle_permission_change(staff, pool, req, PermissionChange::Assign).await
}

/// Removes the given ids from the user's direct permissions.
pub async fn remove_user_permissions(
    staff: StaffUser,
    pool: web::Data<PgPool>,
    req: web::Json<PermissionAssignRequest>,
) -> AppResult<HttpResponse> {
    handle_permission_change(staff, pool, req, PermissionChange::Remove).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_merge_single_and_list_forms() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let req: AssignRoleRequest = serde_json::from_str(&format!(
            r#"{{"user_id": "{}", "group_id": "{}", "role_ids": ["{}", "{}"]}}"#,
            Uuid::new_v4(),
            a,
            a,
            b
        ))
        .unwrap();
        let ids = req.role_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }

    #[actix_web::test]
    async fn assign_role_without_any_role_is_not_found() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/hospital_test")
            .unwrap();
        let staff = StaffUser(crate::utils::auth::AuthUser {
            id: Uuid::new_v4(),
            username: "chief".to_string(),
            is_staff: true,
            is_active: true,
        });
        let req = AssignRoleRequest { user_id: Uuid::new_v4(), group_id: None, group_ids: vec![] };
        let err = assign_role(staff, web::Data::new(pool), web::Json(req)).await.unwrap_err();
        match err {
            AppError::NotFound(message) => assert_eq!(message, "Group not found."),
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn permission_ids_must_not_be_empty() {
        let req: PermissionAssignRequest = serde_json::from_str(&format!(
            r#"{{"user_id": "{}", "permission_ids": []}}"#,
            Uuid::new_v4()
        ))
        .unwrap();
        match validate_payload(&req) {
            Err(AppError::Validation(fields)) => {
                assert_eq!(fields["permission_ids"], vec!["This list may not be empty.".to_string()]);
            }
            other => panic!("expected validation error, got {:?}", other.err()),
        }
    }

    #[test]
    fn permission_ids_must_be_uuids() {
        let parsed = serde_json::from_str::<PermissionAssignRequest>(
            r#"{"user_id": "00000000-0000-0000-0000-000000000001", "permission_ids": [42]}"#,
        );
        assert!(parsed.is_err());
    }
}
