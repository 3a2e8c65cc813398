use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::{AppConfig, MAX_TREE_DEPTH};
use crate::errors::{AppError, AppResult, FieldErrors};
use crate::models::department::{Department, DepartmentForest, DEPARTMENT_COLUMNS};
use crate::utils::auth::{AuthUser, StaffUser};
use crate::utils::validation::{
    double_option, trimmed, trimmed_option, validate_not_blank, validate_payload,
};

const DUPLICATE_NAME: &str = "This department name already exists.";

#[derive(Deserialize, Validate)]
pub struct NewDepartment {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    #[serde(deserialize_with = "trimmed")]
    name: String,
    #[serde(default)]
    parent: Option<Uuid>,
    #[serde(default)]
    description: Option<String>,
    #[validate(length(max = 255))]
    #[serde(default)]
    icon: Option<String>,
    is_active: bool,
}

#[derive(Deserialize, Validate)]
pub struct DepartmentUpdate {
    #[validate(length(min = 1, max = 100), custom = "validate_not_blank")]
    #[serde(default, deserialize_with = "trimmed_option")]
    name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    parent: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    description: Option<Option<String>>,
    #[validate(length(max = 255))]
    #[serde(default, deserialize_with = "double_option")]
    icon: Option<Option<String>>,
    is_active: Option<bool>,
}

#[derive(Deserialize, Default)]
pub struct DepartmentQuery {
    depth: Option<u32>,
    name: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl DepartmentQuery {
    fn depth(&self, config: &AppConfig) -> u32 {
        self.depth.unwrap_or(config.tree_default_depth).min(MAX_TREE_DEPTH)
    }
}

async fn load_forest(pool: &PgPool) -> AppResult<DepartmentForest> {
    let rows = sqlx::query_as::<_, Department>(&format!(
        "SELECT {} FROM departments ORDER BY name",
        DEPARTMENT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(DepartmentForest::new(rows))
}

fn not_found() -> AppError {
    AppError::NotFound("No Department matches the given query.".to_string())
}

fn missing_parent(parent: Uuid) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", parent)
}

/// Active departments, optionally filtered by a case-insensitive name fragment.
pub async fn list_departments(
    _user: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    query: web::Query<DepartmentQuery>,
) -> AppResult<HttpResponse> {
    let forest = load_forest(&pool).await?;
    let needle = query.name.as_ref().map(|n| n.to_lowercase());

    let selected = forest
        .active()
        .filter(|d| match &needle {
            Some(needle) => d.name.to_lowercase().contains(needle),
            None => true,
        })
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX));

    Ok(HttpResponse::Ok().json(forest.nodes(selected, query.depth(&config))))
}

/// Active top-level departments.
pub async fn list_parent_departments(
    _user: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    query: web::Query<DepartmentQuery>,
) -> AppResult<HttpResponse> {
    let forest = load_forest(&pool).await?;
    Ok(HttpResponse::Ok().json(forest.nodes(forest.active_roots(), query.depth(&config))))
}

/// Active top-level departments with their active descendants nested up to
/// `?depth=` levels.
pub async fn department_tree(
    _user: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    query: web::Query<DepartmentQuery>,
) -> AppResult<HttpResponse> {
    let forest = load_forest(&pool).await?;
    let depth = query.depth(&config);
    log::debug!("Building department tree with depth {}", depth);
    Ok(HttpResponse::Ok().json(forest.nodes(forest.active_roots(), depth)))
}

/// Every active department that has a parent.
pub async fn list_child_departments(
    _user: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    query: web::Query<DepartmentQuery>,
) -> AppResult<HttpResponse> {
    let forest = load_forest(&pool).await?;
    Ok(HttpResponse::Ok().json(forest.nodes(forest.active_non_roots(), query.depth(&config))))
}

pub async fn list_children_by_parent(
    _user: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    parent_id: web::Path<Uuid>,
    query: web::Query<DepartmentQuery>,
) -> AppResult<HttpResponse> {
    let forest = load_forest(&pool).await?;
    let children = forest.children_of(parent_id.into_inner());
    Ok(HttpResponse::Ok().json(forest.nodes(children, query.depth(&config))))
}

pub async fn get_department(
    _user: AuthUser,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    department_id: web::Path<Uuid>,
    query: web::Query<DepartmentQuery>,
) -> AppResult<HttpResponse> {
    let forest = load_forest(&pool).await?;
    let department = forest
        .get(department_id.into_inner())
        .filter(|d| d.is_active)
        .ok_or_else(not_found)?;
    Ok(HttpResponse::Ok().json(forest.node(department, query.depth(&config))))
}

pub async fn create_department(
    StaffUser(user): StaffUser,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    new_department: web::Json<NewDepartment>,
) -> AppResult<HttpResponse> {
    validate_payload(&*new_department)?;
    let new_department = new_department.into_inner();

    let mut fields = FieldErrors::new();

    let name_taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM departments WHERE name = $1)",
    )
    .bind(&new_department.name)
    .fetch_one(&**pool)
    .await?;
    if name_taken {
        fields.insert("name".to_string(), vec![DUPLICATE_NAME.to_string()]);
    }

    if let Some(parent) = new_department.parent {
        let parent_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM departments WHERE id = $1)",
        )
        .bind(parent)
        .fetch_one(&**pool)
        .await?;
        if !parent_exists {
            fields.insert("parent".to_string(), vec![missing_parent(parent)]);
        }
    }

    if !fields.is_empty() {
        return Err(AppError::Validation(fields));
    }

    let department_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO departments (id, parent_id, name, description, icon, is_active, created_at, updated_at, created_by, updated_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8, $8)",
    )
    .bind(department_id)
    .bind(new_department.parent)
    .bind(&new_department.name)
    .bind(&new_department.description)
    .bind(&new_department.icon)
    .bind(new_department.is_active)
    .bind(now)
    .bind(user.id)
    .execute(&**pool)
    .await?;

    log::info!("Department '{}' created by {}", new_department.name, user.username);

    let forest = load_forest(&pool).await?;
    let department = forest
        .get(department_id)
        .ok_or_else(|| AppError::InternalServerError("Created department vanished".to_string()))?;
    Ok(HttpResponse::Created().json(forest.node(department, config.tree_default_depth)))
}

/// Partial update; PUT and PATCH both land here. Inactive departments can be
/// updated, which is how they are reactivated.
pub async fn update_department(
    StaffUser(user): StaffUser,
    pool: web::Data<PgPool>,
    config: web::Data<AppConfig>,
    department_id: web::Path<Uuid>,
    updates: web::Json<DepartmentUpdate>,
) -> AppResult<HttpResponse> {
    validate_payload(&*updates)?;
    let updates = updates.into_inner();
    let department_id = department_id.into_inner();

    let forest = load_forest(&pool).await?;
    forest.get(department_id).ok_or_else(not_found)?;

    let mut fields = FieldErrors::new();

    if let Some(name) = &updates.name {
        let duplicate = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM departments WHERE name = $1 AND id <> $2)",
        )
        .bind(name)
        .bind(department_id)
        .fetch_one(&**pool)
        .await?;
        if duplicate {
            fields.insert("name".to_string(), vec![DUPLICATE_NAME.to_string()]);
        }
    }

    if let Some(Some(parent)) = updates.parent {
        if forest.get(parent).is_none() {
            fields.insert("parent".to_string(), vec![missing_parent(parent)]);
        } else if forest.would_create_cycle(department_id, parent) {
            fields.insert(
                "parent".to_string(),
                vec!["A department cannot be placed under itself or one of its descendants."
                    .to_string()],
            );
        }
    }

    if !fields.is_empty() {
        return Err(AppError::Validation(fields));
    }

    let mut query = sqlx::QueryBuilder::<sqlx::Postgres>::new("UPDATE departments SET ");
    let mut separated = query.separated(", ");

    if let Some(name) = updates.name {
        separated.push("name = ");
        separated.push_bind_unseparated(name);
    }
    if let Some(parent) = updates.parent {
        separated.push("parent_id = ");
        separated.push_bind_unseparated(parent);
    }
    if let Some(description) = updates.description {
        separated.push("description = ");
        separated.push_bind_unseparated(description);
    }
    if let Some(icon) = updates.icon {
        separated.push("icon = ");
        separated.push_bind_unseparated(icon);
    }
    if let Some(is_active) = updates.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    separated.push("updated_by = ");
    separated.push_bind_unseparated(user.id);
    query.push(" WHERE id = ");
    query.push_bind(department_id);

    query.build().execute(&**pool).await?;

    log::info!("Department {} updated by {}", department_id, user.username);

    let forest = load_forest(&pool).await?;
    let department = forest.get(department_id).ok_or_else(not_found)?;
    Ok(HttpResponse::Ok().json(forest.node(department, config.tree_default_depth)))
}

/// Soft delete: the row stays, flagged inactive.
pub async fn delete_department(
    StaffUser(user): StaffUser,
    pool: web::Data<PgPool>,
    department_id: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let department_id = department_id.into_inner();

    let result = sqlx::query(
        "UPDATE departments SET is_active = FALSE, updated_at = $1, updated_by = $2 WHERE id = $3",
    )
    .bind(Utc::now())
    .bind(user.id)
    .bind(department_id)
    .execute(&**pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(not_found());
    }

    log::info!("Department {} deactivated by {}", department_id, user.username);
    Ok(HttpResponse::NoContent().finish())
}
