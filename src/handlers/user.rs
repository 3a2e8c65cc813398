use actix_web::{web, HttpResponse};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::{AppError, AppResult, FieldErrors};
use crate::models::permission::Permission;
use crate::models::user::{ProfileResponse, User, USER_COLUMNS};
use crate::utils::auth::{AuthUser, StaffUser};
use crate::utils::password;
use crate::utils::validation::{dmy_date, double_option, validate_blank_or_email, validate_username};

const DUPLICATE_USERNAME: &str = "A user with that username already exists.";

#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 150), custom = "validate_username")]
    username: String,
    #[validate(custom = "validate_blank_or_email")]
    email: Option<String>,
    password: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    first_name: String,
    #[validate(length(max = 150))]
    #[serde(default)]
    last_name: String,
    #[serde(default, deserialize_with = "dmy_date::deserialize")]
    dob: Option<NaiveDate>,
    #[validate(length(max = 15))]
    phone_number: Option<String>,
    address: Option<String>,
    #[validate(length(max = 255))]
    profile_picture: Option<String>,
    #[serde(default)]
    is_doctor: bool,
    #[serde(default)]
    is_patient: bool,
    #[serde(default)]
    is_active: bool,
}

#[derive(Deserialize, Validate, Default)]
pub struct UserUpdate {
    #[validate(length(min = 1, max = 150), custom = "validate_username")]
    username: Option<String>,
    #[validate(custom = "validate_blank_or_email")]
    email: Option<String>,
    password: Option<String>,
    #[validate(length(max = 150))]
    first_name: Option<String>,
    #[validate(length(max = 150))]
    last_name: Option<String>,
    #[serde(default, deserialize_with = "dmy_date::deserialize")]
    dob: Option<NaiveDate>,
    #[validate(length(max = 15))]
    #[serde(default, deserialize_with = "double_option")]
    phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    address: Option<Option<String>>,
    #[validate(length(max = 255))]
    #[serde(default, deserialize_with = "double_option")]
    profile_picture: Option<Option<String>>,
    is_doctor: Option<bool>,
    is_patient: Option<bool>,
    is_staff: Option<bool>,
    is_active: Option<bool>,
}

impl UserUpdate {
    fn touches_privileges(&self) -> bool {
        self.is_staff.is_some() || self.is_active.is_some()
    }
}

#[derive(Deserialize)]
pub struct UserListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

/// Runs derive validation and the password rules, merging both into one
/// field map.
fn collect_errors<T: Validate>(payload: &T, password: Option<(&str, &str)>) -> FieldErrors {
    let mut fields = match payload.validate() {
        Ok(()) => FieldErrors::new(),
        Err(err) => match AppError::from(err) {
            AppError::Validation(fields) => fields,
            _ => FieldErrors::new(),
        },
    };
    if let Some((password, username)) = password {
        let problems = password::password_problems(password, username);
        if !problems.is_empty() {
            fields.entry("password".to_string()).or_default().extend(problems);
        }
    }
    fields
}

pub(crate) async fn fetch_user(pool: &PgPool, user_id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".to_string()))
}

async fn username_taken(pool: &PgPool, username: &str, except: Option<Uuid>) -> AppResult<bool> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2))",
    )
    .bind(username)
    .bind(except)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

pub async fn register(
    pool: web::Data<PgPool>,
    req: web::Json<RegisterRequest>,
) -> AppResult<HttpResponse> {
    let req = req.into_inner();
    let fields = collect_errors(&req, Some((req.password.as_str(), req.username.as_str())));
    if !fields.is_empty() {
        return Err(AppError::Validation(fields));
    }
    if username_taken(&pool, &req.username, None).await? {
        return Err(AppError::field("username", DUPLICATE_USERNAME));
    }

    let password_hash = password::hash_password(&req.password)?;
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO users (id, username, email, password, first_name, last_name, dob, phone_number, \
         address, profile_picture, is_doctor, is_patient, is_staff, is_active, date_joined, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE, $13, $14, $14)",
    )
    .bind(user_id)
    .bind(&req.username)
    .bind(req.email.as_deref().unwrap_or(""))
    .bind(&password_hash)
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(req.dob)
    .bind(&req.phone_number)
    .bind(&req.address)
    .bind(&req.profile_picture)
    .bind(req.is_doctor)
    .bind(req.is_patient)
    .bind(req.is_active)
    .bind(now)
    .execute(&**pool)
    .await?;

    log::info!("Registered user '{}'", req.username);

    let user = fetch_user(&pool, user_id).await?;
    Ok(HttpResponse::Created().json(user))
}

pub async fn get_profile(user: AuthUser, pool: web::Data<PgPool>) -> AppResult<HttpResponse> {
    let profile = sqlx::query_as::<_, ProfileResponse>(
        "SELECT username, email, profile_picture FROM users WHERE id = $1",
    )
    .bind(user.id)
    .fetch_one(&**pool)
    .await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn list_users(
    _user: AuthUser,
    pool: web::Data<PgPool>,
    query: web::Query<UserListQuery>,
) -> AppResult<HttpResponse> {
    let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(format!(
        "SELECT {} FROM users ORDER BY username",
        USER_COLUMNS
    ));
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit.max(0));
    }
    if let Some(offset) = query.offset {
        builder.push(" OFFSET ");
        builder.push_bind(offset.max(0));
    }

    let users = builder
        .build_query_as::<User>()
        .fetch_all(&**pool)
        .await?;

    Ok(HttpResponse::Ok().json(users))
}

pub async fn get_user(
    _user: AuthUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let user = fetch_user(&pool, user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn apply_update(
    pool: &PgPool,
    caller: &AuthUser,
    target_id: Uuid,
    updates: UserUpdate,
) -> AppResult<User> {
    if target_id != caller.id {
        caller.require_staff()?;
    }
    if updates.touches_privileges() && !caller.is_staff {
        return Err(AppError::Forbidden(
            "Only staff can change staff or active flags.".to_string(),
        ));
    }

    let existing = fetch_user(pool, target_id).await?;
    let username = updates.username.as_deref().unwrap_or(&existing.username);
    let fields = collect_errors(&updates, updates.password.as_deref().map(|p| (p, username)));
    if !fields.is_empty() {
        return Err(AppError::Validation(fields));
    }
    if let Some(new_username) = &updates.username {
        if username_taken(pool, new_username, Some(target_id)).await? {
            return Err(AppError::field("username", DUPLICATE_USERNAME));
        }
    }

    let password_hash = match &updates.password {
        Some(password) => Some(password::hash_password(password)?),
        None => None,
    };

    let mut query = sqlx::QueryBuilder::<sqlx::Postgres>::new("UPDATE users SET ");
    let mut separated = query.separated(", ");

    if let Some(username) = updates.username {
        separated.push("username = ");
        separated.push_bind_unseparated(username);
    }
    if let Some(email) = updates.email {
        separated.push("email = ");
        separated.push_bind_unseparated(email);
    }
    if let Some(password_hash) = password_hash {
        separated.push("password = ");
        separated.push_bind_unseparated(password_hash);
    }
    if let Some(first_name) = updates.first_name {
        separated.push("first_name = ");
        separated.push_bind_unseparated(first_name);
    }
    if let Some(last_name) = updates.last_name {
        separated.push("last_name = ");
        separated.push_bind_unseparated(last_name);
    }
    if let Some(dob) = updates.dob {
        separated.push("dob = ");
        separated.push_bind_unseparated(dob);
    }
    if let Some(phone_number) = updates.phone_number {
        separated.push("phone_number = ");
        separated.push_bind_unseparated(phone_number);
    }
    if let Some(address) = updates.address {
        separated.push("address = ");
        separated.push_bind_unseparated(address);
    }
    if let Some(profile_picture) = updates.profile_picture {
        separated.push("profile_picture = ");
        separated.push_bind_unseparated(profile_picture);
    }
    if let Some(is_doctor) = updates.is_doctor {
        separated.push("is_doctor = ");
        separated.push_bind_unseparated(is_doctor);
    }
    if let Some(is_patient) = updates.is_patient {
        separated.push("is_patient = ");
        separated.push_bind_unseparated(is_patient);
    }
    if let Some(is_staff) = updates.is_staff {
        separated.push("is_staff = ");
        separated.push_bind_unseparated(is_staff);
    }
    if let Some(is_active) = updates.is_active {
        separated.push("is_active = ");
        separated.push_bind_unseparated(is_active);
    }
    separated.push("updated_at = ");
    separated.push_bind_unseparated(Utc::now());
    separated.push("updated_by = ");
    separated.push_bind_unseparated(caller.id);
    query.push(" WHERE id = ");
    query.push_bind(target_id);

    query.build().execute(pool).await?;

    log::info!("User {} updated by {}", target_id, caller.username);
    fetch_user(pool, target_id).await
}

/// Staff may update anyone; other users only themselves.
pub async fn update_user(
    user: AuthUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
    updates: web::Json<UserUpdate>,
) -> AppResult<HttpResponse> {
    let updated = apply_update(&pool, &user, user_id.into_inner(), updates.into_inner()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn update_self(
    user: AuthUser,
    pool: web::Data<PgPool>,
    updates: web::Json<UserUpdate>,
) -> AppResult<HttpResponse> {
    let updated = apply_update(&pool, &user, user.id, updates.into_inner()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

async fn remove_user(pool: &PgPool, caller: &AuthUser, target_id: Uuid) -> AppResult<HttpResponse> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(target_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found.".to_string()));
    }

    log::info!("User {} deleted by {}", target_id, caller.username);
    Ok(HttpResponse::NoContent().finish())
}

/// Hard delete. Staff may remove anyone; other users only themselves.
pub async fn delete_user(
    user: AuthUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let target_id = user_id.into_inner();
    if target_id != user.id {
        user.require_staff()?;
    }
    remove_user(&pool, &user, target_id).await
}

pub async fn delete_self(user: AuthUser, pool: web::Data<PgPool>) -> AppResult<HttpResponse> {
    remove_user(&pool, &user, user.id).await
}

/// Direct permissions plus those inherited through roles.
pub async fn user_permissions(
    _staff: StaffUser,
    pool: web::Data<PgPool>,
    user_id: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let user = fetch_user(&pool, user_id.into_inner()).await?;

    let direct = sqlx::query_as::<_, Permission>(
        "SELECT p.id, p.codename, p.name FROM permissions p \
         JOIN user_permissions up ON up.permission_id = p.id \
         WHERE up.user_id = $1 ORDER BY p.codename",
    )
    .bind(user.id)
    .fetch_all(&**pool)
    .await?;

    let effective = sqlx::query_as::<_, Permission>(
        "SELECT p.id, p.codename, p.name FROM permissions p WHERE p.id IN ( \
             SELECT permission_id FROM user_permissions WHERE user_id = $1 \
             UNION \
             SELECT rp.permission_id FROM role_permissions rp \
             JOIN user_roles ur ON ur.role_id = rp.role_id WHERE ur.user_id = $1 \
         ) ORDER BY p.codename",
    )
    .bind(user.id)
    .fetch_all(&**pool)
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "user": user.username,
        "direct": direct,
        "effective": effective,
    })))
}
