use serde::Serialize;
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

/// Everything but the password hash, which only login reads.
pub const USER_COLUMNS: &str = "id, username, email, first_name, last_name, dob, \
     phone_number, address, profile_picture, is_doctor, is_patient, is_staff, is_active, \
     date_joined, last_login, updated_at, created_by, updated_by";

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub dob: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub profile_picture: Option<String>,
    pub is_doctor: bool,
    pub is_patient: bool,
    pub is_staff: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
}

#[derive(Serialize, Debug, sqlx::FromRow)]
pub struct ProfileResponse {
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
}
