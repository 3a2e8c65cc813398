//! Store-backed test fixtures. Each fixture gets its own Postgres schema built
//! from `schema.sql`, so tests can run in parallel against one database.
//! Set `TEST_DATABASE_URL` to enable them; without it they return early.

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db;
use crate::utils::{jwt, password};

pub struct ScratchDb {
    pub pool: PgPool,
    admin: PgPool,
    schema: String,
}

impl ScratchDb {
    pub async fn open() -> Option<ScratchDb> {
        dotenv::dotenv().ok();
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set; skipping store-backed test");
                return None;
            }
        };

        let schema = format!("test_{}", Uuid::new_v4().simple());
        let admin = PgPoolOptions::new().max_connections(1).connect(&url).await.unwrap();
        admin.execute(format!("CREATE SCHEMA {}", schema).as_str()).await.unwrap();

        let search_path = format!("SET search_path TO {}", schema);
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move {
                    conn.execute(search_path.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .unwrap();

        pool.execute(include_str!("../schema.sql")).await.unwrap();
        db::seed_permissions(&pool).await.unwrap();

        Some(ScratchDb { pool, admin, schema })
    }

    pub async fn insert_user(&self, username: &str, password: &str, is_staff: bool) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO users (id, username, password, is_staff, is_active, date_joined, updated_at) \
             VALUES ($1, $2, $3, $4, TRUE, $5, $5)",
        )
        .bind(id)
        .bind(username)
        .bind(password::hash_password(password).unwrap())
        .bind(is_staff)
        .bind(now)
        .execute(&self.pool)
        .await
        .unwrap();
        id
    }

    pub async fn close(self) {
        self.pool.close().await;
        self.admin
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await
            .unwrap();
    }
}

/// `Authorization` header value for `user_id`, signed with the test secret.
pub fn bearer(user_id: Uuid) -> String {
    let config = AppConfig::for_tests();
    let token = jwt::generate_token(user_id, &config.jwt_secret, config.jwt_ttl_hours).unwrap();
    format!("Bearer {}", token)
}
