/// User repository - database operations for accounts
use crate::models::User;
use sqlx::PgPool;
use uuid::Uuid;

/// Fetch-or-create a user by email. Login is an upsert in this system:
/// token issuance itself is delegated to the auth module.
pub async fn upsert_by_email(
    pool: &PgPool,
    email: &str,
    name: Option<&str>,
) -> Result<User, sqlx::Error> {
    let user_id = Uuid::new_v4().to_string();
    sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, name, created_at) \
         VALUES ($1, $2, $3, NOW()) \
         ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
         RETURNING id, email, name, created_at",
    )
    .bind(user_id)
    .bind(email)
    .bind(name)
    .fetch_one(pool)
    .await
}

pub async fn get_user(pool: &PgPool, user_id: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT id, email, name, created_at FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}
