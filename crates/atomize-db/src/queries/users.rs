//! Query functions for the `users` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::User;

/// Insert a new user. All profile and gamification columns start at their
/// schema defaults.
pub async fn insert_user(pool: &PgPool, email: &str) -> Result<User> {
    sqlx::query_as::<_, User>("INSERT INTO users (email) VALUES ($1) RETURNING *")
        .bind(email)
        .fetch_one(pool)
        .await
        .context("failed to insert user")
}

/// Fetch a user by id.
pub async fn get_user(pool: &PgPool, user_id: i64) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch user {user_id}"))
}

/// Fetch a user by email (emails are unique).
pub async fn get_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("failed to fetch user by email")
}

/// Update the profile fields that were supplied, leaving the rest unchanged.
///
/// A `None` argument keeps the stored value; there is no way to clear a
/// field through this function. Returns `None` when the user does not exist.
pub async fn update_profile(
    pool: &PgPool,
    user_id: i64,
    encrypted_preferences: Option<&[u8]>,
    encrypted_struggle_areas: Option<&[u8]>,
    granularity_level: Option<i32>,
) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET \
             encrypted_preferences = COALESCE($2, encrypted_preferences), \
             encrypted_struggle_areas = COALESCE($3, encrypted_struggle_areas), \
             granularity_level = COALESCE($4, granularity_level) \
         WHERE id = $1 \
         RETURNING *",
    )
    .bind(user_id)
    .bind(encrypted_preferences)
    .bind(encrypted_struggle_areas)
    .bind(granularity_level)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to update profile for user {user_id}"))
}
