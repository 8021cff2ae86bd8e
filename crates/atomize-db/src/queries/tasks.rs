//! Query functions for the `tasks` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::Task;

/// Insert a new task with its encrypted goal. The clear-text title arrives
/// later, once the generator produces one.
pub async fn insert_task(
    pool: &PgPool,
    user_id: Option<i64>,
    encrypted_goal: &[u8],
) -> Result<Task> {
    sqlx::query_as::<_, Task>(
        "INSERT INTO tasks (user_id, encrypted_goal) VALUES ($1, $2) RETURNING *",
    )
    .bind(user_id)
    .bind(encrypted_goal)
    .fetch_one(pool)
    .await
    .context("failed to insert task")
}

/// Fetch a task by id.
pub async fn get_task(pool: &PgPool, task_id: i64) -> Result<Option<Task>> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch task {task_id}"))
}

/// List a user's tasks, newest first.
pub async fn list_tasks_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<Task>> {
    sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list tasks for user {user_id}"))
}

/// Set the clear-text sidebar title.
pub async fn set_task_title(pool: &PgPool, task_id: i64, title: &str) -> Result<()> {
    let result = sqlx::query("UPDATE tasks SET title = $1 WHERE id = $2")
        .bind(title)
        .bind(task_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to set title for task {task_id}"))?;

    if result.rows_affected() == 0 {
        anyhow::bail!("task {task_id} not found");
    }
    Ok(())
}

/// Delete a task. Micro-wins cascade at the database level. Returns whether
/// a row was actually deleted.
pub async fn delete_task(pool: &PgPool, task_id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(task_id)
        .execute(pool)
        .await
        .with_context(|| format!("failed to delete task {task_id}"))?;

    Ok(result.rows_affected() > 0)
}
