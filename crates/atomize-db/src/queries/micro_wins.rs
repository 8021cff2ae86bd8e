//! Query functions for the `micro_wins` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::MicroWin;

/// Insert one micro-win at the given step position.
///
/// `step_order` is 1-based and unique per task; the database rejects
/// duplicates via the `(task_id, step_order)` constraint.
pub async fn insert_micro_win(
    pool: &PgPool,
    task_id: i64,
    encrypted_action: &[u8],
    step_order: i32,
) -> Result<MicroWin> {
    sqlx::query_as::<_, MicroWin>(
        "INSERT INTO micro_wins (task_id, encrypted_action, step_order) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(task_id)
    .bind(encrypted_action)
    .bind(step_order)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert micro-win {step_order} for task {task_id}"))
}

/// Fetch one micro-win by id.
pub async fn get_micro_win(pool: &PgPool, micro_win_id: i64) -> Result<Option<MicroWin>> {
    sqlx::query_as::<_, MicroWin>("SELECT * FROM micro_wins WHERE id = $1")
        .bind(micro_win_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to fetch micro-win {micro_win_id}"))
}

/// List a task's micro-wins in step order.
pub async fn list_micro_wins_for_task(pool: &PgPool, task_id: i64) -> Result<Vec<MicroWin>> {
    sqlx::query_as::<_, MicroWin>(
        "SELECT * FROM micro_wins WHERE task_id = $1 ORDER BY step_order",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list micro-wins for task {task_id}"))
}
