//! Micro-win completion toggles and per-user gamification bookkeeping.
//!
//! A toggle is transactional: the step flips, the owning task's completion
//! flag is recomputed, and the user's counters move, all or nothing.
//! Counters only ever move forward: re-completing a step changes nothing,
//! and un-completing a step never rewinds a streak or the lifetime total.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;

use atomize_db::models::{MicroWin, User};

/// Outcome of a completion toggle, as reported to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepUpdate {
    pub id: i64,
    pub is_completed: bool,
    pub task_completed: bool,
    pub streak_count: i32,
    pub total_completed: i32,
}

/// Flip one micro-win's completion state.
///
/// Returns `None` when the step does not exist. Steps on a task without a
/// known user report zeroed gamification counters.
pub async fn set_step_status(
    pool: &PgPool,
    micro_win_id: i64,
    is_completed: bool,
) -> Result<Option<StepUpdate>> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    // 1. Lock the step row and record the transition direction.
    let Some(step) =
        sqlx::query_as::<_, MicroWin>("SELECT * FROM micro_wins WHERE id = $1 FOR UPDATE")
            .bind(micro_win_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to fetch micro-win")?
    else {
        // Transaction rolls back on drop (no commit).
        return Ok(None);
    };
    let newly_completed = is_completed && !step.is_completed;

    let step = sqlx::query_as::<_, MicroWin>(
        "UPDATE micro_wins SET is_completed = $1 WHERE id = $2 RETURNING *",
    )
    .bind(is_completed)
    .bind(micro_win_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to update micro-win")?;

    // 2. Recompute the task flag in both directions, so un-completing a
    //    step reopens a finished task.
    let (open_steps,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM micro_wins WHERE task_id = $1 AND is_completed = FALSE",
    )
    .bind(step.task_id)
    .fetch_one(&mut *tx)
    .await
    .context("failed to count open steps")?;
    let task_completed = open_steps == 0;

    let (task_user,): (Option<i64>,) =
        sqlx::query_as("UPDATE tasks SET is_completed = $1 WHERE id = $2 RETURNING user_id")
            .bind(task_completed)
            .bind(step.task_id)
            .fetch_one(&mut *tx)
            .await
            .context("failed to update task completion flag")?;

    // 3. Gamification counters move only on a false -> true transition of
    //    the step itself.
    let mut streak_count = 0;
    let mut total_completed = 0;
    if let Some(user_id) = task_user {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .context("failed to fetch user for gamification update")?;

        if let Some(user) = user {
            if newly_completed {
                let today = Utc::now().date_naive();
                let streak = next_streak(user.streak_count, user.last_completion_date, today);
                let updated = sqlx::query_as::<_, User>(
                    "UPDATE users SET streak_count = $1, last_completion_date = $2, \
                         total_completed = total_completed + 1 \
                     WHERE id = $3 \
                     RETURNING *",
                )
                .bind(streak)
                .bind(today)
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await
                .context("failed to update gamification counters")?;
                streak_count = updated.streak_count;
                total_completed = updated.total_completed;
            } else {
                streak_count = user.streak_count;
                total_completed = user.total_completed;
            }
        }
    }

    tx.commit().await.context("failed to commit transaction")?;

    Ok(Some(StepUpdate {
        id: step.id,
        is_completed: step.is_completed,
        task_completed,
        streak_count,
        total_completed,
    }))
}

/// Compute the streak resulting from a completion on `today`.
///
/// Streak days are UTC calendar days: a second completion on the same day
/// keeps the streak, a completion the day after the last one extends it,
/// and anything else starts over at 1.
fn next_streak(current: i32, last_completion: Option<NaiveDate>, today: NaiveDate) -> i32 {
    match last_completion {
        Some(last) => match (today - last).num_days() {
            0 => current,
            1 => current + 1,
            _ => 1,
        },
        None => 1,
    }
}
