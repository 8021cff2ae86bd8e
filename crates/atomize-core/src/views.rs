//! Read-side task views: sidebar listing, decrypted details, deletion.

use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;
use tracing::warn;

use atomize_db::queries::{micro_wins, tasks};

use crate::crypto::FieldCipher;

/// One sidebar entry. Listing never decrypts; a task whose title has not
/// arrived yet renders with an empty string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidebarTask {
    pub id: i64,
    pub title: String,
}

/// One decrypted step inside [`TaskDetails`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub id: i64,
    pub action: String,
    pub is_completed: bool,
    pub order: i32,
}

/// Full detail view of one task, with the goal and steps decrypted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDetails {
    pub id: i64,
    pub title: String,
    pub goal: String,
    pub steps: Vec<StepView>,
}

/// List a user's tasks for the sidebar, newest first.
pub async fn list_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<SidebarTask>> {
    let rows = tasks::list_tasks_for_user(pool, user_id).await?;
    Ok(rows
        .into_iter()
        .map(|task| SidebarTask {
            id: task.id,
            title: task.title.unwrap_or_default(),
        })
        .collect())
}

/// Fetch one task with its goal and steps decrypted.
///
/// A goal that fails to decrypt renders as an empty string; a step that
/// fails to decrypt is dropped from the view. Both are logged, and neither
/// fails the request.
pub async fn task_details(
    pool: &PgPool,
    cipher: &FieldCipher,
    task_id: i64,
) -> Result<Option<TaskDetails>> {
    let Some(task) = tasks::get_task(pool, task_id).await? else {
        return Ok(None);
    };

    let goal = match cipher.decrypt(&task.encrypted_goal) {
        Ok(goal) => goal,
        Err(error) => {
            warn!(task_id, %error, "goal does not decrypt, rendering it empty");
            String::new()
        }
    };

    let rows = micro_wins::list_micro_wins_for_task(pool, task_id).await?;
    let mut steps = Vec::with_capacity(rows.len());
    for row in rows {
        match cipher.decrypt(&row.encrypted_action) {
            Ok(action) => steps.push(StepView {
                id: row.id,
                action,
                is_completed: row.is_completed,
                order: row.step_order,
            }),
            Err(error) => {
                warn!(micro_win_id = row.id, %error, "skipping unreadable step");
            }
        }
    }

    Ok(Some(TaskDetails {
        id: task.id,
        title: task.title.unwrap_or_default(),
        goal,
        steps,
    }))
}

/// Delete a task and, via cascade, its micro-wins. Returns whether the
/// task existed.
pub async fn delete_task(pool: &PgPool, task_id: i64) -> Result<bool> {
    tasks::delete_task(pool, task_id).await
}
