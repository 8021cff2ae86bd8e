//! Integration tests for completion toggles and gamification counters.
//!
//! Completion never touches plaintext, so steps are seeded with opaque
//! bytes in place of real ciphertext.

use chrono::{Days, Utc};
use sqlx::PgPool;

use atomize_core::completion::set_step_status;
use atomize_db::models::{MicroWin, Task};
use atomize_db::queries::{micro_wins, tasks, users};
use atomize_test_utils::{create_test_db, drop_test_db};

async fn seed_task_with_steps(
    pool: &PgPool,
    user_id: Option<i64>,
    step_count: i32,
) -> (Task, Vec<MicroWin>) {
    let task = tasks::insert_task(pool, user_id, b"sealed goal")
        .await
        .expect("task insert should succeed");
    let mut steps = Vec::new();
    for order in 1..=step_count {
        let step = micro_wins::insert_micro_win(pool, task.id, b"sealed action", order)
            .await
            .expect("step insert should succeed");
        steps.push(step);
    }
    (task, steps)
}

/// Backdate the user's last completion, as if the previous win happened
/// `days_ago` days earlier.
async fn backdate_last_completion(pool: &PgPool, user_id: i64, streak: i32, days_ago: u64) {
    let date = Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(days_ago))
        .expect("date should be representable");
    sqlx::query("UPDATE users SET streak_count = $1, last_completion_date = $2 WHERE id = $3")
        .bind(streak)
        .bind(date)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("backdate should succeed");
}

#[tokio::test]
async fn completing_steps_advances_counters_and_finishes_the_task() {
    let (pool, db_name) = create_test_db().await;

    let user = users::insert_user(&pool, "winner@example.com").await.unwrap();
    let (task, steps) = seed_task_with_steps(&pool, Some(user.id), 2).await;

    let update = set_step_status(&pool, steps[0].id, true)
        .await
        .unwrap()
        .expect("step should exist");
    assert_eq!(update.id, steps[0].id);
    assert!(update.is_completed);
    assert!(!update.task_completed);
    assert_eq!(update.streak_count, 1);
    assert_eq!(update.total_completed, 1);

    // Second win on the same day: total moves, the streak does not.
    let update = set_step_status(&pool, steps[1].id, true)
        .await
        .unwrap()
        .expect("step should exist");
    assert!(update.task_completed);
    assert_eq!(update.streak_count, 1);
    assert_eq!(update.total_completed, 2);

    let stored = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert!(stored.is_completed);
    let stored_user = users::get_user(&pool, user.id).await.unwrap().unwrap();
    assert_eq!(stored_user.streak_count, 1);
    assert_eq!(stored_user.total_completed, 2);
    assert_eq!(stored_user.last_completion_date, Some(Utc::now().date_naive()));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn win_on_the_day_after_extends_the_streak() {
    let (pool, db_name) = create_test_db().await;

    let user = users::insert_user(&pool, "streaker@example.com").await.unwrap();
    let (_, steps) = seed_task_with_steps(&pool, Some(user.id), 1).await;
    backdate_last_completion(&pool, user.id, 3, 1).await;

    let update = set_step_status(&pool, steps[0].id, true)
        .await
        .unwrap()
        .expect("step should exist");
    assert_eq!(update.streak_count, 4);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn win_after_a_gap_resets_the_streak() {
    let (pool, db_name) = create_test_db().await;

    let user = users::insert_user(&pool, "lapsed@example.com").await.unwrap();
    let (_, steps) = seed_task_with_steps(&pool, Some(user.id), 1).await;
    backdate_last_completion(&pool, user.id, 9, 5).await;

    let update = set_step_status(&pool, steps[0].id, true)
        .await
        .unwrap()
        .expect("step should exist");
    assert_eq!(update.streak_count, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn recompleting_a_completed_step_changes_nothing() {
    let (pool, db_name) = create_test_db().await;

    let user = users::insert_user(&pool, "repeat@example.com").await.unwrap();
    let (_, steps) = seed_task_with_steps(&pool, Some(user.id), 1).await;

    set_step_status(&pool, steps[0].id, true).await.unwrap();
    let update = set_step_status(&pool, steps[0].id, true)
        .await
        .unwrap()
        .expect("step should exist");

    assert!(update.is_completed);
    assert_eq!(update.streak_count, 1);
    assert_eq!(update.total_completed, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn uncompleting_reopens_the_task_but_never_rewinds_counters() {
    let (pool, db_name) = create_test_db().await;

    let user = users::insert_user(&pool, "undo@example.com").await.unwrap();
    let (task, steps) = seed_task_with_steps(&pool, Some(user.id), 1).await;

    let update = set_step_status(&pool, steps[0].id, true)
        .await
        .unwrap()
        .unwrap();
    assert!(update.task_completed);

    let update = set_step_status(&pool, steps[0].id, false)
        .await
        .unwrap()
        .expect("step should exist");
    assert!(!update.is_completed);
    assert!(!update.task_completed);
    assert_eq!(update.streak_count, 1);
    assert_eq!(update.total_completed, 1);

    let stored = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert!(!stored.is_completed);

    // Completing it again is a fresh false-to-true transition.
    let update = set_step_status(&pool, steps[0].id, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.total_completed, 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unknown_step_returns_none() {
    let (pool, db_name) = create_test_db().await;

    let update = set_step_status(&pool, 987_654, true).await.unwrap();
    assert!(update.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn task_without_a_user_reports_zeroed_counters() {
    let (pool, db_name) = create_test_db().await;

    let (task, steps) = seed_task_with_steps(&pool, None, 1).await;

    let update = set_step_status(&pool, steps[0].id, true)
        .await
        .unwrap()
        .expect("step should exist");
    assert!(update.is_completed);
    assert!(update.task_completed);
    assert_eq!(update.streak_count, 0);
    assert_eq!(update.total_completed, 0);

    let stored = tasks::get_task(&pool, task.id).await.unwrap().unwrap();
    assert!(stored.is_completed);

    pool.close().await;
    drop_test_db(&db_name).await;
}
