//! One-shot decomposition from the command line.

use anyhow::Result;
use futures::StreamExt;

use atomize_core::decompose::Decomposer;

/// Run a single decomposition session and print each stream event as a JSON
/// line, exactly as the SSE endpoint would relay it. The task and its steps
/// are persisted as a side effect, same as a request through the server.
pub async fn run_decompose(
    decomposer: &Decomposer,
    goal: &str,
    user_id: Option<i64>,
) -> Result<()> {
    let (task, mut events) = decomposer.begin(user_id, goal).await?;
    tracing::info!(task_id = task.id, "decomposition session started");

    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    tracing::info!(task_id = task.id, "decomposition session finished");
    Ok(())
}
