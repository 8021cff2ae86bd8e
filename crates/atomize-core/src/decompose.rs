//! Decomposition request orchestration.
//!
//! Scrubs and encrypts the goal, creates the task row, then hands off to
//! the extractor. Failures before the stream starts are ordinary request
//! errors; everything after surfaces as a terminal event on the stream.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use atomize_db::models::Task;
use atomize_db::queries::tasks;

use crate::crypto::FieldCipher;
use crate::extractor::{self, EventStream, SessionContext};
use crate::generator::Generator;
use crate::scrub::PiiScrubber;

/// Default bound on one generation session.
pub const DEFAULT_MAX_STREAM_DURATION: Duration = Duration::from_secs(300);

/// Entry point for decomposition requests: owns the injected collaborators
/// and wires them into one session per request.
pub struct Decomposer {
    pool: PgPool,
    cipher: Arc<FieldCipher>,
    scrubber: Arc<dyn PiiScrubber>,
    generator: Arc<dyn Generator>,
    max_stream_duration: Duration,
}

impl Decomposer {
    pub fn new(
        pool: PgPool,
        cipher: Arc<FieldCipher>,
        scrubber: Arc<dyn PiiScrubber>,
        generator: Arc<dyn Generator>,
        max_stream_duration: Duration,
    ) -> Self {
        Self {
            pool,
            cipher,
            scrubber,
            generator,
            max_stream_duration,
        }
    }

    /// Begin decomposing `instruction` for `user_id`.
    ///
    /// The goal is scrubbed once at intake; the stored ciphertext, the
    /// generation prompt, and every stream event carry only the scrubbed
    /// text. The task row is inserted before any generation happens, so a
    /// failure here produces no half-open stream. The returned stream runs
    /// the session lazily; dropping it cancels the session.
    pub async fn begin(
        &self,
        user_id: Option<i64>,
        instruction: &str,
    ) -> Result<(Task, EventStream)> {
        let safe_goal = self.scrubber.scrub(instruction);
        let sealed_goal = self
            .cipher
            .encrypt(&safe_goal)
            .context("failed to encrypt goal")?;

        let task = tasks::insert_task(&self.pool, user_id, &sealed_goal).await?;
        info!(task_id = task.id, user_id, "decomposition session starting");

        let session = SessionContext {
            task_id: task.id,
            user_id,
            original_goal: safe_goal,
        };
        let events = extractor::run_session(
            self.pool.clone(),
            Arc::clone(&self.cipher),
            Arc::clone(&self.generator),
            session,
            self.max_stream_duration,
        );

        Ok((task, events))
    }
}
