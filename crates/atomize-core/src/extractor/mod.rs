//! The streaming record extractor.
//!
//! Consumes the fragment stream produced by the generation transport,
//! reassembles newline-delimited JSON records, and dispatches each one in
//! arrival order: persist first, then notify. The emitted [`StreamEvent`]s
//! are the wire contract relayed verbatim to SSE clients.
//!
//! ```text
//! Arc<dyn Generator> --fragments--> LineBuffer --lines--> Record::decode
//!                                                              |
//!                         title  -> UPDATE tasks    -> yield SidebarTitle
//!                         action -> INSERT micro_win -> yield MicroWin
//!                         end    ->                    yield Completed
//!                         junk   -> count, skip
//! ```
//!
//! The consumer dropping the stream cancels the session: dispatch happens
//! between yields, so nothing is persisted after the drop point.

pub mod buffer;
pub mod record;

pub use buffer::LineBuffer;
pub use record::Record;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Serialize;
use sqlx::PgPool;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use atomize_db::queries::{micro_wins, tasks};

use crate::crypto::FieldCipher;
use crate::generator::Generator;
use crate::profile;
use crate::prompt;

/// One step as carried on a [`StreamEvent::MicroWin`] event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPayload {
    /// 1-based position of the step within its task.
    pub step_id: i64,
    pub action: String,
    pub is_completed: bool,
}

/// Events emitted during one decomposition session.
///
/// Untagged, so each variant serializes as its bare fields:
/// `{"latency_ms": 240}`, `{"sidebar_title": "..."}`, and so on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    /// Time from session start to the first non-empty fragment.
    FirstToken { latency_ms: u64 },
    /// The task title became available (already persisted).
    SidebarTitle { sidebar_title: String },
    /// One micro-win was persisted. `id` is the task id.
    MicroWin {
        id: i64,
        original_goal: String,
        current_step: StepPayload,
    },
    /// Generation finished, via an end record or upstream exhaustion.
    /// Terminal: nothing follows.
    Completed { total_latency_ms: u64 },
    /// The session failed. Terminal: nothing follows.
    Error { error: String },
}

/// The event stream returned by [`run_session`].
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Identifiers binding one extraction run to its task row.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub task_id: i64,
    pub user_id: Option<i64>,
    /// Scrubbed goal text, echoed on every micro-win event.
    pub original_goal: String,
}

/// Per-session diagnostic counters, logged when the session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SessionStats {
    titles: u32,
    actions: u32,
    skipped_lines: u32,
}

/// Run one decomposition session against an already-created task row.
///
/// The returned stream resolves the user's profile, issues the generation
/// request, and dispatches records as they complete. All failures after
/// this function returns surface as a single terminal
/// [`StreamEvent::Error`]; `max_duration` bounds the whole session,
/// measured from the first poll.
pub fn run_session(
    pool: PgPool,
    cipher: Arc<FieldCipher>,
    generator: Arc<dyn Generator>,
    session: SessionContext,
    max_duration: Duration,
) -> EventStream {
    let events = async_stream::stream! {
        let started = Instant::now();
        let deadline = started + max_duration;

        // Profile and prompt failures are stream errors, not request
        // errors: by the time the session runs, the response is open.
        let user_profile = match profile::resolve(&pool, &cipher, session.user_id).await {
            Ok(user_profile) => user_profile,
            Err(error) => {
                warn!(task_id = session.task_id, %error, "profile resolution failed");
                yield StreamEvent::Error {
                    error: format!("profile resolution failed: {error:#}"),
                };
                return;
            }
        };

        let request = prompt::build(&session.original_goal, &user_profile);
        let mut fragments = match generator.stream(&request).await {
            Ok(fragments) => fragments,
            Err(error) => {
                warn!(task_id = session.task_id, %error, "generation request failed");
                yield StreamEvent::Error { error: error.to_string() };
                return;
            }
        };

        let mut buffer = LineBuffer::new();
        let mut stats = SessionStats::default();
        let mut next_step: i32 = 1;
        let mut saw_first_token = false;

        loop {
            let fragment = match timeout_at(deadline, fragments.next()).await {
                Err(_) => {
                    warn!(
                        task_id = session.task_id,
                        elapsed_ms = elapsed_ms(started),
                        "session deadline exceeded"
                    );
                    yield StreamEvent::Error {
                        error: format!(
                            "generation exceeded the {}s session deadline",
                            max_duration.as_secs()
                        ),
                    };
                    return;
                }
                Ok(None) => break,
                Ok(Some(Err(error))) => {
                    warn!(task_id = session.task_id, %error, "upstream stream failed");
                    yield StreamEvent::Error { error: error.to_string() };
                    return;
                }
                Ok(Some(Ok(fragment))) => fragment,
            };

            if !saw_first_token && !fragment.is_empty() {
                saw_first_token = true;
                yield StreamEvent::FirstToken { latency_ms: elapsed_ms(started) };
            }

            buffer.push(&fragment);

            while let Some(line) = buffer.next_line() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match Record::decode(line) {
                    Record::Title(title) => {
                        if let Err(error) =
                            tasks::set_task_title(&pool, session.task_id, &title).await
                        {
                            warn!(task_id = session.task_id, %error, "failed to persist title");
                            yield StreamEvent::Error {
                                error: format!("failed to persist title: {error:#}"),
                            };
                            return;
                        }
                        stats.titles += 1;
                        yield StreamEvent::SidebarTitle { sidebar_title: title };
                    }
                    Record::Action(action) => {
                        let sealed = match cipher.encrypt(&action) {
                            Ok(sealed) => sealed,
                            Err(error) => {
                                warn!(task_id = session.task_id, %error, "failed to encrypt action");
                                yield StreamEvent::Error {
                                    error: "failed to encrypt step action".to_owned(),
                                };
                                return;
                            }
                        };
                        if let Err(error) = micro_wins::insert_micro_win(
                            &pool,
                            session.task_id,
                            &sealed,
                            next_step,
                        )
                        .await
                        {
                            warn!(
                                task_id = session.task_id,
                                step_order = next_step,
                                %error,
                                "failed to persist micro-win"
                            );
                            yield StreamEvent::Error {
                                error: format!("failed to persist step {next_step}: {error:#}"),
                            };
                            return;
                        }
                        stats.actions += 1;
                        let current_step = StepPayload {
                            step_id: i64::from(next_step),
                            action,
                            is_completed: false,
                        };
                        next_step += 1;
                        yield StreamEvent::MicroWin {
                            id: session.task_id,
                            original_goal: session.original_goal.clone(),
                            current_step,
                        };
                    }
                    Record::End => {
                        info!(
                            task_id = session.task_id,
                            titles = stats.titles,
                            actions = stats.actions,
                            skipped = stats.skipped_lines,
                            "generation signalled end"
                        );
                        yield StreamEvent::Completed { total_latency_ms: elapsed_ms(started) };
                        return;
                    }
                    Record::Unrecognized => {
                        stats.skipped_lines += 1;
                        debug!(
                            task_id = session.task_id,
                            line,
                            "skipping unrecognized generation line"
                        );
                    }
                }
            }
        }

        // Upstream exhausted without an end record. Whatever is left in the
        // buffer never got its newline and is dropped, not parsed.
        if !buffer.pending().is_empty() {
            debug!(
                task_id = session.task_id,
                pending_bytes = buffer.pending().len(),
                "dropping unterminated trailing text"
            );
        }
        info!(
            task_id = session.task_id,
            titles = stats.titles,
            actions = stats.actions,
            skipped = stats.skipped_lines,
            "stream exhausted without end record"
        );
        yield StreamEvent::Completed { total_latency_ms: elapsed_ms(started) };
    };

    Box::pin(events)
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Wire-shape tests: these JSON forms are the SSE payload contract.

    #[test]
    fn first_token_event_shape() {
        let event = StreamEvent::FirstToken { latency_ms: 240 };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"latency_ms": 240})
        );
    }

    #[test]
    fn sidebar_title_event_shape() {
        let event = StreamEvent::SidebarTitle {
            sidebar_title: "Clean Desk".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"sidebar_title": "Clean Desk"})
        );
    }

    #[test]
    fn micro_win_event_shape() {
        let event = StreamEvent::MicroWin {
            id: 17,
            original_goal: "organize my closet".to_owned(),
            current_step: StepPayload {
                step_id: 2,
                action: "Take out one shelf".to_owned(),
                is_completed: false,
            },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "id": 17,
                "original_goal": "organize my closet",
                "current_step": {
                    "step_id": 2,
                    "action": "Take out one shelf",
                    "is_completed": false
                }
            })
        );
    }

    #[test]
    fn completed_event_shape() {
        let event = StreamEvent::Completed {
            total_latency_ms: 1870,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"total_latency_ms": 1870})
        );
    }

    #[test]
    fn error_event_shape() {
        let event = StreamEvent::Error {
            error: "upstream reset".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"error": "upstream reset"})
        );
    }
}
