//! Generation prompt construction.
//!
//! The prompt pins the line protocol the extractor parses: one JSON object
//! per line, `title` first, one `action` per step, and a final
//! `{"status": "end"}`. Profile context is appended only when present so a
//! blank profile produces a minimal prompt.

use crate::profile::UserProfile;

/// Output protocol instructions shared by every decomposition request.
const OUTPUT_PROTOCOL: &str = r#"Respond with one JSON object per line and nothing else:
{"title": "<short task name, five words or fewer>"}
{"action": "<one tiny, immediately doable step>"}
{"status": "end"}
Emit the title line first, then one line per step, then the end line."#;

/// Build the decomposition prompt for a scrubbed goal.
pub fn build(goal: &str, profile: &UserProfile) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You break a goal into tiny steps so small that starting them takes no willpower.\n",
    );
    prompt.push_str(&format!(
        "Break this goal into about {} tiny steps.\n",
        profile.granularity_level
    ));

    if !profile.struggle_areas.is_empty() {
        prompt.push_str(&format!(
            "The user finds these things hard: {}.\n",
            profile.struggle_areas
        ));
    }
    if !profile.preferences.is_empty() {
        prompt.push_str(&format!(
            "The user's working preferences: {}.\n",
            profile.preferences
        ));
    }

    prompt.push_str(OUTPUT_PROTOCOL);
    prompt.push_str(&format!("\n\nGoal: {goal}"));
    prompt
}
