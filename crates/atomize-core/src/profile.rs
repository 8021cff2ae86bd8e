//! Per-user profile context for prompt shaping.

use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, warn};

use atomize_db::queries::users;

use crate::crypto::FieldCipher;

/// Decrypted profile context embedded in the generation prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    /// Free-text working-style preferences; empty when unset.
    pub preferences: String,
    /// Free-text description of what the user finds hard; empty when unset.
    pub struggle_areas: String,
    /// Desired step count, 1..=5.
    pub granularity_level: i32,
}

impl Default for UserProfile {
    /// Middle-ground defaults used when no profile is available.
    fn default() -> Self {
        Self {
            preferences: String::new(),
            struggle_areas: String::new(),
            granularity_level: 3,
        }
    }
}

/// Resolve the profile for `user_id`.
///
/// An absent `user_id`, or an id with no user row, resolves to
/// [`UserProfile::default`]; decomposition stays available to users who
/// have not filled in a profile. A profile field that fails to decrypt
/// degrades to its default rather than failing the caller.
pub async fn resolve(
    pool: &PgPool,
    cipher: &FieldCipher,
    user_id: Option<i64>,
) -> Result<UserProfile> {
    let Some(user_id) = user_id else {
        return Ok(UserProfile::default());
    };

    let Some(user) = users::get_user(pool, user_id).await? else {
        debug!(user_id, "no profile row, using defaults");
        return Ok(UserProfile::default());
    };

    Ok(UserProfile {
        preferences: decrypt_or_empty(
            cipher,
            user.encrypted_preferences.as_deref(),
            "preferences",
            user_id,
        ),
        struggle_areas: decrypt_or_empty(
            cipher,
            user.encrypted_struggle_areas.as_deref(),
            "struggle_areas",
            user_id,
        ),
        granularity_level: user.granularity_level,
    })
}

fn decrypt_or_empty(
    cipher: &FieldCipher,
    stored: Option<&[u8]>,
    field: &str,
    user_id: i64,
) -> String {
    let Some(stored) = stored else {
        return String::new();
    };
    match cipher.decrypt(stored) {
        Ok(text) => text,
        Err(error) => {
            warn!(user_id, field, %error, "skipping unreadable profile field");
            String::new()
        }
    }
}
