use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How a user account authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Email,
    Google,
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Email => "email",
            Self::Google => "google",
        };
        f.write_str(s)
    }
}

impl FromStr for AuthProvider {
    type Err = AuthProviderParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "google" => Ok(Self::Google),
            other => Err(AuthProviderParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`AuthProvider`] string.
#[derive(Debug, Clone)]
pub struct AuthProviderParseError(pub String);

impl fmt::Display for AuthProviderParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid auth provider: {:?}", self.0)
    }
}

impl std::error::Error for AuthProviderParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A user account with its encrypted profile and gamification counters.
///
/// `encrypted_preferences` and `encrypted_struggle_areas` hold nonce-prefixed
/// AES-GCM ciphertext; decryption happens in the service layer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub hashed_password: Option<String>,
    pub auth_provider: AuthProvider,
    pub provider_id: Option<String>,
    pub encrypted_preferences: Option<Vec<u8>>,
    pub encrypted_struggle_areas: Option<Vec<u8>>,
    pub granularity_level: i32,
    pub streak_count: i32,
    pub last_completion_date: Option<NaiveDate>,
    pub total_completed: i32,
    pub created_at: DateTime<Utc>,
}

/// A decomposed goal. The goal text is stored encrypted; `title` is the
/// clear-text sidebar label produced during generation (absent until the
/// generator emits one).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub user_id: Option<i64>,
    pub title: Option<String>,
    pub encrypted_goal: Vec<u8>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

/// One step of a decomposed task. `step_order` starts at 1 and is unique
/// per task; the action text is stored encrypted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MicroWin {
    pub id: i64,
    pub task_id: i64,
    pub encrypted_action: Vec<u8>,
    pub is_completed: bool,
    pub step_order: i32,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
