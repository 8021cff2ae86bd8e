use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tracing::warn;

use atomize_core::completion;
use atomize_core::crypto::FieldCipher;
use atomize_core::decompose::Decomposer;
use atomize_core::views;
use atomize_db::models::User;
use atomize_db::queries::users;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Shared state behind every handler: the pool for reads, the cipher for
/// profile fields, and the fully wired decomposition service.
#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    cipher: Arc<FieldCipher>,
    decomposer: Arc<Decomposer>,
}

impl AppState {
    pub fn new(pool: PgPool, cipher: Arc<FieldCipher>, decomposer: Arc<Decomposer>) -> Self {
        Self {
            pool,
            cipher,
            decomposer,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DecomposeRequest {
    pub instruction: String,
}

#[derive(Debug, Deserialize)]
pub struct DecomposeParams {
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StepStatusParams {
    pub is_completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub preferences: Option<String>,
    pub struggle_areas: Option<String>,
    pub granularity_level: Option<i32>,
}

/// A user profile as returned to the client, with the encrypted fields
/// opened. A field that is absent or does not decrypt renders as `null`.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub preferences: Option<String>,
    pub struggle_areas: Option<String>,
    pub granularity_level: i32,
    pub streak_count: i32,
    pub total_completed: i32,
}

fn profile_response(cipher: &FieldCipher, user: User) -> ProfileResponse {
    ProfileResponse {
        preferences: open_field(cipher, user.encrypted_preferences.as_deref(), user.id),
        struggle_areas: open_field(cipher, user.encrypted_struggle_areas.as_deref(), user.id),
        id: user.id,
        email: user.email,
        granularity_level: user.granularity_level,
        streak_count: user.streak_count,
        total_completed: user.total_completed,
    }
}

fn open_field(cipher: &FieldCipher, stored: Option<&[u8]>, user_id: i64) -> Option<String> {
    let stored = stored?;
    match cipher.decrypt(stored) {
        Ok(text) => Some(text),
        Err(error) => {
            warn!(user_id, %error, "profile field does not decrypt, rendering null");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tasks/decompose/stream", post(decompose_stream))
        .route("/api/v1/tasks/user/{user_id}", get(list_user_tasks))
        .route(
            "/api/v1/tasks/{task_id}",
            get(get_task_details).delete(delete_task),
        )
        .route("/api/v1/tasks/microwins/{step_id}", patch(set_step_status))
        .route("/api/v1/users", post(create_user))
        .route("/api/v1/users/{user_id}", get(get_user_profile))
        .route("/api/v1/users/profile/{user_id}", patch(update_user_profile))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("atomize serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("atomize serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Handlers: decomposition
// ---------------------------------------------------------------------------

/// Start a decomposition session and relay its events as SSE.
///
/// The task row is created before the response starts streaming, so intake
/// failures (validation, encryption, insert) surface as ordinary JSON
/// errors. Everything after arrives as `data:` events, ending with either
/// `total_latency_ms` or `error`. A client that disconnects drops the
/// stream, which cancels the session.
async fn decompose_stream(
    State(state): State<AppState>,
    Query(params): Query<DecomposeParams>,
    Json(req): Json<DecomposeRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let instruction = req.instruction.trim().to_owned();
    if instruction.chars().count() < 5 {
        return Err(AppError::validation(
            "instruction must be at least 5 characters",
        ));
    }

    let (_task, events) = state
        .decomposer
        .begin(params.user_id, &instruction)
        .await
        .map_err(AppError::internal)?;

    let sse_events = events.map(|event| {
        let payload = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"error":"event serialization failed"}"#.to_owned());
        Ok::<_, Infallible>(Event::default().data(payload))
    });

    Ok(Sse::new(sse_events))
}

// ---------------------------------------------------------------------------
// Handlers: task views
// ---------------------------------------------------------------------------

async fn list_user_tasks(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<axum::response::Response, AppError> {
    let tasks = views::list_for_user(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?;
    Ok(Json(tasks).into_response())
}

async fn get_task_details(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<axum::response::Response, AppError> {
    let details = views::task_details(&state.pool, &state.cipher, task_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("task {task_id} not found")))?;
    Ok(Json(details).into_response())
}

async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> Result<axum::response::Response, AppError> {
    let deleted = views::delete_task(&state.pool, task_id)
        .await
        .map_err(AppError::internal)?;
    if !deleted {
        return Err(AppError::not_found(format!("task {task_id} not found")));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn set_step_status(
    State(state): State<AppState>,
    Path(step_id): Path<i64>,
    Query(params): Query<StepStatusParams>,
) -> Result<axum::response::Response, AppError> {
    let update = completion::set_step_status(&state.pool, step_id, params.is_completed)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("micro-win {step_id} not found")))?;
    Ok(Json(update).into_response())
}

// ---------------------------------------------------------------------------
// Handlers: users
// ---------------------------------------------------------------------------

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<axum::response::Response, AppError> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::validation("email address is not valid"));
    }

    if users::get_user_by_email(&state.pool, email)
        .await
        .map_err(AppError::internal)?
        .is_some()
    {
        return Err(AppError::conflict(format!(
            "a user with email {email:?} already exists"
        )));
    }

    let user = users::insert_user(&state.pool, email)
        .await
        .map_err(AppError::internal)?;
    let body = Json(profile_response(&state.cipher, user));
    Ok((StatusCode::CREATED, body).into_response())
}

async fn get_user_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<axum::response::Response, AppError> {
    let user = users::get_user(&state.pool, user_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))?;
    Ok(Json(profile_response(&state.cipher, user)).into_response())
}

async fn update_user_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<axum::response::Response, AppError> {
    if let Some(level) = req.granularity_level {
        if !(1..=5).contains(&level) {
            return Err(AppError::validation(
                "granularity_level must be between 1 and 5",
            ));
        }
    }

    let sealed_preferences = seal_field(&state.cipher, req.preferences.as_deref())?;
    let sealed_struggles = seal_field(&state.cipher, req.struggle_areas.as_deref())?;

    let user = users::update_profile(
        &state.pool,
        user_id,
        sealed_preferences.as_deref(),
        sealed_struggles.as_deref(),
        req.granularity_level,
    )
    .await
    .map_err(AppError::internal)?
    .ok_or_else(|| AppError::not_found(format!("user {user_id} not found")))?;

    Ok(Json(profile_response(&state.cipher, user)).into_response())
}

fn seal_field(cipher: &FieldCipher, text: Option<&str>) -> Result<Option<Vec<u8>>, AppError> {
    text.map(|t| cipher.encrypt(t))
        .transpose()
        .map_err(|e| AppError::internal(anyhow::Error::new(e)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
