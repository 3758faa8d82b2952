//! HTTP API for the experience engine.

use crate::award::{award, Award};
use crate::engine::GrantResult;
use crate::error::Error;
use crate::models::{ActivityEntry, LeaderboardRow, RankMode, UserId};
use crate::node::ChieState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<ChieState>;
type ApiResult<T> = Result<T, (StatusCode, String)>;

/// Page size when the client does not ask for one.
const DEFAULT_PAGE: usize = 10;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health (at root and under /api/v1 for compatibility)
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/ready", get(ready))
        // Leaderboard
        .route("/api/v1/leaderboard", get(leaderboard))
        // Users
        .route("/api/v1/users", post(register_user))
        .route("/api/v1/users/:id/experience", get(get_experience))
        .route("/api/v1/users/:id/rank", get(get_rank))
        .route("/api/v1/users/:id/activity", get(list_activity))
        .route("/api/v1/users/:id/grants", post(create_grant))
        // Best-effort hook for action handlers
        .route("/api/v1/triggers", post(trigger))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// HTTP status for an engine error.
pub fn error_status(e: &Error) -> StatusCode {
    match e {
        Error::UnknownActionKind(_) | Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::UserNotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict { .. } => StatusCode::CONFLICT,
        Error::Overflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(e: Error) -> (StatusCode, String) {
    let status = error_status(&e);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", e);
    }
    (status, e.to_string())
}

fn parse_user(raw: &str) -> ApiResult<UserId> {
    UserId::parse(raw).map_err(reject)
}

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

async fn ready() -> &'static str {
    "OK"
}

// --- Leaderboard ---

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    mode: Option<RankMode>,
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(q): Query<LeaderboardQuery>,
) -> ApiResult<Json<Vec<LeaderboardRow>>> {
    let limit = q
        .limit
        .unwrap_or(DEFAULT_PAGE)
        .min(state.config.leaderboard_max);
    let rows = state
        .ranking
        .leaderboard_with(limit, q.offset.unwrap_or(0), q.mode.unwrap_or_default())
        .map_err(reject)?;
    Ok(Json(rows))
}

// --- User endpoints ---

/// Profile view: level, XP and next-level threshold plus leaderboard rank.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExperienceView {
    user_id: UserId,
    level: u64,
    total_xp: u64,
    current_level_xp: u64,
    xp_to_next_level: u64,
    next_level_exp: Option<u64>,
    rank: u64,
}

fn experience_view(state: &ChieState, user: &UserId) -> Result<ExperienceView, Error> {
    let progress = state.engine.progress(user)?;
    let rank = state.ranking.rank_of(user)?;
    Ok(ExperienceView {
        user_id: user.clone(),
        level: progress.level,
        total_xp: progress.total_xp,
        current_level_xp: progress.current_level_xp,
        xp_to_next_level: progress.xp_to_next_level,
        next_level_exp: progress.next_level_threshold,
        rank,
    })
}

async fn get_experience(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExperienceView>> {
    let user = parse_user(&id)?;
    experience_view(&state, &user).map(Json).map_err(reject)
}

#[derive(Debug, Deserialize)]
struct RankQuery {
    mode: Option<RankMode>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RankView {
    user_id: UserId,
    rank: u64,
    mode: RankMode,
}

async fn get_rank(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<RankQuery>,
) -> ApiResult<Json<RankView>> {
    let user = parse_user(&id)?;
    let mode = q.mode.unwrap_or_default();
    let rank = state.ranking.rank_of_with(&user, mode).map_err(reject)?;
    Ok(Json(RankView {
        user_id: user,
        rank,
        mode,
    }))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Vec<ActivityEntry>>> {
    let user = parse_user(&id)?;
    let entries = state
        .engine
        .history(
            &user,
            q.limit.unwrap_or(DEFAULT_PAGE).min(state.config.leaderboard_max),
            q.offset.unwrap_or(0),
        )
        .map_err(reject)?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    user_id: UserId,
}

async fn register_user(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ExperienceView>)> {
    state.engine.register(&req.user_id).map_err(reject)?;
    let view = experience_view(&state, &req.user_id).map_err(reject)?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
struct GrantRequest {
    action: String,
}

async fn create_grant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<GrantRequest>,
) -> ApiResult<(StatusCode, Json<GrantResult>)> {
    let user = parse_user(&id)?;
    let result = state
        .engine
        .grant_named(&user, &req.action)
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TriggerRequest {
    user_id: String,
    action: String,
}

/// Never rejects: a body that cannot be awarded is reported as skipped.
async fn trigger(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Award>) {
    let outcome = serde_json::from_slice::<TriggerRequest>(&body)
        .map_err(Error::from)
        .and_then(|req| Ok((UserId::parse(req.user_id)?, req.action)));
    let outcome = match outcome {
        Ok((user, action)) => award(&state.engine, &user, &action),
        Err(e) => {
            tracing::warn!(error = %e, "Unusable XP trigger");
            Award::skipped(&e)
        }
    };
    (StatusCode::ACCEPTED, Json(outcome))
}
