use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::leaderboard::{LeaderboardEntryView, LeaderboardResponse, UserHistoryResponse},
    error::AppError,
    services::completion_service,
    state::SharedState,
};

/// Routes exposing the leaderboard and per-user history.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/leaderboard", get(leaderboard))
        .route("/users/{id}/history", get(user_history))
}

/// The public leaderboard, best score first.
#[utoipa::path(
    get,
    path = "/leaderboard",
    tag = "leaderboard",
    responses((status = 200, description = "Top ranked players", body = LeaderboardResponse))
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let entries = completion_service::leaderboard(&state).await?;
    Ok(Json(LeaderboardResponse {
        entries: entries.into_iter().map(LeaderboardEntryView::from).collect(),
    }))
}

/// A user's saved games, newest first.
#[utoipa::path(
    get,
    path = "/users/{id}/history",
    tag = "leaderboard",
    params(("id" = String, Path, description = "User identifier")),
    responses((status = 200, description = "Saved games", body = UserHistoryResponse))
)]
pub async fn user_history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<UserHistoryResponse>, AppError> {
    let games = completion_service::user_history(&state, &id).await?;
    Ok(Json(UserHistoryResponse { games }))
}
