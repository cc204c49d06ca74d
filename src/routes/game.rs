use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::game::{
        CleanupRequest, CleanupResponse, CreateGameRequest, GameView, HostActionRequest,
        JoinRequest, LobbyListResponse, ReviewJoinRequest,
    },
    error::AppError,
    services::lobby_service,
    state::SharedState,
};

/// Routes handling lobby lifecycle and membership.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game).get(list_lobbies))
        .route("/games/cleanup", post(cleanup_lobbies))
        .route("/games/{id}", get(get_state))
        .route("/games/{id}/join", post(join_game))
        .route("/games/{id}/join-requests", post(request_join))
        .route("/games/{id}/join-requests/review", post(review_join))
        .route("/games/{id}/start", post(start_game))
        .route("/games/{id}/abandon", post(abandon_game))
}

/// Create a fresh game and persist it.
#[utoipa::path(
    post,
    path = "/games",
    tag = "lobby",
    request_body = CreateGameRequest,
    responses(
        (status = 200, description = "Game created", body = GameView),
        (status = 400, description = "Missing host id or invalid payload")
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateGameRequest>>,
) -> Result<Json<GameView>, AppError> {
    let (mode, seed, params) = payload.into_parts();
    let game = lobby_service::create_game(&state, mode, params, seed.as_deref()).await?;
    Ok(Json(GameView::from(&game)))
}

/// List open multiplayer lobbies still waiting for players.
#[utoipa::path(
    get,
    path = "/games",
    tag = "lobby",
    responses((status = 200, description = "Open lobbies", body = LobbyListResponse))
)]
pub async fn list_lobbies(
    State(state): State<SharedState>,
) -> Result<Json<LobbyListResponse>, AppError> {
    let lobbies = lobby_service::list_open_lobbies(&state).await?;
    Ok(Json(LobbyListResponse {
        lobbies: lobbies.iter().map(GameView::from).collect(),
    }))
}

/// Close every waiting lobby, optionally only those created before a cutoff.
#[utoipa::path(
    post,
    path = "/games/cleanup",
    tag = "lobby",
    request_body = CleanupRequest,
    responses((status = 200, description = "Lobbies closed", body = CleanupResponse))
)]
pub async fn cleanup_lobbies(
    State(state): State<SharedState>,
    Json(payload): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, AppError> {
    let closed = lobby_service::cleanup_lobbies(&state, payload.before).await?;
    Ok(Json(CleanupResponse { closed }))
}

/// Fetch the current public state of a game.
#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "lobby",
    params(("id" = String, Path, description = "Game identifier")),
    responses(
        (status = 200, description = "Current game state", body = GameView),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn get_state(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<GameView>, AppError> {
    let game = lobby_service::get_state(&state, &id).await?;
    Ok(Json(GameView::from(&game)))
}

/// Join an open multiplayer lobby directly.
#[utoipa::path(
    post,
    path = "/games/{id}/join",
    tag = "lobby",
    params(("id" = String, Path, description = "Game identifier")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Joined", body = GameView),
        (status = 400, description = "Lobby full, not joinable, or approval required"),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn join_game(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<GameView>, AppError> {
    let game =
        lobby_service::join_game(&state, &id, &payload.player_id, &payload.player_name).await?;
    Ok(Json(GameView::from(&game)))
}

/// File a join request for the host to review.
#[utoipa::path(
    post,
    path = "/games/{id}/join-requests",
    tag = "lobby",
    params(("id" = String, Path, description = "Game identifier")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Request queued", body = GameView),
        (status = 400, description = "Lobby full or not joinable"),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn request_join(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<GameView>, AppError> {
    let game =
        lobby_service::request_join(&state, &id, &payload.player_id, &payload.player_name).await?;
    Ok(Json(GameView::from(&game)))
}

/// Approve or deny a pending join request. Host only.
#[utoipa::path(
    post,
    path = "/games/{id}/join-requests/review",
    tag = "lobby",
    params(("id" = String, Path, description = "Game identifier")),
    request_body = ReviewJoinRequest,
    responses(
        (status = 200, description = "Request reviewed", body = GameView),
        (status = 403, description = "Caller is not the host"),
        (status = 404, description = "Unknown game or request")
    )
)]
pub async fn review_join(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<ReviewJoinRequest>>,
) -> Result<Json<GameView>, AppError> {
    let game = lobby_service::review_join(
        &state,
        &id,
        &payload.host_id,
        &payload.player_id,
        payload.approve,
    )
    .await?;
    Ok(Json(GameView::from(&game)))
}

/// Start a waiting game. Host only.
#[utoipa::path(
    post,
    path = "/games/{id}/start",
    tag = "lobby",
    params(("id" = String, Path, description = "Game identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Game started", body = GameView),
        (status = 400, description = "Not enough players"),
        (status = 403, description = "Caller is not the host"),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<HostActionRequest>>,
) -> Result<Json<GameView>, AppError> {
    let game = lobby_service::start_game(&state, &id, &payload.host_id).await?;
    Ok(Json(GameView::from(&game)))
}

/// Abandon a game, finishing it immediately. Host only.
#[utoipa::path(
    post,
    path = "/games/{id}/abandon",
    tag = "lobby",
    params(("id" = String, Path, description = "Game identifier")),
    request_body = HostActionRequest,
    responses(
        (status = 200, description = "Game abandoned", body = GameView),
        (status = 403, description = "Caller is not the host"),
        (status = 404, description = "Unknown game")
    )
)]
pub async fn abandon_game(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<HostActionRequest>>,
) -> Result<Json<GameView>, AppError> {
    let game = lobby_service::abandon_game(&state, &id, &payload.host_id).await?;
    Ok(Json(GameView::from(&game)))
}
