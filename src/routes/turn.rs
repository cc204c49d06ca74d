use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::game::{GameView, PreviewResponse, SubmitTurnRequest, SubmitTurnResponse, TurnView},
    error::AppError,
    services::turn_service,
    state::SharedState,
};

/// Routes for the turn engine.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games/{id}/turns", post(submit_turn))
        .route("/games/{id}/turns/preview", post(preview_turn))
}

/// Commit a story turn for the current player.
#[utoipa::path(
    post,
    path = "/games/{id}/turns",
    tag = "turns",
    params(("id" = String, Path, description = "Game identifier")),
    request_body = SubmitTurnRequest,
    responses(
        (status = 200, description = "Turn committed", body = SubmitTurnResponse),
        (status = 400, description = "Empty text or game not accepting turns"),
        (status = 403, description = "Not a member or not the caller's turn"),
        (status = 404, description = "Unknown game"),
        (status = 409, description = "Turn deadline passed")
    )
)]
pub async fn submit_turn(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<SubmitTurnRequest>>,
) -> Result<Json<SubmitTurnResponse>, AppError> {
    let (game, turn) =
        turn_service::submit_turn(&state, &id, &payload.player_id, &payload.text).await?;
    Ok(Json(SubmitTurnResponse {
        game: GameView::from(&game),
        turn: TurnView::from(&turn),
    }))
}

/// Dry-run a turn submission without committing anything.
#[utoipa::path(
    post,
    path = "/games/{id}/turns/preview",
    tag = "turns",
    params(("id" = String, Path, description = "Game identifier")),
    request_body = SubmitTurnRequest,
    responses(
        (status = 200, description = "What the submission would do", body = PreviewResponse),
        (status = 403, description = "Not a member or not the caller's turn"),
        (status = 404, description = "Unknown game"),
        (status = 409, description = "Turn deadline passed")
    )
)]
pub async fn preview_turn(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<SubmitTurnRequest>>,
) -> Result<Json<PreviewResponse>, AppError> {
    let preview =
        turn_service::preview_turn(&state, &id, &payload.player_id, &payload.text).await?;
    Ok(Json(PreviewResponse::from(preview)))
}
