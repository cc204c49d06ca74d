use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{GameScores, TurnDocument, TurnSummary},
    dto::format_timestamp,
    services::turn_service::TurnPreview,
    state::game::{CreateGameParams, Game, GameMode, GameStatus, PendingRequest, Player},
};

/// Payload used to create a new game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateGameRequest {
    /// Identifier of the creating player. Mandatory.
    pub host_id: Option<String>,
    /// Display name of the creating player; defaults to "Host".
    #[serde(default)]
    pub host_name: Option<String>,
    /// Play mode; defaults to multi.
    #[serde(default)]
    pub mode: Option<GameMode>,
    /// Seed premise handed to the prompt generator.
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub seed: Option<String>,
    /// Requested lobby capacity; clamped per mode.
    #[serde(default)]
    pub max_players: Option<f64>,
    /// Requested turn cap; clamped to 1..=50.
    #[serde(default)]
    pub max_turns: Option<f64>,
    /// Requested per-turn duration in seconds; ignored in rapid mode.
    #[serde(default)]
    pub turn_duration_seconds: Option<f64>,
}

impl CreateGameRequest {
    /// Split the request into the mode, seed, and creation parameters.
    pub fn into_parts(self) -> (GameMode, Option<String>, CreateGameParams) {
        let mode = self.mode.unwrap_or(GameMode::Multi);
        let params = CreateGameParams {
            host_id: self.host_id,
            host_name: self.host_name,
            max_players: self.max_players,
            max_turns: self.max_turns,
            turn_duration_seconds: self.turn_duration_seconds,
        };
        (mode, self.seed, params)
    }
}

/// Identity payload for join and request-to-join operations.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Joining player's identifier.
    #[validate(length(min = 1))]
    pub player_id: String,
    /// Joining player's display name.
    #[validate(length(min = 1))]
    pub player_name: String,
}

/// Host decision on a pending join request.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ReviewJoinRequest {
    /// Caller identity; must match the game's host.
    #[validate(length(min = 1))]
    pub host_id: String,
    /// Player whose request is being reviewed.
    #[validate(length(min = 1))]
    pub player_id: String,
    /// True to approve, false to deny.
    pub approve: bool,
}

/// Host identity payload for start and abandon operations.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct HostActionRequest {
    /// Caller identity; must match the game's host.
    #[validate(length(min = 1))]
    pub host_id: String,
}

/// Payload submitting (or previewing) a turn.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitTurnRequest {
    /// Submitting player's identifier.
    #[validate(length(min = 1))]
    pub player_id: String,
    /// Story text extending the tale.
    #[validate(length(max = 5000))]
    pub text: String,
}

/// Payload for the bulk lobby cleanup operation.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CleanupRequest {
    /// Only close lobbies created before this instant.
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>)]
    pub before: Option<OffsetDateTime>,
}

/// Number of lobbies closed by a cleanup call.
#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    /// Lobbies transitioned to finished.
    pub closed: usize,
}

/// Public projection of a player.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id.clone(),
            name: player.name.clone(),
        }
    }
}

/// Public projection of a pending join request.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingRequestView {
    pub player_id: String,
    pub player_name: String,
    pub requested_at: String,
}

impl From<&PendingRequest> for PendingRequestView {
    fn from(request: &PendingRequest) -> Self {
        Self {
            player_id: request.player_id.clone(),
            player_name: request.player_name.clone(),
            requested_at: format_timestamp(request.requested_at),
        }
    }
}

/// Public projection of a game.
///
/// The full story text stays server-side: clients only ever see the last
/// committed turn and the prompt to respond to. Before the first turn the
/// visible prompt is the opening prompt.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameView {
    pub id: String,
    pub host_id: String,
    pub host_name: String,
    pub status: GameStatus,
    pub mode: GameMode,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_reason: Option<String>,
    pub initial_prompt: String,
    /// The instruction the current player should follow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guide_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_turn: Option<TurnSummary>,
    pub turns_count: u32,
    pub max_turns: u32,
    pub turn_duration_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_deadline: Option<String>,
    pub current_player_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player_id: Option<String>,
    pub players: Vec<PlayerView>,
    pub max_players: usize,
    pub requires_approval: bool,
    pub pending_requests: Vec<PendingRequestView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<GameScores>,
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        Self {
            id: game.id.clone(),
            host_id: game.host_id.clone(),
            host_name: game.host_name.clone(),
            status: game.status,
            mode: game.mode,
            created_at: format_timestamp(game.created_at),
            updated_at: format_timestamp(game.updated_at),
            ended_reason: game.ended_reason.clone(),
            initial_prompt: game.initial_prompt.clone(),
            guide_prompt: game.display_prompt().map(str::to_owned),
            last_turn: game.last_turn.clone(),
            turns_count: game.turns_count,
            max_turns: game.max_turns,
            turn_duration_seconds: game.turn_duration_seconds,
            turn_deadline: game.turn_deadline.map(format_timestamp),
            current_player_index: game.current_player_index,
            current_player: game.current_player.clone(),
            current_player_id: game.current_player_id.clone(),
            players: game.players.iter().map(PlayerView::from).collect(),
            max_players: game.max_players,
            requires_approval: game.requires_approval,
            pending_requests: game
                .pending_requests
                .iter()
                .map(PendingRequestView::from)
                .collect(),
            scores: game.scores.clone(),
        }
    }
}

/// Open lobbies page.
#[derive(Debug, Serialize, ToSchema)]
pub struct LobbyListResponse {
    pub lobbies: Vec<GameView>,
}

/// Public projection of a committed turn.
#[derive(Debug, Serialize, ToSchema)]
pub struct TurnView {
    pub id: String,
    pub order: u32,
    pub player_id: String,
    pub player_name: String,
    pub text: String,
    pub prompt_used: String,
    pub created_at: String,
}

impl From<&TurnDocument> for TurnView {
    fn from(turn: &TurnDocument) -> Self {
        Self {
            id: turn.id.clone(),
            order: turn.order,
            player_id: turn.player_id.clone(),
            player_name: turn.player_name.clone(),
            text: turn.text.clone(),
            prompt_used: turn.prompt_used.clone(),
            created_at: format_timestamp(turn.created_at),
        }
    }
}

/// Response to a committed turn.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitTurnResponse {
    pub game: GameView,
    pub turn: TurnView,
}

/// Response to a turn preview.
#[derive(Debug, Serialize, ToSchema)]
pub struct PreviewResponse {
    /// Order the turn would take if committed.
    pub order: u32,
    /// Whether committing it would finish the game.
    pub will_finish: bool,
    /// The guide prompt that would follow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_prompt: Option<String>,
}

impl From<TurnPreview> for PreviewResponse {
    fn from(preview: TurnPreview) -> Self {
        Self {
            order: preview.order,
            will_finish: preview.will_finish,
            next_prompt: preview.next_prompt,
        }
    }
}
