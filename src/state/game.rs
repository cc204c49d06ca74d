//! Game aggregate and the mode policy turning loosely-typed creation
//! parameters into a validated document.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::{
    clock,
    dao::models::{GameScores, TurnSummary},
    error::ServiceError,
};

/// Lower clamp bound for a configurable turn duration.
pub const TURN_DURATION_MIN_SECONDS: u32 = 30;
/// Upper clamp bound for a configurable turn duration.
pub const TURN_DURATION_MAX_SECONDS: u32 = 600;
/// Turn duration applied when the caller supplies nothing usable.
pub const TURN_DURATION_DEFAULT_SECONDS: u32 = 60;
/// Lower clamp bound for the turn cap.
pub const MAX_TURNS_MIN: u32 = 1;
/// Upper clamp bound for the turn cap.
pub const MAX_TURNS_MAX: u32 = 50;
/// Hard ceiling on lobby capacity across all modes.
pub const MAX_PLAYERS_CEILING: usize = 10;
/// Rapid mode starts every game at this turn duration.
pub const RAPID_INITIAL_TURN_SECONDS: u32 = 60;
/// Rapid mode shrinks the shared turn duration by this much per turn.
pub const RAPID_TURN_DECAY_SECONDS: u32 = 5;
/// Rapid mode never shrinks the turn duration below this floor.
pub const RAPID_MIN_TURN_SECONDS: u32 = 15;
/// Host display name used when none is supplied.
pub const DEFAULT_HOST_NAME: &str = "Host";

/// The three ways a game can be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Several players, lobby phase with host approval.
    Multi,
    /// One player writing alone; starts immediately.
    Single,
    /// Shrinking shared turn timer; a missed deadline ends the game.
    Rapid,
}

impl GameMode {
    /// Minimum roster size required to start a game of this mode.
    pub fn min_players(self) -> usize {
        match self {
            GameMode::Multi => 2,
            GameMode::Single | GameMode::Rapid => 1,
        }
    }

    fn default_max_players(self) -> usize {
        match self {
            GameMode::Multi => 3,
            GameMode::Single => 1,
            GameMode::Rapid => 2,
        }
    }

    fn default_max_turns(self) -> u32 {
        match self {
            GameMode::Multi | GameMode::Single => 5,
            GameMode::Rapid => 50,
        }
    }

    /// Only multi mode has a lobby phase; the others start immediately.
    fn initial_status(self) -> GameStatus {
        match self {
            GameMode::Multi => GameStatus::Waiting,
            GameMode::Single | GameMode::Rapid => GameStatus::Active,
        }
    }
}

/// Lifecycle status of a game.
///
/// `Timeout` is transient: it is only ever observed inside the transaction
/// that discovers an elapsed deadline, after which the game is stored as
/// either `Active` (next player re-armed) or `Finished` (rapid mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Lobby is open; membership can change.
    Waiting,
    /// Turns are being played under a deadline.
    Active,
    /// A deadline elapsed; transient within a single transaction.
    Timeout,
    /// Terminal. No further membership or turn mutation.
    Finished,
}

/// One member of a game, in turn order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Player {
    /// Caller-supplied stable identifier.
    pub id: String,
    /// Display name, unique within the game.
    pub name: String,
}

/// A join request awaiting host review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PendingRequest {
    /// Requesting player's identifier.
    pub player_id: String,
    /// Requesting player's display name.
    pub player_name: String,
    /// When the request was filed.
    #[serde(with = "time::serde::rfc3339")]
    pub requested_at: OffsetDateTime,
}

/// Loosely-typed creation parameters as they arrive from the client.
#[derive(Debug, Clone, Default)]
pub struct CreateGameParams {
    /// Mandatory host identifier.
    pub host_id: Option<String>,
    /// Host display name; trimmed, empty falls back to [`DEFAULT_HOST_NAME`].
    pub host_name: Option<String>,
    /// Requested lobby capacity; clamped per mode.
    pub max_players: Option<f64>,
    /// Requested turn cap; clamped to [`MAX_TURNS_MIN`]..=[`MAX_TURNS_MAX`].
    pub max_turns: Option<f64>,
    /// Requested per-turn duration; ignored in rapid mode.
    pub turn_duration_seconds: Option<f64>,
}

/// The aggregate root: one document per game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    /// Stable identifier, also the document key.
    pub id: String,
    /// Optimistic-concurrency counter, bumped on every committed write.
    #[serde(default)]
    pub version: u64,
    /// Identifier of the creating player.
    pub host_id: String,
    /// Display name of the creating player.
    pub host_name: String,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Play mode, fixed at creation.
    pub mode: GameMode,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation time; drives lobby staleness detection.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Why the game ended, when it did not finish by turn count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_reason: Option<String>,
    /// Opening instruction generated from the seed text at creation.
    pub initial_prompt: String,
    /// Next instruction for the current player; `None` until the first turn
    /// is committed and again once the game finishes.
    #[serde(default)]
    pub guide_prompt: Option<String>,
    /// Full concatenated story. Never exposed to clients directly.
    #[serde(default)]
    pub story_so_far: String,
    /// Denormalized summary of the most recent committed turn.
    #[serde(default)]
    pub last_turn: Option<TurnSummary>,
    /// Number of committed turns.
    pub turns_count: u32,
    /// Turn cap; 0 disables the finish-by-turn-count check.
    pub max_turns: u32,
    /// Seconds allotted per turn; mutable in rapid mode.
    pub turn_duration_seconds: u32,
    /// Deadline for the current turn; `None` while waiting or finished.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub turn_deadline: Option<OffsetDateTime>,
    /// Index of the player whose turn it is.
    pub current_player_index: usize,
    /// Display name of the player whose turn it is.
    #[serde(default)]
    pub current_player: Option<String>,
    /// Identifier of the player whose turn it is.
    #[serde(default)]
    pub current_player_id: Option<String>,
    /// Members in turn order, unique by id and by name.
    pub players: Vec<Player>,
    /// Lobby capacity.
    pub max_players: usize,
    /// Whether joining requires host approval (multi mode only).
    pub requires_approval: bool,
    /// Join requests awaiting host review.
    #[serde(default)]
    pub pending_requests: Vec<PendingRequest>,
    /// Judge scores, attached after finish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<GameScores>,
}

/// Clamp a loosely-typed numeric input, falling back to `default` when the
/// value is absent or not finite.
fn clamp_or_default(input: Option<f64>, min: i64, max: i64, default: i64) -> i64 {
    match input {
        Some(value) if value.is_finite() => (value.round() as i64).clamp(min, max),
        _ => default,
    }
}

impl Game {
    /// Build a validated game from creation parameters and the opening prompt
    /// already obtained from the prompt collaborator.
    pub fn create(
        mode: GameMode,
        params: CreateGameParams,
        initial_prompt: String,
        now: OffsetDateTime,
    ) -> Result<Self, ServiceError> {
        let host_id = params
            .host_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::InvalidInput("hostId is required".into()))?
            .to_owned();

        let host_name = params
            .host_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_HOST_NAME)
            .to_owned();

        let max_players = clamp_or_default(
            params.max_players,
            mode.min_players() as i64,
            MAX_PLAYERS_CEILING as i64,
            mode.default_max_players() as i64,
        ) as usize;

        let max_turns = clamp_or_default(
            params.max_turns,
            i64::from(MAX_TURNS_MIN),
            i64::from(MAX_TURNS_MAX),
            i64::from(mode.default_max_turns()),
        ) as u32;

        let turn_duration_seconds = match mode {
            GameMode::Rapid => RAPID_INITIAL_TURN_SECONDS,
            _ => clamp_or_default(
                params.turn_duration_seconds,
                i64::from(TURN_DURATION_MIN_SECONDS),
                i64::from(TURN_DURATION_MAX_SECONDS),
                i64::from(TURN_DURATION_DEFAULT_SECONDS),
            ) as u32,
        };

        let status = mode.initial_status();
        let turn_deadline = match status {
            GameStatus::Active => Some(clock::deadline_after(now, turn_duration_seconds)),
            _ => None,
        };

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            version: 0,
            host_id: host_id.clone(),
            host_name: host_name.clone(),
            status,
            mode,
            created_at: now,
            updated_at: now,
            ended_reason: None,
            initial_prompt,
            guide_prompt: None,
            story_so_far: String::new(),
            last_turn: None,
            turns_count: 0,
            max_turns,
            turn_duration_seconds,
            turn_deadline,
            current_player_index: 0,
            current_player: Some(host_name.clone()),
            current_player_id: Some(host_id.clone()),
            players: vec![Player {
                id: host_id,
                name: host_name,
            }],
            max_players,
            requires_approval: mode == GameMode::Multi,
            pending_requests: Vec::new(),
            scores: None,
        })
    }

    /// Whether `player_id` belongs to a current member.
    pub fn is_member(&self, player_id: &str) -> bool {
        self.players.iter().any(|player| player.id == player_id)
    }

    /// Whether a member already exists with this id or display name.
    pub fn has_member_id_or_name(&self, player_id: &str, player_name: &str) -> bool {
        self.players
            .iter()
            .any(|player| player.id == player_id || player.name == player_name)
    }

    /// Whether the roster is at capacity.
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// The instruction to display: the live guide prompt once a turn exists,
    /// otherwise the opening prompt.
    pub fn display_prompt(&self) -> Option<&str> {
        match (&self.guide_prompt, self.turns_count) {
            (Some(prompt), _) => Some(prompt),
            (None, 0) if self.status != GameStatus::Finished => Some(&self.initial_prompt),
            _ => None,
        }
    }

    /// Re-derive the denormalized current-player fields from the index.
    pub fn sync_current_player(&mut self) {
        match self.players.get(self.current_player_index) {
            Some(player) => {
                self.current_player = Some(player.name.clone());
                self.current_player_id = Some(player.id.clone());
            }
            None => {
                self.current_player = None;
                self.current_player_id = None;
            }
        }
    }

    /// Arm the deadline for the current turn.
    pub fn arm_deadline(&mut self, now: OffsetDateTime) {
        self.turn_deadline = Some(clock::deadline_after(now, self.turn_duration_seconds));
    }

    /// Advance the rotation one position and re-arm the deadline. Against an
    /// empty roster this clears the current-player fields instead.
    pub fn rotate(&mut self, now: OffsetDateTime) {
        if self.players.is_empty() {
            self.current_player = None;
            self.current_player_id = None;
            self.turn_deadline = None;
            return;
        }
        self.current_player_index = (self.current_player_index + 1) % self.players.len();
        self.sync_current_player();
        self.arm_deadline(now);
    }

    /// Shrink the rapid-mode turn duration by one decay step, bounded below.
    pub fn decay_turn_duration(&mut self) {
        self.turn_duration_seconds = self
            .turn_duration_seconds
            .saturating_sub(RAPID_TURN_DECAY_SECONDS)
            .max(RAPID_MIN_TURN_SECONDS);
    }

    /// Whether committing one more turn reaches the cap. A cap of 0 disables
    /// the check entirely.
    pub fn finishes_at(&self, next_turns_count: u32) -> bool {
        self.max_turns > 0 && next_turns_count >= self.max_turns
    }

    /// Force the game into its terminal state, clearing the live-turn fields.
    pub fn finish(&mut self, reason: Option<&str>, now: OffsetDateTime) {
        self.status = GameStatus::Finished;
        self.ended_reason = reason.map(str::to_owned);
        self.guide_prompt = None;
        self.turn_deadline = None;
        self.current_player = None;
        self.current_player_id = None;
        self.updated_at = now;
    }

    /// Record a mutation time.
    pub fn touch(&mut self, now: OffsetDateTime) {
        self.updated_at = now;
    }
}
