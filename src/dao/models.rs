//! Documents persisted alongside the game aggregate: committed turns, the
//! leaderboard, and per-user saved-game history.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

/// One committed story contribution, append-only and ordered by `order`
/// starting at 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnDocument {
    /// Opaque identifier for the turn record.
    pub id: String,
    /// Game this turn belongs to.
    pub game_id: String,
    /// Position in the story, starting at 1.
    pub order: u32,
    /// Identifier of the submitting player.
    pub player_id: String,
    /// Display name of the submitting player.
    pub player_name: String,
    /// Trimmed, non-empty story text.
    pub text: String,
    /// The guide prompt that was in force for this submission.
    pub prompt_used: String,
    /// Commit time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Compact per-turn view embedded in saved-game summaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct TurnSummary {
    /// Position in the story.
    pub order: u32,
    /// Display name of the contributing player.
    pub player: String,
    /// Story text of the turn.
    pub text: String,
    /// Guide prompt the player was responding to.
    pub prompt: String,
}

impl From<&TurnDocument> for TurnSummary {
    fn from(turn: &TurnDocument) -> Self {
        Self {
            order: turn.order,
            player: turn.player_name.clone(),
            text: turn.text.clone(),
            prompt: turn.prompt_used.clone(),
        }
    }
}

/// Judged metrics for a single player.
///
/// The judge's score schema has drifted over time; synonym keys are
/// normalized here via serde aliases so only the canonical names reach the
/// rest of the system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct PlayerScore {
    /// Originality of the player's contributions.
    pub creativity: f64,
    /// How well the contributions hang together with the story.
    #[serde(alias = "continuity")]
    pub cohesion: f64,
    /// How faithfully the contributions follow the guide prompts.
    #[serde(alias = "momentum")]
    pub prompt_fit: f64,
    /// Free-form judge remarks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl PlayerScore {
    /// Aggregate score used for leaderboard ranking: the mean of the three
    /// judged metrics.
    pub fn aggregate(&self) -> f64 {
        (self.creativity + self.cohesion + self.prompt_fit) / 3.0
    }
}

/// Full scoring result attached to a finished game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct GameScores {
    /// Per-player metrics keyed by display name, in judge order.
    #[schema(value_type = Object)]
    pub players: IndexMap<String, PlayerScore>,
    /// One-paragraph judge verdict on the story.
    pub summary: String,
}

/// Snapshot of a finished game kept in a player's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct SavedGameSummary {
    /// Game this summary was built from.
    pub game_id: String,
    /// When the game was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Judge verdict, or a placeholder when scoring was unavailable.
    pub summary: String,
    /// Turn cap the game was played with.
    pub max_turns: u32,
    /// Every committed turn, in order.
    pub turns: Vec<TurnSummary>,
    /// Scores attached after finish, if scoring succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<GameScores>,
}

/// Per-user history document, capped at the most recent
/// [`SAVED_GAME_HISTORY_LIMIT`] games.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserHistoryDocument {
    /// Owning user.
    pub user_id: String,
    /// Saved games, oldest first.
    pub games: Vec<SavedGameSummary>,
}

/// Maximum number of saved games retained per user; oldest evicted first.
pub const SAVED_GAME_HISTORY_LIMIT: usize = 5;

/// Maximum number of leaderboard entries retained after a trim.
pub const LEADERBOARD_LIMIT: usize = 10;

/// Derived leaderboard record, one per user, trimmed to the top
/// [`LEADERBOARD_LIMIT`] by `top_score`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct LeaderboardEntry {
    /// Ranked user.
    pub user_id: String,
    /// Display name at the time of the last update.
    pub username: String,
    /// Aggregate score from the most recent finished game.
    pub last_score: f64,
    /// Best aggregate score ever recorded for this user.
    pub top_score: f64,
    /// Number of scored games played.
    pub games_played: u32,
    /// Time of the last update.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// Summary of the game that produced `top_score`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_game_summary: Option<SavedGameSummary>,
    /// Optimistic-concurrency counter, bumped on every write.
    #[serde(default)]
    #[schema(ignore)]
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_synonyms_normalize_to_canonical_keys() {
        let raw = serde_json::json!({
            "creativity": 8.0,
            "continuity": 6.5,
            "momentum": 7.0,
        });
        let score: PlayerScore = serde_json::from_value(raw).unwrap();
        assert_eq!(score.cohesion, 6.5);
        assert_eq!(score.prompt_fit, 7.0);
        assert!(score.notes.is_none());
    }

    #[test]
    fn aggregate_is_the_mean_of_the_three_metrics() {
        let score = PlayerScore {
            creativity: 9.0,
            cohesion: 6.0,
            prompt_fit: 3.0,
            notes: None,
        };
        assert!((score.aggregate() - 6.0).abs() < f64::EPSILON);
    }
}
