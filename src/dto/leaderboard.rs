use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{LeaderboardEntry, SavedGameSummary},
    dto::format_timestamp,
};

/// One ranked row of the public leaderboard.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardEntryView {
    pub user_id: String,
    pub username: String,
    pub last_score: f64,
    pub top_score: f64,
    pub games_played: u32,
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_game_summary: Option<SavedGameSummary>,
}

impl From<LeaderboardEntry> for LeaderboardEntryView {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            user_id: entry.user_id,
            username: entry.username,
            last_score: entry.last_score,
            top_score: entry.top_score,
            games_played: entry.games_played,
            last_updated: format_timestamp(entry.last_updated),
            top_game_summary: entry.top_game_summary,
        }
    }
}

/// Leaderboard page, best score first.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntryView>,
}

/// A user's saved games, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserHistoryResponse {
    pub games: Vec<SavedGameSummary>,
}
