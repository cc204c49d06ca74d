use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Request/response payloads for game operations.
pub mod game;
/// Health check payloads.
pub mod health;
/// Leaderboard and saved-game history payloads.
pub mod leaderboard;

fn format_timestamp(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
