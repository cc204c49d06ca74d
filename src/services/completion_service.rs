//! Post-finish pipeline: judge scoring, per-user saved-game history, and the
//! leaderboard.
//!
//! Runs after the finishing turn has already committed. Nothing here can
//! roll that commit back: every failure is logged and swallowed.

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    clock,
    dao::models::{
        GameScores, LEADERBOARD_LIMIT, LeaderboardEntry, SAVED_GAME_HISTORY_LIMIT,
        SavedGameSummary, TurnSummary, UserHistoryDocument,
    },
    error::ServiceError,
    services::txn::{self, MAX_TXN_ATTEMPTS, Mutation},
    state::{SharedState, game::Player},
};

/// Prefix marking an AI actor id; such players get no history or leaderboard
/// records.
const AI_PLAYER_PREFIX: &str = "ai-";

/// Run the completion pipeline for a game that just finished by turn count.
/// Never fails the caller: the finished game state stands regardless.
pub async fn run(state: &SharedState, game_id: &str) {
    if let Err(err) = score_and_record(state, game_id).await {
        warn!(game_id, error = %err, "completion pipeline failed; game state stands");
    }
}

async fn score_and_record(state: &SharedState, game_id: &str) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;

    let Some(game) = store.find_game(game_id).await? else {
        return Err(ServiceError::NotFound("Game not found".into()));
    };
    let turns = store.list_turns(game_id).await?;

    let scores = state.judge().score(&game, &turns).await;

    // Attach the scores to the game document so clients polling get-state
    // see the verdict.
    let (game, _) = txn::with_game(&store, game_id, |game| {
        game.scores = Some(scores.clone());
        Ok(Mutation::Write(()))
    })
    .await?;

    let summary = SavedGameSummary {
        game_id: game.id.clone(),
        created_at: game.created_at,
        summary: scores.summary.clone(),
        max_turns: game.max_turns,
        turns: turns.iter().map(TurnSummary::from).collect(),
        scores: Some(scores.clone()),
    };

    for player in &game.players {
        if is_ai_player(&player.id) {
            continue;
        }
        if let Err(err) = save_to_history(state, &player.id, summary.clone()).await {
            warn!(game_id, player_id = %player.id, error = %err, "failed to save game history");
        }
    }

    update_leaderboard(state, &game.players, &scores, &summary).await;
    trim_leaderboard(state).await;

    info!(game_id, "completion pipeline finished");
    Ok(())
}

fn is_ai_player(player_id: &str) -> bool {
    player_id.starts_with(AI_PLAYER_PREFIX)
}

/// Append a saved game to a user's history, evicting the oldest entry once
/// the cap is reached. A re-run for the same game replaces its own entry.
async fn save_to_history(
    state: &SharedState,
    user_id: &str,
    summary: SavedGameSummary,
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;

    let mut history = store
        .find_user_history(user_id)
        .await?
        .unwrap_or_else(|| UserHistoryDocument {
            user_id: user_id.to_owned(),
            games: Vec::new(),
        });

    history.games.retain(|entry| entry.game_id != summary.game_id);
    history.games.push(summary);
    while history.games.len() > SAVED_GAME_HISTORY_LIMIT {
        history.games.remove(0);
    }

    store.save_user_history(history).await?;
    Ok(())
}

/// Upsert a leaderboard entry per scored human player. Each upsert runs its
/// own optimistic retry loop against the entry's version.
async fn update_leaderboard(
    state: &SharedState,
    players: &[Player],
    scores: &GameScores,
    summary: &SavedGameSummary,
) {
    for (name, score) in &scores.players {
        let Some(player) = players.iter().find(|player| &player.name == name) else {
            // The judge sometimes invents or misspells names; nothing to rank.
            warn!(player_name = %name, "scored player not in roster; skipping");
            continue;
        };
        if is_ai_player(&player.id) {
            continue;
        }

        let aggregate = score.aggregate();
        if let Err(err) =
            upsert_leaderboard_entry(state, player, aggregate, summary, clock::now()).await
        {
            warn!(player_id = %player.id, error = %err, "failed to update leaderboard entry");
        }
    }
}

async fn upsert_leaderboard_entry(
    state: &SharedState,
    player: &Player,
    aggregate: f64,
    summary: &SavedGameSummary,
    now: OffsetDateTime,
) -> Result<(), ServiceError> {
    let store = state.require_game_store().await?;

    for _ in 0..MAX_TXN_ATTEMPTS {
        let existing = store.find_leaderboard_entry(&player.id).await?;
        let (entry, expected) = match existing {
            None => (
                LeaderboardEntry {
                    user_id: player.id.clone(),
                    username: player.name.clone(),
                    last_score: aggregate,
                    top_score: aggregate,
                    games_played: 1,
                    last_updated: now,
                    top_game_summary: Some(summary.clone()),
                    version: 0,
                },
                None,
            ),
            Some(existing) => {
                let personal_best = aggregate > existing.top_score;
                (
                    LeaderboardEntry {
                        user_id: existing.user_id.clone(),
                        username: player.name.clone(),
                        last_score: aggregate,
                        top_score: existing.top_score.max(aggregate),
                        games_played: existing.games_played + 1,
                        last_updated: now,
                        top_game_summary: if personal_best {
                            Some(summary.clone())
                        } else {
                            existing.top_game_summary.clone()
                        },
                        version: existing.version + 1,
                    },
                    Some(existing.version),
                )
            }
        };

        if store.replace_leaderboard_entry(entry, expected).await? {
            return Ok(());
        }
    }

    Err(ServiceError::Contention)
}

/// Keep only the top entries by best score, deleting the rest in one batch.
async fn trim_leaderboard(state: &SharedState) {
    let Ok(store) = state.require_game_store().await else {
        return;
    };
    let entries = match store.list_leaderboard().await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, "failed to list leaderboard for trim");
            return;
        }
    };
    if entries.len() <= LEADERBOARD_LIMIT {
        return;
    }
    let evicted: Vec<String> = entries
        .into_iter()
        .skip(LEADERBOARD_LIMIT)
        .map(|entry| entry.user_id)
        .collect();
    let count = evicted.len();
    if let Err(err) = store.delete_leaderboard_entries(evicted).await {
        warn!(error = %err, "failed to trim leaderboard");
    } else {
        info!(count, "trimmed leaderboard");
    }
}

/// Current leaderboard, best first.
pub async fn leaderboard(state: &SharedState) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let store = state.require_game_store().await?;
    let mut entries = store.list_leaderboard().await?;
    entries.truncate(LEADERBOARD_LIMIT);
    Ok(entries)
}

/// A user's saved games, newest first.
pub async fn user_history(
    state: &SharedState,
    user_id: &str,
) -> Result<Vec<SavedGameSummary>, ServiceError> {
    let store = state.require_game_store().await?;
    let mut games = store
        .find_user_history(user_id)
        .await?
        .map(|history| history.games)
        .unwrap_or_default();
    games.reverse();
    Ok(games)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::game_store::GameStore,
        services::{lobby_service, turn_service},
        state::{
            game::{CreateGameParams, GameMode},
            test_support::memory_state,
        },
    };

    fn params(host_id: &str, name: &str) -> CreateGameParams {
        CreateGameParams {
            host_id: Some(host_id.into()),
            host_name: Some(name.into()),
            max_turns: Some(1.0),
            ..CreateGameParams::default()
        }
    }

    async fn play_one_game(state: &crate::state::SharedState, host_id: &str, name: &str) {
        let game = lobby_service::create_game(state, GameMode::Single, params(host_id, name), None)
            .await
            .unwrap();
        turn_service::submit_turn(state, &game.id, host_id, "A whole story in one turn.")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finishing_a_game_records_history_and_leaderboard() {
        let (state, _) = memory_state().await;
        play_one_game(&state, "u1", "Ada").await;

        let history = user_history(&state, "u1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].turns.len(), 1);
        assert!(history[0].scores.is_some());

        let board = leaderboard(&state).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].user_id, "u1");
        assert_eq!(board[0].games_played, 1);
        assert!(board[0].top_game_summary.is_some());
    }

    #[tokio::test]
    async fn history_is_capped_at_five_with_oldest_evicted() {
        let (state, _) = memory_state().await;
        let mut first_game_id = None;
        for i in 0..6 {
            let game = lobby_service::create_game(
                &state,
                GameMode::Single,
                params("u1", "Ada"),
                None,
            )
            .await
            .unwrap();
            if i == 0 {
                first_game_id = Some(game.id.clone());
            }
            turn_service::submit_turn(&state, &game.id, "u1", "Story text.")
                .await
                .unwrap();
        }

        let history = user_history(&state, "u1").await.unwrap();
        assert_eq!(history.len(), SAVED_GAME_HISTORY_LIMIT);
        let first = first_game_id.unwrap();
        assert!(history.iter().all(|entry| entry.game_id != first));
    }

    #[tokio::test]
    async fn leaderboard_never_exceeds_ten_entries() {
        let (state, _) = memory_state().await;
        for i in 0..12 {
            play_one_game(&state, &format!("u{i}"), &format!("Player{i}")).await;
        }
        let board = leaderboard(&state).await.unwrap();
        assert_eq!(board.len(), LEADERBOARD_LIMIT);
    }

    #[tokio::test]
    async fn repeat_games_bump_games_played_and_keep_top_score() {
        let (state, _) = memory_state().await;
        play_one_game(&state, "u1", "Ada").await;
        play_one_game(&state, "u1", "Ada").await;

        let board = leaderboard(&state).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].games_played, 2);
        assert_eq!(board[0].last_score, board[0].top_score);
    }

    #[tokio::test]
    async fn ai_players_are_excluded_from_records() {
        let (state, store) = memory_state().await;
        let game = lobby_service::create_game(
            &state,
            GameMode::Single,
            CreateGameParams {
                host_id: Some("ai-narrator".into()),
                host_name: Some("Narrator".into()),
                max_turns: Some(1.0),
                ..CreateGameParams::default()
            },
            None,
        )
        .await
        .unwrap();
        turn_service::submit_turn(&state, &game.id, "ai-narrator", "Machine prose.")
            .await
            .unwrap();

        assert!(user_history(&state, "ai-narrator").await.unwrap().is_empty());
        assert!(leaderboard(&state).await.unwrap().is_empty());
        // The game itself is still scored.
        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        assert!(stored.scores.is_some());
    }
}
