//! The turn engine: deadline-gated submission, story accumulation, rotation,
//! rapid-mode decay, and finish detection.
//!
//! Submission runs its own optimistic retry loop rather than the shared
//! [`txn`](crate::services::txn) helper because the next guide prompt is
//! fetched between validation and commit, and every retry must re-run the
//! whole load → validate → compute cycle against the latest committed state.

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    clock,
    dao::models::{TurnDocument, TurnSummary},
    error::ServiceError,
    llm::PromptContext,
    services::{completion_service, txn::MAX_TXN_ATTEMPTS},
    state::{
        SharedState,
        game::{Game, GameMode, GameStatus},
    },
};

/// Reason recorded when a rapid game dies on an elapsed deadline.
const TIMEOUT_REASON: &str = "timeout";

/// Result of a read-only turn preview.
#[derive(Debug)]
pub struct TurnPreview {
    /// Order the turn would take if committed.
    pub order: u32,
    /// Whether committing it would finish the game.
    pub will_finish: bool,
    /// The guide prompt that would follow; `None` when the turn finishes the
    /// game.
    pub next_prompt: Option<String>,
}

/// Commit a turn. Returns the updated game and the recorded turn.
pub async fn submit_turn(
    state: &SharedState,
    game_id: &str,
    player_id: &str,
    text: &str,
) -> Result<(Game, TurnDocument), ServiceError> {
    let store = state.require_game_store().await?;

    for attempt in 1..=MAX_TXN_ATTEMPTS {
        let Some(mut game) = store.find_game(game_id).await? else {
            return Err(ServiceError::NotFound("Game not found".into()));
        };
        let expected = game.version;
        let now = clock::now();

        validate_submission(&game, player_id)?;

        // First turn of a freshly started game: arm the deadline before
        // checking it so the player gets a full window.
        if game.turn_deadline.is_none() {
            game.arm_deadline(now);
        }

        if let Some(deadline) = game.turn_deadline
            && clock::is_expired(deadline, now)
        {
            let timeout = expire_turn(&mut game, now);
            game.version = expected + 1;
            if store.replace_game(game, expected).await? {
                return Err(timeout);
            }
            debug!(game_id, attempt, "timeout write conflicted; retrying");
            continue;
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(ServiceError::InvalidInput("Turn text is required".into()));
        }

        let order = game.turns_count + 1;
        let prompt_in_force = game
            .display_prompt()
            .unwrap_or(game.initial_prompt.as_str())
            .to_owned();
        let will_finish = game.finishes_at(order);

        if game.story_so_far.is_empty() {
            game.story_so_far = text.to_owned();
        } else {
            game.story_so_far.push_str("\n\n");
            game.story_so_far.push_str(text);
        }

        // The next prompt is fetched before committing so the stored game
        // always carries the instruction its current player should follow.
        let next_prompt = if will_finish {
            None
        } else {
            Some(
                state
                    .prompt()
                    .next_prompt(&PromptContext {
                        story_so_far: &game.story_so_far,
                        last_turn_text: text,
                        previous_prompt: &prompt_in_force,
                        turn_number: order + 1,
                        initial_prompt: &game.initial_prompt,
                    })
                    .await,
            )
        };

        let player_name = game
            .players
            .iter()
            .find(|player| player.id == player_id)
            .map(|player| player.name.clone())
            .unwrap_or_default();

        let turn = TurnDocument {
            id: Uuid::new_v4().to_string(),
            game_id: game.id.clone(),
            order,
            player_id: player_id.to_owned(),
            player_name,
            text: text.to_owned(),
            prompt_used: prompt_in_force,
            created_at: now,
        };

        game.turns_count = order;
        game.last_turn = Some(TurnSummary::from(&turn));
        if will_finish {
            game.finish(None, now);
        } else {
            game.guide_prompt = next_prompt;
            if game.mode == GameMode::Rapid {
                game.decay_turn_duration();
            }
            game.rotate(now);
            game.touch(now);
        }

        game.version = expected + 1;
        if store
            .commit_turn(game.clone(), expected, turn.clone())
            .await?
        {
            info!(game_id, order, finished = will_finish, "turn committed");
            if will_finish {
                completion_service::run(state, &game.id).await;
                // Completion merges scores onto the document; re-read so the
                // caller sees them.
                if let Some(scored) = store.find_game(game_id).await? {
                    return Ok((scored, turn));
                }
            }
            return Ok((game, turn));
        }
        debug!(game_id, attempt, "turn write conflicted; retrying");
    }

    Err(ServiceError::Contention)
}

/// Read-only preview of a submission: same validation, computes the would-be
/// order and the prompt the engine would generate next, writes nothing.
pub async fn preview_turn(
    state: &SharedState,
    game_id: &str,
    player_id: &str,
    text: &str,
) -> Result<TurnPreview, ServiceError> {
    let store = state.require_game_store().await?;

    let Some(game) = store.find_game(game_id).await? else {
        return Err(ServiceError::NotFound("Game not found".into()));
    };
    let now = clock::now();

    validate_submission(&game, player_id)?;

    if let Some(deadline) = game.turn_deadline
        && clock::is_expired(deadline, now)
    {
        // Read-only: report the expiry without persisting it. The next
        // submit or get-state call makes the transition durable.
        let mut probe = game.clone();
        return Err(expire_turn(&mut probe, now));
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(ServiceError::InvalidInput("Turn text is required".into()));
    }

    let order = game.turns_count + 1;
    let will_finish = game.finishes_at(order);
    let next_prompt = if will_finish {
        None
    } else {
        let story_preview = if game.story_so_far.is_empty() {
            text.to_owned()
        } else {
            format!("{}\n\n{}", game.story_so_far, text)
        };
        let prompt_in_force = game
            .display_prompt()
            .unwrap_or(game.initial_prompt.as_str())
            .to_owned();
        Some(
            state
                .prompt()
                .next_prompt(&PromptContext {
                    story_so_far: &story_preview,
                    last_turn_text: text,
                    previous_prompt: &prompt_in_force,
                    turn_number: order + 1,
                    initial_prompt: &game.initial_prompt,
                })
                .await,
        )
    };

    Ok(TurnPreview {
        order,
        will_finish,
        next_prompt,
    })
}

fn validate_submission(game: &Game, player_id: &str) -> Result<(), ServiceError> {
    if game.status == GameStatus::Finished {
        return Err(ServiceError::InvalidState(
            "Game is already finished".into(),
        ));
    }
    if game.status == GameStatus::Waiting {
        return Err(ServiceError::InvalidState("Game has not started yet".into()));
    }
    if !game.is_member(player_id) {
        return Err(ServiceError::Forbidden(
            "You are not a player in this game".into(),
        ));
    }
    if game.current_player_id.as_deref() != Some(player_id) {
        return Err(ServiceError::NotYourTurn {
            current_player: game.current_player.clone(),
        });
    }
    Ok(())
}

/// Apply the timeout policy to an expired turn and build the matching error.
/// Rapid mode dies immediately; other modes pass through the transient
/// timeout status and come out active again with the next player armed.
fn expire_turn(game: &mut Game, now: time::OffsetDateTime) -> ServiceError {
    if game.mode == GameMode::Rapid {
        game.finish(Some(TIMEOUT_REASON), now);
        return ServiceError::TurnTimeout {
            finished: true,
            timed_out_player: None,
            next_player: None,
        };
    }

    let timed_out_player = game.current_player.clone();
    game.status = GameStatus::Timeout;
    game.rotate(now);
    // The rotated state is stored active, so the next poll already sees the
    // new player and deadline.
    game.status = GameStatus::Active;
    game.touch(now);
    ServiceError::TurnTimeout {
        finished: false,
        timed_out_player,
        next_player: game.current_player.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::{FutureExt, future::BoxFuture};
    use time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::{GameStore, memory::MemoryGameStore},
            models::{LeaderboardEntry, UserHistoryDocument},
            storage::{StorageError, StorageResult},
        },
        services::lobby_service,
        state::{
            AppState,
            game::{CreateGameParams, GameStatus},
            test_support::memory_state,
        },
    };

    fn host_params() -> CreateGameParams {
        CreateGameParams {
            host_id: Some("host-1".into()),
            host_name: Some("Ada".into()),
            ..CreateGameParams::default()
        }
    }

    async fn two_player_game(state: &SharedState, max_turns: f64) -> Game {
        let mut params = host_params();
        params.max_players = Some(2.0);
        params.max_turns = Some(max_turns);
        let game = lobby_service::create_game(state, GameMode::Multi, params, None)
            .await
            .unwrap();
        lobby_service::request_join(state, &game.id, "p2", "Brin")
            .await
            .unwrap();
        lobby_service::review_join(state, &game.id, "host-1", "p2", true)
            .await
            .unwrap();
        lobby_service::start_game(state, &game.id, "host-1")
            .await
            .unwrap()
    }

    async fn backdate_deadline(store: &MemoryGameStore, game_id: &str) {
        let mut stored = store.find_game(game_id).await.unwrap().unwrap();
        stored.turn_deadline = Some(clock::now() - Duration::seconds(5));
        let version = stored.version;
        stored.version += 1;
        assert!(store.replace_game(stored, version).await.unwrap());
    }

    #[tokio::test]
    async fn out_of_turn_submission_is_rejected_without_mutation() {
        let (state, store) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;

        let err = submit_turn(&state, &game.id, "p2", "The door creaked.")
            .await
            .unwrap_err();
        match err {
            ServiceError::NotYourTurn { current_player } => {
                assert_eq!(current_player.as_deref(), Some("Ada"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        assert_eq!(stored.turns_count, 0);
    }

    #[tokio::test]
    async fn non_member_submission_is_forbidden() {
        let (state, _) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;
        let err = submit_turn(&state, &game.id, "ghost", "Boo.")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn blank_text_is_invalid_input() {
        let (state, store) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;
        let err = submit_turn(&state, &game.id, "host-1", "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        assert_eq!(stored.turns_count, 0);
    }

    #[tokio::test]
    async fn committed_turn_rotates_and_rearms_the_deadline() {
        let (state, _) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;
        let previous_deadline = game.turn_deadline.unwrap();

        let (updated, turn) = submit_turn(&state, &game.id, "host-1", "The door creaked.")
            .await
            .unwrap();
        assert_eq!(turn.order, 1);
        assert_eq!(turn.prompt_used, game.initial_prompt);
        assert_eq!(updated.turns_count, 1);
        assert_eq!(updated.current_player_index, 1);
        assert_eq!(updated.current_player_id.as_deref(), Some("p2"));
        assert!(updated.turn_deadline.unwrap() > previous_deadline);
        assert!(updated.guide_prompt.is_some());
        assert_eq!(updated.last_turn.as_ref().unwrap().text, "The door creaked.");
    }

    #[tokio::test]
    async fn reaching_the_cap_finishes_and_scores_the_game() {
        let (state, store) = memory_state().await;
        let game = two_player_game(&state, 2.0).await;

        submit_turn(&state, &game.id, "host-1", "The door creaked.")
            .await
            .unwrap();
        let (finished, turn) = submit_turn(&state, &game.id, "p2", "Something answered.")
            .await
            .unwrap();

        assert_eq!(turn.order, 2);
        assert_eq!(finished.status, GameStatus::Finished);
        assert_eq!(finished.turns_count, 2);
        assert!(finished.current_player_id.is_none());
        assert!(finished.turn_deadline.is_none());
        assert!(finished.guide_prompt.is_none());
        assert!(finished.scores.is_some());
        let scores = finished.scores.as_ref().unwrap();
        assert!(scores.players.contains_key("Ada"));
        assert!(scores.players.contains_key("Brin"));

        let turns = store.list_turns(&game.id).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].text, "Something answered.");
    }

    #[tokio::test]
    async fn expired_multi_turn_rotates_without_recording() {
        let (state, store) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;
        backdate_deadline(&store, &game.id).await;

        let err = submit_turn(&state, &game.id, "host-1", "Too late.")
            .await
            .unwrap_err();
        match err {
            ServiceError::TurnTimeout {
                finished,
                timed_out_player,
                next_player,
            } => {
                assert!(!finished);
                assert_eq!(timed_out_player.as_deref(), Some("Ada"));
                assert_eq!(next_player.as_deref(), Some("Brin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GameStatus::Active);
        assert_eq!(stored.turns_count, 0);
        assert_eq!(stored.current_player_id.as_deref(), Some("p2"));
        assert!(!clock::is_expired(
            stored.turn_deadline.unwrap(),
            clock::now()
        ));
        assert!(store.list_turns(&game.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_rapid_turn_finishes_the_game() {
        let (state, store) = memory_state().await;
        let game = lobby_service::create_game(&state, GameMode::Rapid, host_params(), None)
            .await
            .unwrap();
        backdate_deadline(&store, &game.id).await;

        let err = submit_turn(&state, &game.id, "host-1", "Too late.")
            .await
            .unwrap_err();
        match err {
            ServiceError::TurnTimeout { finished, .. } => assert!(finished),
            other => panic!("unexpected error: {other:?}"),
        }

        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GameStatus::Finished);
        assert_eq!(stored.ended_reason.as_deref(), Some("timeout"));
        assert_eq!(stored.turns_count, 0);
        // Timeout finishes skip scoring.
        assert!(stored.scores.is_none());
    }

    #[tokio::test]
    async fn rapid_turns_shrink_the_shared_duration() {
        let (state, store) = memory_state().await;
        let mut params = host_params();
        params.max_turns = Some(10.0);
        let game = lobby_service::create_game(&state, GameMode::Rapid, params, None)
            .await
            .unwrap();

        let (updated, _) = submit_turn(&state, &game.id, "host-1", "Fast start.")
            .await
            .unwrap();
        assert_eq!(
            updated.turn_duration_seconds,
            game.turn_duration_seconds - crate::state::game::RAPID_TURN_DECAY_SECONDS
        );
        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        assert_eq!(stored.turn_duration_seconds, updated.turn_duration_seconds);
    }

    #[tokio::test]
    async fn turn_records_the_prompt_in_force_not_the_next_one() {
        let (state, store) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;

        submit_turn(&state, &game.id, "host-1", "The door creaked.")
            .await
            .unwrap();
        let after_first = store.find_game(&game.id).await.unwrap().unwrap();
        let second_prompt = after_first.guide_prompt.clone().unwrap();

        let (_, turn) = submit_turn(&state, &game.id, "p2", "Something answered.")
            .await
            .unwrap();
        assert_eq!(turn.prompt_used, second_prompt);
    }

    #[tokio::test]
    async fn preview_computes_without_writing() {
        let (state, store) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;

        let preview = preview_turn(&state, &game.id, "host-1", "The door creaked.")
            .await
            .unwrap();
        assert_eq!(preview.order, 1);
        assert!(!preview.will_finish);
        assert!(preview.next_prompt.is_some());

        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        assert_eq!(stored.turns_count, 0);
        assert!(stored.story_so_far.is_empty());
        assert_eq!(stored.version, game.version);
    }

    #[tokio::test]
    async fn preview_of_the_final_turn_has_no_next_prompt() {
        let (state, _) = memory_state().await;
        let game = two_player_game(&state, 1.0).await;
        let preview = preview_turn(&state, &game.id, "host-1", "The end.")
            .await
            .unwrap();
        assert!(preview.will_finish);
        assert!(preview.next_prompt.is_none());
    }

    #[tokio::test]
    async fn submitting_to_a_waiting_game_is_rejected() {
        let (state, _) = memory_state().await;
        let game = lobby_service::create_game(&state, GameMode::Multi, host_params(), None)
            .await
            .unwrap();
        let err = submit_turn(&state, &game.id, "host-1", "Too eager.")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn finished_game_rejects_further_turns() {
        let (state, _) = memory_state().await;
        let mut params = host_params();
        params.max_turns = Some(1.0);
        let game = lobby_service::create_game(&state, GameMode::Single, params, None)
            .await
            .unwrap();
        submit_turn(&state, &game.id, "host-1", "Alone at last.")
            .await
            .unwrap();
        let err = submit_turn(&state, &game.id, "host-1", "Encore.")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(ref m)
            if m == "Game is already finished"));
    }

    #[tokio::test]
    async fn preview_of_an_expired_deadline_reports_timeout_without_writing() {
        let (state, store) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;
        backdate_deadline(&store, &game.id).await;
        let before = store.find_game(&game.id).await.unwrap().unwrap();

        let err = preview_turn(&state, &game.id, "host-1", "Too late.")
            .await
            .unwrap_err();
        match err {
            ServiceError::TurnTimeout {
                finished,
                timed_out_player,
                next_player,
            } => {
                assert!(!finished);
                assert_eq!(timed_out_player.as_deref(), Some("Ada"));
                assert_eq!(next_player.as_deref(), Some("Brin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // The rotation was only reported, never persisted.
        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        assert_eq!(stored.version, before.version);
        assert_eq!(stored.status, GameStatus::Active);
        assert_eq!(stored.current_player_id.as_deref(), Some("host-1"));
        assert_eq!(stored.turn_deadline, before.turn_deadline);
    }

    /// Delegates to a real in-memory store but fails every turn commit.
    struct FailingCommitStore {
        inner: MemoryGameStore,
    }

    impl GameStore for FailingCommitStore {
        fn insert_game(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.insert_game(game)
        }

        fn find_game(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Game>>> {
            self.inner.find_game(id)
        }

        fn replace_game(
            &self,
            game: Game,
            expected_version: u64,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.replace_game(game, expected_version)
        }

        fn commit_turn(
            &self,
            _game: Game,
            _expected_version: u64,
            _turn: TurnDocument,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            async {
                Err(StorageError::unavailable(
                    "turn commit failed".into(),
                    std::io::Error::other("storage down"),
                ))
            }
            .boxed()
        }

        fn list_waiting_lobbies(
            &self,
            limit: usize,
        ) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
            self.inner.list_waiting_lobbies(limit)
        }

        fn list_games(&self) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
            self.inner.list_games()
        }

        fn list_turns(
            &self,
            game_id: &str,
        ) -> BoxFuture<'static, StorageResult<Vec<TurnDocument>>> {
            self.inner.list_turns(game_id)
        }

        fn find_leaderboard_entry(
            &self,
            user_id: &str,
        ) -> BoxFuture<'static, StorageResult<Option<LeaderboardEntry>>> {
            self.inner.find_leaderboard_entry(user_id)
        }

        fn replace_leaderboard_entry(
            &self,
            entry: LeaderboardEntry,
            expected_version: Option<u64>,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            self.inner.replace_leaderboard_entry(entry, expected_version)
        }

        fn list_leaderboard(&self) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntry>>> {
            self.inner.list_leaderboard()
        }

        fn delete_leaderboard_entries(
            &self,
            user_ids: Vec<String>,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.delete_leaderboard_entries(user_ids)
        }

        fn find_user_history(
            &self,
            user_id: &str,
        ) -> BoxFuture<'static, StorageResult<Option<UserHistoryDocument>>> {
            self.inner.find_user_history(user_id)
        }

        fn save_user_history(
            &self,
            history: UserHistoryDocument,
        ) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.save_user_history(history)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }
    }

    #[tokio::test]
    async fn failed_turn_commit_leaves_no_partial_state() {
        let memory = MemoryGameStore::new();
        let state = AppState::new(AppConfig::default());
        state
            .install_game_store(Arc::new(FailingCommitStore {
                inner: memory.clone(),
            }))
            .await;

        let game = lobby_service::create_game(&state, GameMode::Single, host_params(), None)
            .await
            .unwrap();
        let err = submit_turn(&state, &game.id, "host-1", "Doomed text.")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));

        // The storage failure must not half-commit: no bumped turn count, no
        // rotation, no orphaned turn record.
        let stored = memory.find_game(&game.id).await.unwrap().unwrap();
        assert_eq!(stored.version, game.version);
        assert_eq!(stored.turns_count, 0);
        assert_eq!(stored.current_player_id.as_deref(), Some("host-1"));
        assert!(memory.list_turns(&game.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_turn_and_record_land_together() {
        let (state, store) = memory_state().await;
        let game = two_player_game(&state, 5.0).await;

        submit_turn(&state, &game.id, "host-1", "The door creaked.")
            .await
            .unwrap();

        let stored = store.find_game(&game.id).await.unwrap().unwrap();
        let turns = store.list_turns(&game.id).await.unwrap();
        assert_eq!(stored.turns_count as usize, turns.len());
        assert_eq!(turns[0].order, 1);
    }
}
