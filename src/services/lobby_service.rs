//! Lobby and membership operations: creation, joining, approval workflow,
//! start/abandon, state reads, and lobby lifecycle cleanup.

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{
    clock,
    error::ServiceError,
    services::txn::{self, Mutation},
    state::{
        SharedState,
        game::{CreateGameParams, Game, GameMode, GameStatus, PendingRequest, Player},
    },
};

/// Reason recorded on lobbies closed by the staleness sweep.
const STALE_CLEANUP_REASON: &str = "stale_cleanup";
/// Reason recorded on lobbies closed by the bulk cleanup operation.
const BULK_CLEANUP_REASON: &str = "cleanup";
/// Reason recorded when the host abandons a game.
const ABANDONED_REASON: &str = "abandoned";
/// Reason recorded when a rapid game dies on an elapsed deadline.
const TIMEOUT_REASON: &str = "timeout";

/// Create a game, fetching the opening prompt from the prompt collaborator.
pub async fn create_game(
    state: &SharedState,
    mode: GameMode,
    params: CreateGameParams,
    seed: Option<&str>,
) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;

    let initial_prompt = state.prompt().opening_prompt(seed).await;
    let game = Game::create(mode, params, initial_prompt, clock::now())?;

    store.insert_game(game.clone()).await?;
    info!(game_id = %game.id, mode = ?game.mode, "game created");
    Ok(game)
}

/// Read a game's current state. An expired rapid game is finished here as a
/// side effect of the read, so polling clients observe the transition.
pub async fn get_state(state: &SharedState, game_id: &str) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;

    let (game, _) = txn::with_game(&store, game_id, |game| {
        let now = clock::now();
        let rapid_expired = game.mode == GameMode::Rapid
            && game.status == GameStatus::Active
            && game
                .turn_deadline
                .is_some_and(|deadline| clock::is_expired(deadline, now));
        if rapid_expired {
            game.finish(Some(TIMEOUT_REASON), now);
            Ok(Mutation::Write(()))
        } else {
            Ok(Mutation::Keep(()))
        }
    })
    .await?;

    Ok(game)
}

/// Direct join for games that do not require approval. Idempotent for
/// existing members.
pub async fn join_game(
    state: &SharedState,
    game_id: &str,
    player_id: &str,
    player_name: &str,
) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;
    let (player_id, player_name) = required_identity(player_id, player_name)?;

    let (game, _) = txn::with_game(&store, game_id, |game| {
        ensure_not_finished(game)?;
        if game.mode != GameMode::Multi {
            return Err(ServiceError::InvalidState(
                "Only multiplayer games can be joined".into(),
            ));
        }
        if game.has_member_id_or_name(&player_id, &player_name) {
            return Ok(Mutation::Keep(()));
        }
        if game.status != GameStatus::Waiting {
            return Err(ServiceError::InvalidState(
                "Game is not waiting for players".into(),
            ));
        }
        if game.requires_approval {
            return Err(ServiceError::InvalidState(
                "This game requires host approval to join".into(),
            ));
        }
        add_player(game, &player_id, &player_name)?;
        Ok(Mutation::Write(()))
    })
    .await?;

    Ok(game)
}

/// File a join request for host review. Re-requests are idempotent.
pub async fn request_join(
    state: &SharedState,
    game_id: &str,
    player_id: &str,
    player_name: &str,
) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;
    let (player_id, player_name) = required_identity(player_id, player_name)?;

    let (game, _) = txn::with_game(&store, game_id, |game| {
        if game.mode != GameMode::Multi {
            return Err(ServiceError::InvalidState(
                "Only multiplayer games accept join requests".into(),
            ));
        }
        if game.has_member_id_or_name(&player_id, &player_name) {
            return Ok(Mutation::Keep(()));
        }
        if game.status != GameStatus::Waiting {
            return Err(ServiceError::InvalidState(
                "Game is not waiting for players".into(),
            ));
        }
        if game.is_full() {
            return Err(ServiceError::InvalidState("Game is full".into()));
        }
        if game
            .pending_requests
            .iter()
            .any(|request| request.player_id == player_id)
        {
            return Ok(Mutation::Keep(()));
        }
        game.pending_requests.push(PendingRequest {
            player_id: player_id.clone(),
            player_name: player_name.clone(),
            requested_at: clock::now(),
        });
        game.touch(clock::now());
        Ok(Mutation::Write(()))
    })
    .await?;

    Ok(game)
}

/// Host review of a pending join request. Approval removes the request and
/// adds the player in the same transaction; denial only removes it.
pub async fn review_join(
    state: &SharedState,
    game_id: &str,
    host_id: &str,
    player_id: &str,
    approve: bool,
) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;

    let (game, _) = txn::with_game(&store, game_id, |game| {
        if game.host_id != host_id {
            return Err(ServiceError::Forbidden(
                "Only the host can review join requests".into(),
            ));
        }
        if game.status != GameStatus::Waiting {
            return Err(ServiceError::InvalidState(
                "Game is not waiting for players".into(),
            ));
        }
        let Some(position) = game
            .pending_requests
            .iter()
            .position(|request| request.player_id == player_id)
        else {
            return Err(ServiceError::NotFound("Join request not found".into()));
        };
        let request = game.pending_requests.remove(position);
        if approve {
            add_player(game, &request.player_id, &request.player_name)?;
        }
        game.touch(clock::now());
        Ok(Mutation::Write(()))
    })
    .await?;

    Ok(game)
}

/// Transition a lobby into active play, arming the first deadline.
/// Idempotent when the game is already active.
pub async fn start_game(
    state: &SharedState,
    game_id: &str,
    host_id: &str,
) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;

    let (game, _) = txn::with_game(&store, game_id, |game| {
        if game.host_id != host_id {
            return Err(ServiceError::Forbidden(
                "Only the host can start the game".into(),
            ));
        }
        ensure_not_finished(game)?;
        if game.status == GameStatus::Active {
            return Ok(Mutation::Keep(()));
        }
        if game.mode == GameMode::Multi && game.players.len() < game.mode.min_players() {
            return Err(ServiceError::InvalidState(
                "At least 2 players are required to start".into(),
            ));
        }
        let now = clock::now();
        game.status = GameStatus::Active;
        game.sync_current_player();
        game.arm_deadline(now);
        game.touch(now);
        Ok(Mutation::Write(()))
    })
    .await?;

    Ok(game)
}

/// Host-only early termination. No scoring runs. Idempotent once finished.
pub async fn abandon_game(
    state: &SharedState,
    game_id: &str,
    host_id: &str,
) -> Result<Game, ServiceError> {
    let store = state.require_game_store().await?;

    let (game, _) = txn::with_game(&store, game_id, |game| {
        if game.host_id != host_id {
            return Err(ServiceError::Forbidden(
                "Only the host can abandon the game".into(),
            ));
        }
        if game.status == GameStatus::Finished {
            return Ok(Mutation::Keep(()));
        }
        game.finish(Some(ABANDONED_REASON), clock::now());
        Ok(Mutation::Write(()))
    })
    .await?;

    Ok(game)
}

/// Waiting multi-mode lobbies, newest first. Lobbies inactive for longer than
/// the staleness window are closed in the background and excluded from the
/// page. Falls back to a full scan when the indexed query path is
/// unavailable.
pub async fn list_open_lobbies(state: &SharedState) -> Result<Vec<Game>, ServiceError> {
    let store = state.require_game_store().await?;
    let limit = state.config().lobby_page_limit;

    let candidates = match store.list_waiting_lobbies(limit).await {
        Ok(lobbies) => lobbies,
        Err(err) => {
            warn!(error = %err, "indexed lobby query failed; falling back to full scan");
            let mut lobbies: Vec<Game> = store
                .list_games()
                .await?
                .into_iter()
                .filter(|game| {
                    game.status == GameStatus::Waiting && game.mode == GameMode::Multi
                })
                .collect();
            lobbies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            lobbies.truncate(limit);
            lobbies
        }
    };

    let cutoff = clock::now() - state.config().stale_lobby_window;
    let (stale, fresh): (Vec<Game>, Vec<Game>) = candidates
        .into_iter()
        .partition(|game| game.updated_at < cutoff);

    if !stale.is_empty() {
        let state = state.clone();
        tokio::spawn(async move {
            close_stale_lobbies(&state, stale).await;
        });
    }

    Ok(fresh)
}

async fn close_stale_lobbies(state: &SharedState, stale: Vec<Game>) {
    let Ok(store) = state.require_game_store().await else {
        return;
    };
    for lobby in stale {
        let result = txn::with_game(&store, &lobby.id, |game| {
            if game.status != GameStatus::Waiting {
                return Ok(Mutation::Keep(()));
            }
            game.finish(Some(STALE_CLEANUP_REASON), clock::now());
            Ok(Mutation::Write(()))
        })
        .await;
        match result {
            Ok(_) => info!(game_id = %lobby.id, "closed stale lobby"),
            Err(err) => warn!(game_id = %lobby.id, error = %err, "failed to close stale lobby"),
        }
    }
}

/// Close every waiting lobby, optionally only those created before `before`.
/// Returns the number of lobbies closed.
pub async fn cleanup_lobbies(
    state: &SharedState,
    before: Option<OffsetDateTime>,
) -> Result<usize, ServiceError> {
    let store = state.require_game_store().await?;

    let waiting: Vec<Game> = store
        .list_games()
        .await?
        .into_iter()
        .filter(|game| game.status == GameStatus::Waiting)
        .filter(|game| before.is_none_or(|cutoff| game.created_at < cutoff))
        .collect();

    let mut closed = 0;
    for lobby in waiting {
        let result = txn::with_game(&store, &lobby.id, |game| {
            if game.status != GameStatus::Waiting {
                return Ok(Mutation::Keep(false));
            }
            game.finish(Some(BULK_CLEANUP_REASON), clock::now());
            Ok(Mutation::Write(true))
        })
        .await;
        match result {
            Ok((_, true)) => closed += 1,
            Ok((_, false)) => {}
            Err(err) => warn!(game_id = %lobby.id, error = %err, "failed to clean up lobby"),
        }
    }

    info!(closed, "lobby cleanup complete");
    Ok(closed)
}

fn ensure_not_finished(game: &Game) -> Result<(), ServiceError> {
    if game.status == GameStatus::Finished {
        return Err(ServiceError::InvalidState(
            "Game is already finished".into(),
        ));
    }
    Ok(())
}

/// Capacity-checked roster append shared by direct join and approval.
fn add_player(game: &mut Game, player_id: &str, player_name: &str) -> Result<(), ServiceError> {
    if game.is_full() {
        return Err(ServiceError::InvalidState("Game is full".into()));
    }
    game.players.push(Player {
        id: player_id.to_owned(),
        name: player_name.to_owned(),
    });
    game.touch(clock::now());
    Ok(())
}

fn required_identity(
    player_id: &str,
    player_name: &str,
) -> Result<(String, String), ServiceError> {
    let player_id = player_id.trim();
    if player_id.is_empty() {
        return Err(ServiceError::InvalidInput("playerId is required".into()));
    }
    let player_name = player_name.trim();
    if player_name.is_empty() {
        return Err(ServiceError::InvalidInput("playerName is required".into()));
    }
    Ok((player_id.to_owned(), player_name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::game_store::GameStore, state::test_support::memory_state};
    use time::Duration;

    fn host_params() -> CreateGameParams {
        CreateGameParams {
            host_id: Some("host-1".into()),
            host_name: Some("Ada".into()),
            ..CreateGameParams::default()
        }
    }

    async fn multi_game(state: &SharedState) -> Game {
        create_game(state, GameMode::Multi, host_params(), Some("a haunted train"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_seats_host_and_generates_opening_prompt() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;
        assert_eq!(game.players.len(), 1);
        assert_eq!(game.current_player_id.as_deref(), Some("host-1"));
        assert!(game.initial_prompt.contains("a haunted train"));
        assert_eq!(game.display_prompt(), Some(game.initial_prompt.as_str()));
    }

    #[tokio::test]
    async fn approval_flow_adds_the_player() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;

        let game = request_join(&state, &game.id, "p2", "Brin").await.unwrap();
        assert_eq!(game.pending_requests.len(), 1);

        // Re-request is idempotent.
        let game = request_join(&state, &game.id, "p2", "Brin").await.unwrap();
        assert_eq!(game.pending_requests.len(), 1);

        let game = review_join(&state, &game.id, "host-1", "p2", true)
            .await
            .unwrap();
        assert!(game.pending_requests.is_empty());
        assert_eq!(game.players.len(), 2);
        assert_eq!(game.players[1].name, "Brin");
    }

    #[tokio::test]
    async fn denial_only_removes_the_request() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;
        request_join(&state, &game.id, "p2", "Brin").await.unwrap();

        let game = review_join(&state, &game.id, "host-1", "p2", false)
            .await
            .unwrap();
        assert!(game.pending_requests.is_empty());
        assert_eq!(game.players.len(), 1);
    }

    #[tokio::test]
    async fn review_requires_the_host() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;
        request_join(&state, &game.id, "p2", "Brin").await.unwrap();

        let err = review_join(&state, &game.id, "p2", "p2", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn review_of_missing_request_is_not_found() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;
        let err = review_join(&state, &game.id, "host-1", "ghost", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn request_join_on_full_lobby_fails_without_mutation() {
        let (state, _) = memory_state().await;
        let mut params = host_params();
        params.max_players = Some(2.0);
        let game = create_game(&state, GameMode::Multi, params, None)
            .await
            .unwrap();
        request_join(&state, &game.id, "p2", "Brin").await.unwrap();
        review_join(&state, &game.id, "host-1", "p2", true)
            .await
            .unwrap();

        let err = request_join(&state, &game.id, "p3", "Cleo")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(ref m) if m == "Game is full"));

        let game = get_state(&state, &game.id).await.unwrap();
        assert!(game.pending_requests.is_empty());
        assert_eq!(game.players.len(), 2);
    }

    #[tokio::test]
    async fn approval_never_exceeds_capacity() {
        let (state, _) = memory_state().await;
        let mut params = host_params();
        params.max_players = Some(2.0);
        let game = create_game(&state, GameMode::Multi, params, None)
            .await
            .unwrap();
        request_join(&state, &game.id, "p2", "Brin").await.unwrap();
        request_join(&state, &game.id, "p3", "Cleo").await.unwrap();
        review_join(&state, &game.id, "host-1", "p2", true)
            .await
            .unwrap();

        let err = review_join(&state, &game.id, "host-1", "p3", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(ref m) if m == "Game is full"));

        // The failed approval left the request in place.
        let game = get_state(&state, &game.id).await.unwrap();
        assert_eq!(game.players.len(), 2);
        assert_eq!(game.pending_requests.len(), 1);
    }

    #[tokio::test]
    async fn start_requires_two_players_in_multi() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;
        let err = start_game(&state, &game.id, "host-1").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        request_join(&state, &game.id, "p2", "Brin").await.unwrap();
        review_join(&state, &game.id, "host-1", "p2", true)
            .await
            .unwrap();
        let game = start_game(&state, &game.id, "host-1").await.unwrap();
        assert_eq!(game.status, GameStatus::Active);
        assert!(game.turn_deadline.is_some());

        // Starting again is idempotent.
        let again = start_game(&state, &game.id, "host-1").await.unwrap();
        assert_eq!(again.status, GameStatus::Active);
        assert_eq!(again.version, game.version);
    }

    #[tokio::test]
    async fn abandon_is_host_only_and_idempotent() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;

        let err = abandon_game(&state, &game.id, "p2").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let game = abandon_game(&state, &game.id, "host-1").await.unwrap();
        assert_eq!(game.status, GameStatus::Finished);
        assert_eq!(game.ended_reason.as_deref(), Some("abandoned"));
        assert!(game.current_player_id.is_none());
        assert!(game.turn_deadline.is_none());
        assert!(game.scores.is_none());

        let again = abandon_game(&state, &game.id, "host-1").await.unwrap();
        assert_eq!(again.version, game.version);
    }

    #[tokio::test]
    async fn get_state_finishes_an_expired_rapid_game() {
        let (state, store) = memory_state().await;
        let game = create_game(&state, GameMode::Rapid, host_params(), None)
            .await
            .unwrap();

        // Back-date the deadline to simulate an elapsed timer.
        let mut stored = store.find_game(&game.id).await.unwrap().unwrap();
        stored.turn_deadline = Some(clock::now() - Duration::seconds(5));
        let version = stored.version;
        stored.version += 1;
        assert!(store.replace_game(stored, version).await.unwrap());

        let observed = get_state(&state, &game.id).await.unwrap();
        assert_eq!(observed.status, GameStatus::Finished);
        assert_eq!(observed.ended_reason.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn list_open_lobbies_excludes_and_closes_stale_ones() {
        let (state, store) = memory_state().await;
        let fresh = multi_game(&state).await;
        let stale = multi_game(&state).await;

        let mut stored = store.find_game(&stale.id).await.unwrap().unwrap();
        stored.updated_at = clock::now() - Duration::hours(2);
        let version = stored.version;
        stored.version += 1;
        assert!(store.replace_game(stored, version).await.unwrap());

        let lobbies = list_open_lobbies(&state).await.unwrap();
        assert_eq!(lobbies.len(), 1);
        assert_eq!(lobbies[0].id, fresh.id);

        // Give the background closer a chance to run.
        tokio::task::yield_now().await;
        let closed = get_state(&state, &stale.id).await.unwrap();
        assert_eq!(closed.status, GameStatus::Finished);
        assert_eq!(closed.ended_reason.as_deref(), Some("stale_cleanup"));
    }

    #[tokio::test]
    async fn cleanup_closes_waiting_lobbies_and_counts_them() {
        let (state, _) = memory_state().await;
        let first = multi_game(&state).await;
        let second = multi_game(&state).await;
        // An active game must be untouched.
        let rapid = create_game(&state, GameMode::Rapid, host_params(), None)
            .await
            .unwrap();

        let closed = cleanup_lobbies(&state, None).await.unwrap();
        assert_eq!(closed, 2);

        for id in [&first.id, &second.id] {
            let game = get_state(&state, id).await.unwrap();
            assert_eq!(game.status, GameStatus::Finished);
            assert_eq!(game.ended_reason.as_deref(), Some("cleanup"));
        }
        let rapid = get_state(&state, &rapid.id).await.unwrap();
        assert_eq!(rapid.status, GameStatus::Active);
    }

    #[tokio::test]
    async fn cleanup_respects_the_cutoff() {
        let (state, _) = memory_state().await;
        let _lobby = multi_game(&state).await;
        let closed = cleanup_lobbies(&state, Some(clock::now() - Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(closed, 0);
    }

    #[tokio::test]
    async fn direct_join_of_approval_lobby_is_rejected() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;
        let err = join_game(&state, &game.id, "p2", "Brin").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(ref m)
            if m == "This game requires host approval to join"));
    }

    #[tokio::test]
    async fn direct_join_is_idempotent_for_members() {
        let (state, _) = memory_state().await;
        let game = multi_game(&state).await;
        // The host re-joining is a no-op rather than an error.
        let joined = join_game(&state, &game.id, "host-1", "Ada").await.unwrap();
        assert_eq!(joined.players.len(), 1);
        assert_eq!(joined.version, game.version);
    }
}
