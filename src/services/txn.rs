//! Optimistic read-modify-write loop around the game document.
//!
//! Every state-changing operation re-reads the latest committed state,
//! re-validates its preconditions against it, and commits with a conditional
//! write. A conflicting writer makes the conditional write miss, in which
//! case the whole load/validate/compute cycle runs again.

use std::sync::Arc;

use tracing::debug;

use crate::{dao::game_store::GameStore, error::ServiceError, state::game::Game};

/// Attempts before giving up on a contended document.
pub(crate) const MAX_TXN_ATTEMPTS: u32 = 5;

/// What a mutation closure decided to do with the loaded game.
pub(crate) enum Mutation<T> {
    /// Persist the mutated game.
    Write(T),
    /// Return without writing (idempotent no-op paths).
    Keep(T),
}

/// Run `mutate` against the latest committed state of the game, retrying on
/// write conflicts. Errors from `mutate` abort without persisting anything.
pub(crate) async fn with_game<T, F>(
    store: &Arc<dyn GameStore>,
    game_id: &str,
    mut mutate: F,
) -> Result<(Game, T), ServiceError>
where
    F: FnMut(&mut Game) -> Result<Mutation<T>, ServiceError>,
{
    for attempt in 1..=MAX_TXN_ATTEMPTS {
        let Some(mut game) = store.find_game(game_id).await? else {
            return Err(ServiceError::NotFound("Game not found".into()));
        };

        let expected = game.version;
        match mutate(&mut game)? {
            Mutation::Keep(value) => return Ok((game, value)),
            Mutation::Write(value) => {
                game.version = expected + 1;
                if store.replace_game(game.clone(), expected).await? {
                    return Ok((game, value));
                }
                debug!(game_id, attempt, "conditional write conflicted; retrying");
            }
        }
    }

    Err(ServiceError::Contention)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock,
        dao::game_store::memory::MemoryGameStore,
        state::game::{CreateGameParams, GameMode},
    };

    fn sample_game() -> Game {
        Game::create(
            GameMode::Multi,
            CreateGameParams {
                host_id: Some("h1".into()),
                host_name: Some("Ada".into()),
                ..CreateGameParams::default()
            },
            "Begin.".into(),
            clock::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn missing_game_is_not_found() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
        let result = with_game(&store, "nope", |_| Ok(Mutation::Write(()))).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn write_bumps_the_version() {
        let memory = MemoryGameStore::new();
        let store: Arc<dyn GameStore> = Arc::new(memory);
        let game = sample_game();
        let id = game.id.clone();
        store.insert_game(game).await.unwrap();

        let (updated, ()) = with_game(&store, &id, |game| {
            game.max_turns = 7;
            Ok(Mutation::Write(()))
        })
        .await
        .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(store.find_game(&id).await.unwrap().unwrap().max_turns, 7);
    }

    #[tokio::test]
    async fn keep_leaves_the_stored_document_untouched() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
        let game = sample_game();
        let id = game.id.clone();
        store.insert_game(game).await.unwrap();

        let (_, ()) = with_game(&store, &id, |game| {
            game.max_turns = 99;
            Ok(Mutation::Keep(()))
        })
        .await
        .unwrap();
        assert_eq!(store.find_game(&id).await.unwrap().unwrap().max_turns, 5);
    }

    #[tokio::test]
    async fn conflicting_writer_triggers_revalidation() {
        let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
        let game = sample_game();
        let id = game.id.clone();
        store.insert_game(game.clone()).await.unwrap();

        // Simulate a writer sneaking in between our read and write on the
        // first attempt only.
        let mut raced = false;
        let store_for_race = store.clone();
        let (updated, ()) = with_game(&store, &id, move |current| {
            if !raced {
                raced = true;
                let mut rival = current.clone();
                rival.version += 1;
                rival.max_turns = 10;
                let store = store_for_race.clone();
                let expected = current.version;
                let _ = futures::executor::block_on(store.replace_game(rival, expected));
            }
            current.turn_duration_seconds = 120;
            Ok(Mutation::Write(()))
        })
        .await
        .unwrap();

        // The retry re-read the rival's committed state before writing.
        assert_eq!(updated.max_turns, 10);
        assert_eq!(updated.turn_duration_seconds, 120);
        assert_eq!(updated.version, 2);
    }
}
