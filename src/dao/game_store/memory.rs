//! In-memory [`GameStore`] backend.
//!
//! Used when no MongoDB is configured and by the service-level tests. Data
//! does not survive a restart, but the optimistic-concurrency contract is the
//! same as the MongoDB backend's.

use std::sync::Arc;

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};

use crate::{
    dao::{
        game_store::GameStore,
        models::{LeaderboardEntry, TurnDocument, UserHistoryDocument},
        storage::StorageResult,
    },
    state::game::{Game, GameMode, GameStatus},
};

#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    games: DashMap<String, Game>,
    turns: DashMap<String, Vec<TurnDocument>>,
    leaderboard: DashMap<String, LeaderboardEntry>,
    histories: DashMap<String, UserHistoryDocument>,
}

impl MemoryGameStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameStore for MemoryGameStore {
    fn insert_game(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move {
            inner.games.insert(game.id.clone(), game);
            Ok(())
        }
        .boxed()
    }

    fn find_game(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let inner = self.inner.clone();
        let id = id.to_owned();
        async move { Ok(inner.games.get(&id).map(|entry| entry.clone())) }.boxed()
    }

    fn replace_game(
        &self,
        game: Game,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        async move {
            // The entry lock makes the version check and the write atomic.
            match inner.games.entry(game.id.clone()) {
                dashmap::Entry::Occupied(mut occupied) => {
                    if occupied.get().version != expected_version {
                        return Ok(false);
                    }
                    occupied.insert(game);
                    Ok(true)
                }
                dashmap::Entry::Vacant(_) => Ok(false),
            }
        }
        .boxed()
    }

    fn list_waiting_lobbies(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
        let inner = self.inner.clone();
        async move {
            let mut lobbies: Vec<Game> = inner
                .games
                .iter()
                .filter(|entry| {
                    entry.status == GameStatus::Waiting && entry.mode == GameMode::Multi
                })
                .map(|entry| entry.clone())
                .collect();
            lobbies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            lobbies.truncate(limit);
            Ok(lobbies)
        }
        .boxed()
    }

    fn list_games(&self) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
        let inner = self.inner.clone();
        async move {
            Ok(inner
                .games
                .iter()
                .map(|entry| entry.clone())
                .collect::<Vec<_>>())
        }
        .boxed()
    }

    fn commit_turn(
        &self,
        game: Game,
        expected_version: u64,
        turn: TurnDocument,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        async move {
            // The games entry lock covers both writes, so a reader never
            // observes the committed game without its turn record.
            match inner.games.entry(game.id.clone()) {
                dashmap::Entry::Occupied(mut occupied) => {
                    if occupied.get().version != expected_version {
                        return Ok(false);
                    }
                    occupied.insert(game);
                    let mut turns = inner.turns.entry(turn.game_id.clone()).or_default();
                    match turns.iter_mut().find(|stored| stored.order == turn.order) {
                        Some(slot) => *slot = turn,
                        None => turns.push(turn),
                    }
                    Ok(true)
                }
                dashmap::Entry::Vacant(_) => Ok(false),
            }
        }
        .boxed()
    }

    fn list_turns(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Vec<TurnDocument>>> {
        let inner = self.inner.clone();
        let game_id = game_id.to_owned();
        async move {
            let mut turns = inner
                .turns
                .get(&game_id)
                .map(|entry| entry.clone())
                .unwrap_or_default();
            turns.sort_by_key(|turn| turn.order);
            Ok(turns)
        }
        .boxed()
    }

    fn find_leaderboard_entry(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<LeaderboardEntry>>> {
        let inner = self.inner.clone();
        let user_id = user_id.to_owned();
        async move { Ok(inner.leaderboard.get(&user_id).map(|entry| entry.clone())) }.boxed()
    }

    fn replace_leaderboard_entry(
        &self,
        entry: LeaderboardEntry,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        async move {
            match (inner.leaderboard.entry(entry.user_id.clone()), expected_version) {
                (dashmap::Entry::Vacant(vacant), None) => {
                    vacant.insert(entry);
                    Ok(true)
                }
                (dashmap::Entry::Occupied(mut occupied), Some(expected)) => {
                    if occupied.get().version != expected {
                        return Ok(false);
                    }
                    occupied.insert(entry);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
        .boxed()
    }

    fn list_leaderboard(&self) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntry>>> {
        let inner = self.inner.clone();
        async move {
            let mut entries: Vec<LeaderboardEntry> = inner
                .leaderboard
                .iter()
                .map(|entry| entry.clone())
                .collect();
            entries.sort_by(|a, b| {
                b.top_score
                    .partial_cmp(&a.top_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(entries)
        }
        .boxed()
    }

    fn delete_leaderboard_entries(
        &self,
        user_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move {
            for user_id in user_ids {
                inner.leaderboard.remove(&user_id);
            }
            Ok(())
        }
        .boxed()
    }

    fn find_user_history(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<UserHistoryDocument>>> {
        let inner = self.inner.clone();
        let user_id = user_id.to_owned();
        async move { Ok(inner.histories.get(&user_id).map(|entry| entry.clone())) }.boxed()
    }

    fn save_user_history(
        &self,
        history: UserHistoryDocument,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        async move {
            inner.histories.insert(history.user_id.clone(), history);
            Ok(())
        }
        .boxed()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        async move { Ok(()) }.boxed()
    }
}
