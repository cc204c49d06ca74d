pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{LeaderboardEntry, TurnDocument, UserHistoryDocument};
use crate::dao::storage::StorageResult;
use crate::state::game::Game;

/// Abstraction over the persistence layer for games, turns, the leaderboard,
/// and per-user saved-game history.
///
/// Game and leaderboard writes use optimistic concurrency: `replace_*` takes
/// the version the caller read and returns `false` when another writer got
/// there first, in which case the caller re-reads and re-validates.
pub trait GameStore: Send + Sync {
    /// Insert a freshly created game document.
    fn insert_game(&self, game: Game) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a game by id.
    fn find_game(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Game>>>;
    /// Conditionally replace a game; `false` means the stored version no
    /// longer matches `expected_version`.
    fn replace_game(
        &self,
        game: Game,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Waiting multi-mode lobbies, newest first, bounded. Backends without the
    /// required index may fail; callers fall back to [`GameStore::list_games`].
    fn list_waiting_lobbies(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<Game>>>;
    /// Every stored game. Full-scan path for cleanup and listing fallback.
    fn list_games(&self) -> BoxFuture<'static, StorageResult<Vec<Game>>>;
    /// Commit a turn together with its game: conditionally replace the game
    /// on `expected_version` and record the turn in the same operation.
    /// `false` means the stored version no longer matches and nothing new is
    /// observable.
    fn commit_turn(
        &self,
        game: Game,
        expected_version: u64,
        turn: TurnDocument,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// All turns of a game, ordered by `order`.
    fn list_turns(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Vec<TurnDocument>>>;
    /// Load a leaderboard entry by user id.
    fn find_leaderboard_entry(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<LeaderboardEntry>>>;
    /// Conditionally upsert a leaderboard entry. `expected_version: None`
    /// inserts only when absent; `Some(v)` replaces only when the stored
    /// version matches.
    fn replace_leaderboard_entry(
        &self,
        entry: LeaderboardEntry,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// All leaderboard entries, best `top_score` first.
    fn list_leaderboard(&self) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntry>>>;
    /// Batched removal used by the leaderboard trim.
    fn delete_leaderboard_entries(
        &self,
        user_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load a user's saved-game history document.
    fn find_user_history(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<UserHistoryDocument>>>;
    /// Replace a user's saved-game history document.
    fn save_user_history(
        &self,
        history: UserHistoryDocument,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Backend connectivity probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}
