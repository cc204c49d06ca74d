use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
};
use crate::{
    dao::{
        game_store::GameStore,
        models::{LeaderboardEntry, TurnDocument, UserHistoryDocument},
        storage::StorageResult,
    },
    state::game::Game,
};

const GAME_COLLECTION_NAME: &str = "games";
const TURN_COLLECTION_NAME: &str = "turns";
const LEADERBOARD_COLLECTION_NAME: &str = "leaderboard";
const HISTORY_COLLECTION_NAME: &str = "user_histories";

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let games = database.collection::<mongodb::bson::Document>(GAME_COLLECTION_NAME);
        let game_id_index = mongodb::IndexModel::builder()
            .keys(doc! {"id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("game_id_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        games
            .create_index(game_id_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: GAME_COLLECTION_NAME,
                index: "id",
                source,
            })?;

        // Serves the open-lobby listing (waiting + multi, newest first).
        let lobby_index = mongodb::IndexModel::builder()
            .keys(doc! {"status": 1, "mode": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("lobby_listing_idx".to_owned()))
                    .build(),
            )
            .build();
        games
            .create_index(lobby_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: GAME_COLLECTION_NAME,
                index: "status,mode,created_at",
                source,
            })?;

        let turns = database.collection::<mongodb::bson::Document>(TURN_COLLECTION_NAME);
        let turn_index = mongodb::IndexModel::builder()
            .keys(doc! {"game_id": 1, "order": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("turn_game_order_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        turns
            .create_index(turn_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: TURN_COLLECTION_NAME,
                index: "game_id,order",
                source,
            })?;

        let leaderboard = database.collection::<mongodb::bson::Document>(LEADERBOARD_COLLECTION_NAME);
        let leaderboard_index = mongodb::IndexModel::builder()
            .keys(doc! {"user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("leaderboard_user_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        leaderboard
            .create_index(leaderboard_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: LEADERBOARD_COLLECTION_NAME,
                index: "user_id",
                source,
            })?;

        let histories = database.collection::<mongodb::bson::Document>(HISTORY_COLLECTION_NAME);
        let history_index = mongodb::IndexModel::builder()
            .keys(doc! {"user_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("history_user_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        histories
            .create_index(history_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: HISTORY_COLLECTION_NAME,
                index: "user_id",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn games(&self) -> Collection<Game> {
        self.database().await.collection::<Game>(GAME_COLLECTION_NAME)
    }

    async fn turns(&self) -> Collection<TurnDocument> {
        self.database()
            .await
            .collection::<TurnDocument>(TURN_COLLECTION_NAME)
    }

    async fn leaderboard(&self) -> Collection<LeaderboardEntry> {
        self.database()
            .await
            .collection::<LeaderboardEntry>(LEADERBOARD_COLLECTION_NAME)
    }

    async fn histories(&self) -> Collection<UserHistoryDocument> {
        self.database()
            .await
            .collection::<UserHistoryDocument>(HISTORY_COLLECTION_NAME)
    }

    /// Reconnect using the stored configuration.
    pub async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(
            &self.inner.config.options,
            &self.inner.config.database_name,
        )
        .await?;
        let mut guard = self.inner.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    async fn ping(&self) -> MongoResult<()> {
        let database = self.database().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn insert_game(&self, game: Game) -> MongoResult<()> {
        let id = game.id.clone();
        self.games()
            .await
            .insert_one(&game)
            .await
            .map_err(|source| MongoDaoError::SaveGame { id, source })?;
        Ok(())
    }

    async fn find_game(&self, id: String) -> MongoResult<Option<Game>> {
        self.games()
            .await
            .find_one(doc! {"id": &id})
            .await
            .map_err(|source| MongoDaoError::LoadGame { id, source })
    }

    async fn replace_game(&self, game: Game, expected_version: u64) -> MongoResult<bool> {
        let id = game.id.clone();
        let result = self
            .games()
            .await
            .replace_one(
                doc! {"id": &id, "version": expected_version as i64},
                &game,
            )
            .await
            .map_err(|source| MongoDaoError::SaveGame { id, source })?;
        Ok(result.matched_count == 1)
    }

    async fn list_waiting_lobbies(&self, limit: usize) -> MongoResult<Vec<Game>> {
        self.games()
            .await
            .find(doc! {"status": "waiting", "mode": "multi"})
            .sort(doc! {"created_at": -1})
            .limit(limit as i64)
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListGames { source })
    }

    async fn list_games(&self) -> MongoResult<Vec<Game>> {
        self.games()
            .await
            .find(doc! {})
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListGames { source })
    }

    async fn commit_turn(
        &self,
        game: Game,
        expected_version: u64,
        turn: TurnDocument,
    ) -> MongoResult<bool> {
        // The turn record goes in first, keyed on the unique
        // (game_id, order) index: a record left behind by a losing CAS
        // attempt is overwritten by the eventual winner of that order, never
        // duplicated, and the game only commits once its turn is durable.
        let game_id = turn.game_id.clone();
        self.turns()
            .await
            .replace_one(
                doc! {"game_id": &turn.game_id, "order": i64::from(turn.order)},
                &turn,
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveTurn { game_id, source })?;
        self.replace_game(game, expected_version).await
    }

    async fn list_turns(&self, game_id: String) -> MongoResult<Vec<TurnDocument>> {
        self.turns()
            .await
            .find(doc! {"game_id": &game_id})
            .sort(doc! {"order": 1})
            .await
            .map_err(|source| MongoDaoError::LoadTurns {
                game_id: game_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadTurns { game_id, source })
    }

    async fn find_leaderboard_entry(
        &self,
        user_id: String,
    ) -> MongoResult<Option<LeaderboardEntry>> {
        self.leaderboard()
            .await
            .find_one(doc! {"user_id": &user_id})
            .await
            .map_err(|source| MongoDaoError::LoadLeaderboard { source })
    }

    async fn replace_leaderboard_entry(
        &self,
        entry: LeaderboardEntry,
        expected_version: Option<u64>,
    ) -> MongoResult<bool> {
        let user_id = entry.user_id.clone();
        let collection = self.leaderboard().await;
        match expected_version {
            None => {
                // Insert-if-absent; the unique index rejects a concurrent
                // insert of the same user.
                match collection.insert_one(&entry).await {
                    Ok(_) => Ok(true),
                    Err(err) if is_duplicate_key(&err) => Ok(false),
                    Err(source) => Err(MongoDaoError::SaveLeaderboardEntry { user_id, source }),
                }
            }
            Some(expected) => {
                let result = collection
                    .replace_one(
                        doc! {"user_id": &user_id, "version": expected as i64},
                        &entry,
                    )
                    .await
                    .map_err(|source| MongoDaoError::SaveLeaderboardEntry { user_id, source })?;
                Ok(result.matched_count == 1)
            }
        }
    }

    async fn list_leaderboard(&self) -> MongoResult<Vec<LeaderboardEntry>> {
        self.leaderboard()
            .await
            .find(doc! {})
            .sort(doc! {"top_score": -1})
            .await
            .map_err(|source| MongoDaoError::LoadLeaderboard { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadLeaderboard { source })
    }

    async fn delete_leaderboard_entries(&self, user_ids: Vec<String>) -> MongoResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        self.leaderboard()
            .await
            .delete_many(doc! {"user_id": {"$in": user_ids}})
            .await
            .map_err(|source| MongoDaoError::TrimLeaderboard { source })?;
        Ok(())
    }

    async fn find_user_history(&self, user_id: String) -> MongoResult<Option<UserHistoryDocument>> {
        self.histories()
            .await
            .find_one(doc! {"user_id": &user_id})
            .await
            .map_err(|source| MongoDaoError::LoadHistory { user_id, source })
    }

    async fn save_user_history(&self, history: UserHistoryDocument) -> MongoResult<()> {
        let user_id = history.user_id.clone();
        self.histories()
            .await
            .replace_one(doc! {"user_id": &user_id}, &history)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveHistory { user_id, source })?;
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    matches!(
        *err.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref write)) if write.code == 11000
    )
}

impl GameStore for MongoGameStore {
    fn insert_game(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_game(game).await.map_err(Into::into) })
    }

    fn find_game(&self, id: &str) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        let id = id.to_owned();
        Box::pin(async move { store.find_game(id).await.map_err(Into::into) })
    }

    fn replace_game(
        &self,
        game: Game,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_game(game, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn list_waiting_lobbies(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
        let store = self.clone();
        Box::pin(async move { store.list_waiting_lobbies(limit).await.map_err(Into::into) })
    }

    fn list_games(&self) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
        let store = self.clone();
        Box::pin(async move { store.list_games().await.map_err(Into::into) })
    }

    fn commit_turn(
        &self,
        game: Game,
        expected_version: u64,
        turn: TurnDocument,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .commit_turn(game, expected_version, turn)
                .await
                .map_err(Into::into)
        })
    }

    fn list_turns(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Vec<TurnDocument>>> {
        let store = self.clone();
        let game_id = game_id.to_owned();
        Box::pin(async move { store.list_turns(game_id).await.map_err(Into::into) })
    }

    fn find_leaderboard_entry(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<LeaderboardEntry>>> {
        let store = self.clone();
        let user_id = user_id.to_owned();
        Box::pin(async move {
            store
                .find_leaderboard_entry(user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn replace_leaderboard_entry(
        &self,
        entry: LeaderboardEntry,
        expected_version: Option<u64>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_leaderboard_entry(entry, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn list_leaderboard(&self) -> BoxFuture<'static, StorageResult<Vec<LeaderboardEntry>>> {
        let store = self.clone();
        Box::pin(async move { store.list_leaderboard().await.map_err(Into::into) })
    }

    fn delete_leaderboard_entries(
        &self,
        user_ids: Vec<String>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_leaderboard_entries(user_ids)
                .await
                .map_err(Into::into)
        })
    }

    fn find_user_history(
        &self,
        user_id: &str,
    ) -> BoxFuture<'static, StorageResult<Option<UserHistoryDocument>>> {
        let store = self.clone();
        let user_id = user_id.to_owned();
        Box::pin(async move { store.find_user_history(user_id).await.map_err(Into::into) })
    }

    fn save_user_history(
        &self,
        history: UserHistoryDocument,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_user_history(history).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
