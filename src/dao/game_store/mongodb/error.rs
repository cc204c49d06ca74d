use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("missing required environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save game `{id}`")]
    SaveGame {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game `{id}`")]
    LoadGame {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list games")]
    ListGames {
        #[source]
        source: MongoError,
    },
    #[error("failed to save turn for game `{game_id}`")]
    SaveTurn {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load turns for game `{game_id}`")]
    LoadTurns {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save leaderboard entry for `{user_id}`")]
    SaveLeaderboardEntry {
        user_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load leaderboard")]
    LoadLeaderboard {
        #[source]
        source: MongoError,
    },
    #[error("failed to trim leaderboard")]
    TrimLeaderboard {
        #[source]
        source: MongoError,
    },
    #[error("failed to save history for user `{user_id}`")]
    SaveHistory {
        user_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load history for user `{user_id}`")]
    LoadHistory {
        user_id: String,
        #[source]
        source: MongoError,
    },
}
