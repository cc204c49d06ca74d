/// Persistence abstraction and its backends.
pub mod game_store;
/// Documents shared across storage backends.
pub mod models;
/// Backend-agnostic storage errors.
pub mod storage;
