/// Post-finish scoring, history, and leaderboard pipeline.
pub mod completion_service;
/// OpenAPI documentation aggregation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Lobby membership, lifecycle, and cleanup operations.
pub mod lobby_service;
/// The turn engine.
pub mod turn_service;
/// Optimistic read-modify-write helper for the game document.
pub(crate) mod txn;
