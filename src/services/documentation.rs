use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for TaleWeave Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::create_game,
        crate::routes::game::list_lobbies,
        crate::routes::game::cleanup_lobbies,
        crate::routes::game::get_state,
        crate::routes::game::join_game,
        crate::routes::game::request_join,
        crate::routes::game::review_join,
        crate::routes::game::start_game,
        crate::routes::game::abandon_game,
        crate::routes::turn::submit_turn,
        crate::routes::turn::preview_turn,
        crate::routes::leaderboard::leaderboard,
        crate::routes::leaderboard::user_history,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::JoinRequest,
            crate::dto::game::ReviewJoinRequest,
            crate::dto::game::HostActionRequest,
            crate::dto::game::SubmitTurnRequest,
            crate::dto::game::CleanupRequest,
            crate::dto::game::CleanupResponse,
            crate::dto::game::GameView,
            crate::dto::game::LobbyListResponse,
            crate::dto::game::SubmitTurnResponse,
            crate::dto::game::PreviewResponse,
            crate::dto::leaderboard::LeaderboardResponse,
            crate::dto::leaderboard::UserHistoryResponse,
            crate::dao::models::SavedGameSummary,
            crate::dao::models::GameScores,
            crate::dao::models::PlayerScore,
            crate::dao::models::TurnSummary,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "lobby", description = "Lobby lifecycle and membership"),
        (name = "turns", description = "Turn submission and preview"),
        (name = "leaderboard", description = "Rankings and saved-game history"),
    )
)]
pub struct ApiDoc;
