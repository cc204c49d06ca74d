/// Game aggregate and mode policy.
pub mod game;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    config::AppConfig,
    dao::game_store::GameStore,
    error::ServiceError,
    llm::{JudgeClient, PromptClient},
};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state holding the storage backend handle, the
/// collaborator clients, and the runtime configuration.
pub struct AppState {
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    prompt: PromptClient,
    judge: JudgeClient,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply. The application starts in degraded mode until a storage
    /// backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let prompt = PromptClient::new(
            config.prompt_service_url.clone(),
            config.collaborator_timeout,
        );
        let judge = JudgeClient::new(
            config.judge_service_url.clone(),
            config.collaborator_timeout,
        );
        Arc::new(Self {
            game_store: RwLock::new(None),
            prompt,
            judge,
            config,
        })
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the game store or fail with the degraded-mode error.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        let mut guard = self.game_store.write().await;
        *guard = Some(store);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        let mut guard = self.game_store.write().await;
        guard.take();
    }

    /// Whether the application currently has no storage backend.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.game_store.read().await;
        guard.is_none()
    }

    /// Prompt-generation collaborator client.
    pub fn prompt(&self) -> &PromptClient {
        &self.prompt
    }

    /// Scoring-judge collaborator client.
    pub fn judge(&self) -> &JudgeClient {
        &self.judge
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::{AppState, SharedState};
    use crate::{config::AppConfig, dao::game_store::memory::MemoryGameStore};

    /// State backed by a fresh in-memory store and offline collaborators.
    pub async fn memory_state() -> (SharedState, MemoryGameStore) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryGameStore::new();
        state.install_game_store(Arc::new(store.clone())).await;
        (state, store)
    }
}
