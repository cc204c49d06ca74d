//! Application-level configuration resolved from the environment at startup.

use std::{env, time::Duration};

use tracing::{info, warn};

/// Default timeout applied to outbound prompt/judge calls.
const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 8;
/// Default page size when listing open lobbies.
const DEFAULT_LOBBY_PAGE_LIMIT: usize = 20;
/// Default inactivity window after which a waiting lobby is considered stale.
const DEFAULT_STALE_LOBBY_MINUTES: u64 = 30;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Remote prompt-generation endpoint; `None` keeps the local fallback.
    pub prompt_service_url: Option<String>,
    /// Remote scoring-judge endpoint; `None` keeps the placeholder scores.
    pub judge_service_url: Option<String>,
    /// Timeout for each outbound collaborator call.
    pub collaborator_timeout: Duration,
    /// Maximum number of lobbies returned by the open-lobby listing.
    pub lobby_page_limit: usize,
    /// Inactivity window after which a waiting lobby is auto-closed.
    pub stale_lobby_window: Duration,
}

impl AppConfig {
    /// Read the configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn load() -> Self {
        let prompt_service_url = non_empty_var("PROMPT_SERVICE_URL");
        let judge_service_url = non_empty_var("JUDGE_SERVICE_URL");

        if prompt_service_url.is_none() {
            info!("PROMPT_SERVICE_URL unset; using local fallback prompts");
        }
        if judge_service_url.is_none() {
            info!("JUDGE_SERVICE_URL unset; using placeholder scoring");
        }

        Self {
            prompt_service_url,
            judge_service_url,
            collaborator_timeout: Duration::from_secs(parsed_var(
                "COLLABORATOR_TIMEOUT_SECS",
                DEFAULT_COLLABORATOR_TIMEOUT_SECS,
            )),
            lobby_page_limit: parsed_var("LOBBY_PAGE_LIMIT", DEFAULT_LOBBY_PAGE_LIMIT),
            stale_lobby_window: Duration::from_secs(
                parsed_var("STALE_LOBBY_MINUTES", DEFAULT_STALE_LOBBY_MINUTES) * 60,
            ),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            prompt_service_url: None,
            judge_service_url: None,
            collaborator_timeout: Duration::from_secs(DEFAULT_COLLABORATOR_TIMEOUT_SECS),
            lobby_page_limit: DEFAULT_LOBBY_PAGE_LIMIT,
            stale_lobby_window: Duration::from_secs(DEFAULT_STALE_LOBBY_MINUTES * 60),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var = name, value = %raw, "unparsable value; using default");
            default
        }),
        Err(_) => default,
    }
}
