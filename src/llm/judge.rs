//! Client for the scoring-judge collaborator.

use std::time::Duration;

use indexmap::IndexMap;
use reqwest::Client;
use serde_json::json;
use tracing::warn;

use crate::{
    dao::models::{GameScores, PlayerScore, TurnDocument},
    state::game::Game,
};

/// Metric value used for every player when the judge is unavailable.
const PLACEHOLDER_METRIC: f64 = 7.0;

/// Scoring collaborator with deterministic placeholder output.
#[derive(Clone)]
pub struct JudgeClient {
    http: Option<Client>,
    endpoint: Option<String>,
}

impl JudgeClient {
    /// Build a client. With no endpoint every call resolves locally.
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        let http = match Client::builder().timeout(timeout).build() {
            Ok(client) => Some(client),
            Err(err) => {
                warn!(error = %err, "failed to build judge HTTP client; using placeholder scores");
                None
            }
        };
        Self { http, endpoint }
    }

    /// Score a finished game. Synonym metric keys from older judge schemas
    /// are normalized during deserialization; the caller only ever sees the
    /// canonical `creativity`/`cohesion`/`prompt_fit` trio.
    pub async fn score(&self, game: &Game, turns: &[TurnDocument]) -> GameScores {
        match self.call_remote(game, turns).await {
            Some(scores) => scores,
            None => placeholder_scores(game),
        }
    }

    async fn call_remote(&self, game: &Game, turns: &[TurnDocument]) -> Option<GameScores> {
        let endpoint = self.endpoint.as_deref()?;
        let http = self.http.as_ref()?;

        let payload = json!({
            "initial_prompt": game.initial_prompt,
            "story": game.story_so_far,
            "players": game.players.iter().map(|p| &p.name).collect::<Vec<_>>(),
            "turns": turns
                .iter()
                .map(|turn| json!({
                    "order": turn.order,
                    "player": turn.player_name,
                    "text": turn.text,
                    "prompt": turn.prompt_used,
                }))
                .collect::<Vec<_>>(),
        });

        let response = http
            .post(endpoint)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(game_id = %game.id, error = %err, "judge call failed; using placeholder scores");
                return None;
            }
        };

        match response.json::<GameScores>().await {
            Ok(scores) => Some(scores),
            Err(err) => {
                warn!(game_id = %game.id, error = %err, "judge returned malformed payload; using placeholder scores");
                None
            }
        }
    }
}

fn placeholder_scores(game: &Game) -> GameScores {
    let players = game
        .players
        .iter()
        .map(|player| {
            (
                player.name.clone(),
                PlayerScore {
                    creativity: PLACEHOLDER_METRIC,
                    cohesion: PLACEHOLDER_METRIC,
                    prompt_fit: PLACEHOLDER_METRIC,
                    notes: Some("Automatic score; the judge was unavailable.".into()),
                },
            )
        })
        .collect::<IndexMap<_, _>>();

    GameScores {
        players,
        summary: "The story was completed, but no judge was available to review it.".into(),
    }
}
