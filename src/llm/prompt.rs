//! Client for the prompt-generation collaborator.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// Seed premise used when the caller supplies none.
const DEFAULT_SEED: &str = "An unexpected letter arrives at the door.";

/// Rotation of fallback instructions used when the remote service is
/// unconfigured or unreachable. Selection is keyed off the turn number, so
/// identical inputs always produce the identical prompt.
const FALLBACK_PROMPTS: [&str; 6] = [
    "Introduce a new character who changes everything.",
    "Reveal something surprising about the setting.",
    "Raise the stakes with an unexpected obstacle.",
    "Let a secret slip out, on purpose or not.",
    "Shift the scene somewhere no one expected.",
    "Bring back a detail from earlier in the story.",
];

/// Inputs for generating the next guide prompt mid-game.
#[derive(Debug)]
pub struct PromptContext<'a> {
    /// Full story accumulated so far.
    pub story_so_far: &'a str,
    /// Text of the turn just committed.
    pub last_turn_text: &'a str,
    /// The prompt that turn was responding to.
    pub previous_prompt: &'a str,
    /// Order of the upcoming turn.
    pub turn_number: u32,
    /// Opening instruction the game started from.
    pub initial_prompt: &'a str,
}

/// Prompt-generation collaborator with a deterministic local fallback.
#[derive(Clone)]
pub struct PromptClient {
    http: Option<Client>,
    endpoint: Option<String>,
}

#[derive(Deserialize)]
struct PromptResponse {
    prompt: String,
}

impl PromptClient {
    /// Build a client. With no endpoint every call resolves locally.
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        let http = match Client::builder().timeout(timeout).build() {
            Ok(client) => Some(client),
            Err(err) => {
                warn!(error = %err, "failed to build prompt HTTP client; using local fallback only");
                None
            }
        };
        Self { http, endpoint }
    }

    /// Generate the opening instruction from the caller-supplied seed text.
    pub async fn opening_prompt(&self, seed: Option<&str>) -> String {
        let seed = seed
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_SEED);

        let payload = json!({ "kind": "opening", "seed": seed });
        match self.call_remote(&payload).await {
            Some(prompt) => prompt,
            None => format!("Start the story: {seed}"),
        }
    }

    /// Generate the guide prompt for the upcoming turn.
    pub async fn next_prompt(&self, context: &PromptContext<'_>) -> String {
        let payload = json!({
            "kind": "next",
            "story_so_far": context.story_so_far,
            "last_turn_text": context.last_turn_text,
            "previous_prompt": context.previous_prompt,
            "turn_number": context.turn_number,
            "initial_prompt": context.initial_prompt,
        });
        match self.call_remote(&payload).await {
            Some(prompt) => prompt,
            None => fallback_prompt(context.turn_number),
        }
    }

    async fn call_remote(&self, payload: &serde_json::Value) -> Option<String> {
        let endpoint = self.endpoint.as_deref()?;
        let http = self.http.as_ref()?;

        let response = http
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "prompt service call failed; using local fallback");
                return None;
            }
        };

        match response.json::<PromptResponse>().await {
            Ok(body) if !body.prompt.trim().is_empty() => Some(body.prompt.trim().to_owned()),
            Ok(_) => {
                warn!("prompt service returned an empty prompt; using local fallback");
                None
            }
            Err(err) => {
                warn!(error = %err, "prompt service returned malformed payload; using local fallback");
                None
            }
        }
    }
}

fn fallback_prompt(turn_number: u32) -> String {
    let index = turn_number.saturating_sub(1) as usize % FALLBACK_PROMPTS.len();
    FALLBACK_PROMPTS[index].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> PromptClient {
        PromptClient::new(None, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn opening_prompt_embeds_the_seed() {
        let prompt = offline_client()
            .opening_prompt(Some("  a lighthouse at the end of time  "))
            .await;
        assert_eq!(prompt, "Start the story: a lighthouse at the end of time");
    }

    #[tokio::test]
    async fn blank_seed_falls_back_to_the_default_premise() {
        let prompt = offline_client().opening_prompt(Some("   ")).await;
        assert!(prompt.contains(DEFAULT_SEED));
    }

    #[tokio::test]
    async fn fallback_prompts_are_deterministic_per_turn() {
        let client = offline_client();
        let context = PromptContext {
            story_so_far: "Once upon a time.",
            last_turn_text: "Once upon a time.",
            previous_prompt: "Start the story.",
            turn_number: 2,
            initial_prompt: "Start the story.",
        };
        let first = client.next_prompt(&context).await;
        let second = client.next_prompt(&context).await;
        assert_eq!(first, second);
        assert_eq!(first, FALLBACK_PROMPTS[1]);
    }
}
