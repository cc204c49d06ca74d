//! Outbound collaborator clients.
//!
//! Both collaborators are best-effort: every call carries a bounded timeout
//! and falls back to deterministic local output, so no game transaction is
//! ever left pending on a remote service.

/// Scoring judge for finished games.
pub mod judge;
/// Guide-prompt generation.
pub mod prompt;

pub use judge::JudgeClient;
pub use prompt::{PromptClient, PromptContext};
