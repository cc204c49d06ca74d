//! Library crate for taleweave-back, exposing modules for the binary and integration tests.

/// Single source of wall-clock time and deadline arithmetic.
pub mod clock;
mod config;
pub mod dao;
mod dto;
mod error;
/// Collaborator clients for prompt generation and judging.
pub mod llm;
pub mod routes;
pub mod services;
pub mod state;

pub use config::AppConfig;
