use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("{0}")]
    InvalidInput(String),
    /// Requested resource was not found.
    #[error("{0}")]
    NotFound(String),
    /// Caller lacks the identity required for the operation.
    #[error("{0}")]
    Forbidden(String),
    /// Operation cannot be performed in the current state.
    #[error("{0}")]
    InvalidState(String),
    /// A turn was submitted by a player whose turn it is not.
    #[error("Not your turn")]
    NotYourTurn {
        /// Name of the player whose turn it actually is.
        current_player: Option<String>,
    },
    /// A turn arrived after its deadline elapsed.
    #[error("Turn timed out")]
    TurnTimeout {
        /// True when the timeout finished the game (rapid mode).
        finished: bool,
        /// Player who missed the deadline.
        timed_out_player: Option<String>,
        /// Player whose turn it is after the rotation.
        next_player: Option<String>,
    },
    /// Optimistic-concurrency retries were exhausted without a clean write.
    #[error("Game is being updated concurrently, try again")]
    Contention,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input or invalid game state.
    #[error("{0}")]
    BadRequest(String),
    /// Caller is not allowed to perform the operation.
    #[error("{message}")]
    Forbidden {
        /// Client-facing error message.
        message: String,
        /// Whose turn it actually is, when the rejection is turn-order based.
        current_player: Option<String>,
    },
    /// Requested resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Submission conflicted with an elapsed deadline or a concurrent writer.
    #[error("{message}")]
    Conflict {
        /// Client-facing error message.
        message: String,
        /// True when the conflict finished the game (rapid-mode timeout).
        finished: Option<bool>,
        /// Player who missed the deadline, when the conflict is a timeout.
        timed_out_player: Option<String>,
        /// Player whose turn it is after the timeout rotation.
        next_player: Option<String>,
    },
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) | ServiceError::InvalidState(message) => {
                AppError::BadRequest(message)
            }
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Forbidden(message) => AppError::Forbidden {
                message,
                current_player: None,
            },
            ServiceError::NotYourTurn { current_player } => AppError::Forbidden {
                message: "Not your turn".into(),
                current_player,
            },
            ServiceError::TurnTimeout {
                finished,
                timed_out_player,
                next_player,
            } => AppError::Conflict {
                message: "Turn timed out".into(),
                finished: Some(finished),
                timed_out_player,
                next_player,
            },
            ServiceError::Contention => AppError::Conflict {
                message: "Game is being updated concurrently, try again".into(),
                finished: None,
                timed_out_player: None,
                next_player: None,
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_player: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timed_out_player: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_player: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
            current_player: None,
            finished: None,
            timed_out_player: None,
            next_player: None,
        };

        match self {
            AppError::Forbidden { current_player, .. } => {
                body.current_player = current_player;
            }
            AppError::Conflict {
                finished,
                timed_out_player,
                next_player,
                ..
            } => {
                body.finished = finished;
                body.timed_out_player = timed_out_player;
                body.next_player = next_player;
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_lobby_maps_to_bad_request() {
        let app: AppError = ServiceError::InvalidState("Game is full".into()).into();
        assert!(matches!(app, AppError::BadRequest(ref m) if m == "Game is full"));
    }

    #[test]
    fn rapid_timeout_carries_finished_flag() {
        let app: AppError = ServiceError::TurnTimeout {
            finished: true,
            timed_out_player: None,
            next_player: None,
        }
        .into();
        match app {
            AppError::Conflict {
                message, finished, ..
            } => {
                assert_eq!(message, "Turn timed out");
                assert_eq!(finished, Some(true));
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }

    #[test]
    fn not_your_turn_names_the_current_player() {
        let app: AppError = ServiceError::NotYourTurn {
            current_player: Some("Ada".into()),
        }
        .into();
        match app {
            AppError::Forbidden {
                message,
                current_player,
            } => {
                assert_eq!(message, "Not your turn");
                assert_eq!(current_player.as_deref(), Some("Ada"));
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
    }
}
