use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use registry::types::{CandidateId, ElectionId, PositionId};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Outcome of a rejected ballot.
///
/// [`VoteError::LockTimeout`] and [`VoteError::PersistenceFailure`] are
/// transient and worth retrying. Everything else is final for that ballot.
#[derive(Error, Debug)]
pub enum VoteError {
    #[error("Voter {voter} already voted for position {position}")]
    AlreadyVoted { voter: String, position: PositionId },

    #[error("Candidate {candidate} is not running for position {position}")]
    CandidateNotFound {
        candidate: CandidateId,
        position: PositionId,
    },

    #[error("Position {0} not found")]
    PositionNotFound(PositionId),

    #[error("Voter {voter} is not on the roll for position {position}")]
    NotEligible { voter: String, position: PositionId },

    #[error("Election {0} is closed")]
    ElectionClosed(ElectionId),

    #[error("Invalid ballot: {0}")]
    Validation(String),

    #[error("Timed out waiting for candidate {0}, try again later")]
    LockTimeout(CandidateId),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl VoteError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VoteError::LockTimeout(_) | VoteError::PersistenceFailure(_)
        )
    }
}

impl From<rusqlite::Error> for VoteError {
    fn from(error: rusqlite::Error) -> Self {
        VoteError::PersistenceFailure(error.to_string())
    }
}

impl From<redis::RedisError> for VoteError {
    fn from(error: redis::RedisError) -> Self {
        VoteError::PersistenceFailure(error.to_string())
    }
}

impl From<tokio::task::JoinError> for VoteError {
    fn from(error: tokio::task::JoinError) -> Self {
        VoteError::PersistenceFailure(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Missing voter identity")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Vote(#[from] VoteError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Vote(vote) => match vote {
                VoteError::Validation(_) => StatusCode::BAD_REQUEST,
                VoteError::NotEligible { .. } | VoteError::ElectionClosed(_) => {
                    StatusCode::FORBIDDEN
                }
                VoteError::PositionNotFound(_) | VoteError::CandidateNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                VoteError::AlreadyVoted { .. } => StatusCode::CONFLICT,
                VoteError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
                VoteError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("{self}");
            "Internal error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
