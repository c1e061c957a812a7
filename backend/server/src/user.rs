//! # Voter Identity
//!
//! Login happens in front of this service. The reverse proxy checks the session
//! and forwards the student number in `X-Voter-Id`; requests without it never
//! reach the ledger.
//!
//! The identity is passed explicitly to every ledger call as a
//! [`VoterContext`], there is no ambient "current user".
use axum::{extract::FromRequestParts, http::request::Parts};
use registry::normalize_voter_key;

use crate::error::AppError;

pub const VOTER_HEADER: &str = "x-voter-id";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoterContext {
    key: String,
}

impl VoterContext {
    /// `None` when nothing usable is left after normalization.
    pub fn new(raw_key: &str) -> Option<Self> {
        let key = normalize_voter_key(raw_key);

        (!key.is_empty()).then_some(Self { key })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<S> FromRequestParts<S> for VoterContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(VOTER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(VoterContext::new)
            .ok_or(AppError::Unauthorized)
    }
}
