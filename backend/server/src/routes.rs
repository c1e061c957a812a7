use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use registry::types::{CandidateId, PositionId};
use serde::{Deserialize, Serialize};

use crate::{
    database::Tally, error::AppError, state::AppState, user::VoterContext,
    utils::get_candidates_from_body,
};

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CandidateVotes {
    pub candidate_id: CandidateId,
    pub votes: i64,
}

pub async fn votes_handler(
    State(state): State<Arc<AppState>>,
    Path(position_id): Path<PositionId>,
    voter: VoterContext,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let candidates = get_candidates_from_body(body)?;

    let events = state
        .ledger
        .cast_ballot_with_retry(&voter, position_id, &candidates)
        .await?;

    Ok((StatusCode::CREATED, Json(events)))
}

pub async fn tally_handler(
    State(state): State<Arc<AppState>>,
    Path(position_id): Path<PositionId>,
) -> Result<Json<Vec<Tally>>, AppError> {
    Ok(Json(state.ledger.list_candidates(position_id).await?))
}

pub async fn candidate_votes_handler(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<CandidateId>,
) -> Result<Json<CandidateVotes>, AppError> {
    let votes = state
        .ledger
        .cached_votes(candidate_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {candidate_id} not found")))?;

    Ok(Json(CandidateVotes {
        candidate_id,
        votes,
    }))
}
