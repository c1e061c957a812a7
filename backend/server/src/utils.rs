use axum::body::Bytes;
use registry::{get_choice_from_bytes, types::CandidateId};

use crate::error::AppError;

/// No position comes close; anything larger is not a real ballot.
pub const MAX_PICKS: usize = 32;

pub fn get_candidates_from_body(body: Bytes) -> Result<Vec<CandidateId>, AppError> {
    let choice = get_choice_from_bytes(body).map_err(|_| AppError::MalformedPayload)?;

    if choice.candidate_ids.len() > MAX_PICKS {
        return Err(AppError::MalformedPayload);
    }

    Ok(choice.candidate_ids)
}
