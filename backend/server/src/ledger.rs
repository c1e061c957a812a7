//! # Vote Ledger
//!
//! Records ballots. For one `(voter, position, candidates)` submission:
//!
//! 1. Check the ballot shape, the position, the election status, the roll, the
//!    "already voted" marker and that every candidate runs for the position
//! 2. Lock every picked candidate, lowest id first, with a bounded wait
//! 3. One SQLite transaction: submission marker, counter increments, records
//! 4. Bump the cache counters while still holding the locks
//! 5. Release the locks on every path. Steps 2 to 5 run in their own task, so
//!    a client hanging up mid-ballot does not cut them short
//! 6. Publish `vote.casted` per candidate, fire and forget
//!
//! The pre-check in step 1 is only a fast path. Two racing submissions from
//! the same voter both pass it; the primary key on `ballot_submissions` lets
//! exactly one of them commit.
//!
//! Multi-select positions go through the same path as a single call, so the
//! "already voted" marker is written once per position and a voter cannot
//! spread their picks over several submissions.
use std::{collections::HashSet, sync::Arc, time::Duration};

use registry::types::{CandidateId, ElectionId, ElectionStatus, PositionId};
use tokio::{task::spawn_blocking, time::sleep};
use tracing::{debug, warn};

use crate::{
    broadcast::{Broadcaster, VoteCasted},
    cache::TallyCache,
    database::{Purge, Store, Tally},
    error::VoteError,
    lock::{CandidateLocks, LockToken},
    user::VoterContext,
};

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub lock_wait: Duration,
    /// Total attempts, including the first one.
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(10),
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Clone)]
pub struct Ledger {
    store: Store,
    locks: Arc<dyn CandidateLocks>,
    cache: Arc<dyn TallyCache>,
    broadcaster: Arc<dyn Broadcaster>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(
        store: Store,
        locks: Arc<dyn CandidateLocks>,
        cache: Arc<dyn TallyCache>,
        broadcaster: Arc<dyn Broadcaster>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            locks,
            cache,
            broadcaster,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn cast_vote(
        &self,
        voter: &VoterContext,
        candidate: CandidateId,
        position: PositionId,
    ) -> Result<(), VoteError> {
        self.cast_ballot(voter, position, &[candidate])
            .await
            .map(|_| ())
    }

    /// Records every pick of one voter on one position, or none of them.
    pub async fn cast_ballot(
        &self,
        voter: &VoterContext,
        position: PositionId,
        candidates: &[CandidateId],
    ) -> Result<Vec<VoteCasted>, VoteError> {
        let picked = validate_shape(candidates)?;

        let store = self.store.clone();
        let voter_key = voter.key().to_string();
        let checked = picked.clone();
        spawn_blocking(move || check_ballot(&store, &voter_key, position, &checked)).await??;

        // Runs detached so a dropped request cannot leave a lock held.
        let ledger = self.clone();
        let voter_key = voter.key().to_string();
        let events = tokio::spawn(async move {
            let tokens = ledger.acquire_all(&picked).await?;
            let outcome = ledger.commit(voter_key, position, picked).await;
            ledger.release_all(tokens).await;

            outcome
        })
        .await??;

        debug!(
            "{} voted for {:?} on position {position}",
            voter.key(),
            candidates
        );

        self.publish(events.clone());
        Ok(events)
    }

    /// [`Ledger::cast_ballot`], retrying lock timeouts and persistence
    /// failures with a linear backoff.
    pub async fn cast_ballot_with_retry(
        &self,
        voter: &VoterContext,
        position: PositionId,
        candidates: &[CandidateId],
    ) -> Result<Vec<VoteCasted>, VoteError> {
        let mut attempt = 1;

        loop {
            match self.cast_ballot(voter, position, candidates).await {
                Err(e) if e.is_transient() && attempt < self.config.retry_attempts => {
                    warn!("Ballot attempt {attempt} on position {position} failed: {e}");

                    sleep(self.config.retry_backoff * attempt).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }

    pub async fn list_candidates(&self, position: PositionId) -> Result<Vec<Tally>, VoteError> {
        let store = self.store.clone();

        spawn_blocking(move || {
            if store.position(position)?.is_none() {
                return Err(VoteError::PositionNotFound(position));
            }

            store.list_candidates(position)
        })
        .await?
    }

    /// Counter from the cache, falling back to the durable counter (and
    /// seeding the cache with it) on a miss. `None` for unknown candidates.
    pub async fn cached_votes(&self, candidate: CandidateId) -> Result<Option<i64>, VoteError> {
        match self.cache.get(candidate).await {
            Ok(Some(votes)) => return Ok(Some(votes)),
            Ok(None) => {}
            Err(e) => warn!("Tally cache read for candidate {candidate} failed: {e}"),
        }

        let store = self.store.clone();
        let durable = spawn_blocking(move || store.candidate_votes(candidate)).await??;

        if let Some(votes) = durable {
            if let Err(e) = self.cache.seed(candidate, votes).await {
                warn!("Tally cache seed for candidate {candidate} failed: {e}");
            }
        }

        Ok(durable)
    }

    pub async fn set_election_status(
        &self,
        election: ElectionId,
        status: ElectionStatus,
    ) -> Result<bool, VoteError> {
        let store = self.store.clone();

        spawn_blocking(move || store.set_election_status(election, status)).await?
    }

    /// Drops an election cycle and its cached counters.
    pub async fn purge_election(&self, election: ElectionId) -> Result<Purge, VoteError> {
        let store = self.store.clone();
        let purge = spawn_blocking(move || store.purge_election(election)).await??;

        // A vote that committed before the purge bumps the cache under the
        // candidate lock, so evict under the same lock.
        for &candidate in &purge.candidates {
            let token = self.locks.acquire(candidate, self.config.lock_wait).await;

            if let Err(e) = self.cache.evict(candidate).await {
                warn!("Tally cache evict for candidate {candidate} failed: {e}");
            }

            match token {
                Ok(token) => self.locks.release(token).await,
                Err(e) => warn!("Evicted candidate {candidate} without its lock: {e}"),
            }
        }

        Ok(purge)
    }

    async fn acquire_all(&self, picked: &[CandidateId]) -> Result<Vec<LockToken>, VoteError> {
        let mut tokens = Vec::with_capacity(picked.len());

        for &candidate in picked {
            match self.locks.acquire(candidate, self.config.lock_wait).await {
                Ok(token) => tokens.push(token),
                Err(e) => {
                    warn!("Could not lock candidate {candidate}: {e}");

                    self.release_all(tokens).await;
                    return Err(e);
                }
            }
        }

        Ok(tokens)
    }

    async fn release_all(&self, tokens: Vec<LockToken>) {
        for token in tokens.into_iter().rev() {
            self.locks.release(token).await;
        }
    }

    async fn commit(
        &self,
        voter_key: String,
        position: PositionId,
        picked: Vec<CandidateId>,
    ) -> Result<Vec<VoteCasted>, VoteError> {
        let store = self.store.clone();

        let counts =
            spawn_blocking(move || store.record_ballot(&voter_key, position, &picked)).await??;

        let mut events = Vec::with_capacity(counts.len());

        for (candidate_id, updated_count) in counts {
            if let Err(e) = self.cache.increment(candidate_id, updated_count).await {
                warn!("Tally cache increment for candidate {candidate_id} failed: {e}");
            }

            events.push(VoteCasted {
                candidate_id,
                updated_count,
            });
        }

        Ok(events)
    }

    fn publish(&self, events: Vec<VoteCasted>) {
        let broadcaster = self.broadcaster.clone();

        tokio::spawn(async move {
            for event in &events {
                if let Err(e) = broadcaster.publish(event).await {
                    warn!("Failed to publish vote for candidate {}: {e}", event.candidate_id);
                }
            }
        });
    }
}

/// Sorted, de-duplicated copy of the picks. Lock order follows this order.
fn validate_shape(candidates: &[CandidateId]) -> Result<Vec<CandidateId>, VoteError> {
    if candidates.is_empty() {
        return Err(VoteError::Validation("no candidate selected".into()));
    }

    let mut picked = candidates.to_vec();
    picked.sort_unstable();
    picked.dedup();

    if picked.len() != candidates.len() {
        return Err(VoteError::Validation(
            "the same candidate was selected twice".into(),
        ));
    }

    Ok(picked)
}

fn check_ballot(
    store: &Store,
    voter: &str,
    position: PositionId,
    picked: &[CandidateId],
) -> Result<(), VoteError> {
    let record = store
        .position(position)?
        .ok_or(VoteError::PositionNotFound(position))?;

    let max = record.position.rule.max_selections();
    if picked.len() > max {
        return Err(VoteError::Validation(format!(
            "{} allows at most {max} selection(s), got {}",
            record.position.title,
            picked.len()
        )));
    }

    if record.election_status == ElectionStatus::Closed {
        return Err(VoteError::ElectionClosed(record.position.election_id));
    }

    if !store.is_eligible(voter, &record.position.department)? {
        return Err(VoteError::NotEligible {
            voter: voter.to_string(),
            position,
        });
    }

    if store.has_voted(voter, position)? {
        return Err(VoteError::AlreadyVoted {
            voter: voter.to_string(),
            position,
        });
    }

    let running: HashSet<CandidateId> = store
        .candidates_for(position)?
        .into_iter()
        .map(|candidate| candidate.id)
        .collect();

    if let Some(&candidate) = picked.iter().find(|id| !running.contains(*id)) {
        return Err(VoteError::CandidateNotFound { candidate, position });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_is_sorted() {
        assert_eq!(validate_shape(&[9, 2, 5]).unwrap(), vec![2, 5, 9]);
    }

    #[test]
    fn empty_and_duplicate_picks_are_invalid() {
        assert!(matches!(validate_shape(&[]), Err(VoteError::Validation(_))));
        assert!(matches!(
            validate_shape(&[4, 4]),
            Err(VoteError::Validation(_))
        ));
    }
}
