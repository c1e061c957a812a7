//! # Candidate Locks
//!
//! Short-lived mutual exclusion per candidate id. Votes for different
//! candidates never wait on each other.
//!
//! ## Redis
//! - Key `lock:candidate:{id}`, value is a random token per holder
//! - `SET key token NX PX ttl`, polled until the wait runs out
//! - Release deletes the key only if it still holds our token, so a holder whose
//!   TTL expired cannot drop somebody else's lock
//!
//! ## Local
//! - One `tokio` mutex per candidate, for tests and single-node runs
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use redis::{Script, aio::ConnectionManager};
use registry::types::CandidateId;
use tokio::{
    sync::{Mutex as AsyncMutex, OwnedMutexGuard},
    time::{Instant, sleep, timeout},
};
use tracing::warn;
use uuid::Uuid;

use crate::error::VoteError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

#[derive(Debug)]
pub struct LockToken {
    pub candidate: CandidateId,
    token: Uuid,
}

#[async_trait]
pub trait CandidateLocks: Send + Sync {
    /// Waits at most `wait` for the lock, then fails with
    /// [`VoteError::LockTimeout`].
    async fn acquire(&self, candidate: CandidateId, wait: Duration)
    -> Result<LockToken, VoteError>;

    async fn release(&self, token: LockToken);
}

pub fn lock_key(candidate: CandidateId) -> String {
    format!("lock:candidate:{candidate}")
}

pub struct RedisLocks {
    redis_connection: ConnectionManager,
    ttl: Duration,
    release_script: Script,
}

impl RedisLocks {
    /// `ttl` bounds how long a crashed holder can block a candidate.
    pub fn new(redis_connection: ConnectionManager, ttl: Duration) -> Self {
        Self {
            redis_connection,
            ttl,
            release_script: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl CandidateLocks for RedisLocks {
    async fn acquire(
        &self,
        candidate: CandidateId,
        wait: Duration,
    ) -> Result<LockToken, VoteError> {
        let key = lock_key(candidate);
        let token = Uuid::new_v4();
        let deadline = Instant::now() + wait;
        let mut connection = self.redis_connection.clone();

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(token.to_string())
                .arg("NX")
                .arg("PX")
                .arg(self.ttl.as_millis() as u64)
                .query_async(&mut connection)
                .await?;

            if acquired.is_some() {
                return Ok(LockToken { candidate, token });
            }

            if Instant::now() + POLL_INTERVAL > deadline {
                return Err(VoteError::LockTimeout(candidate));
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    async fn release(&self, token: LockToken) {
        let mut connection = self.redis_connection.clone();

        let released: redis::RedisResult<i64> = self
            .release_script
            .key(lock_key(token.candidate))
            .arg(token.token.to_string())
            .invoke_async(&mut connection)
            .await;

        match released {
            Ok(1) => {}
            Ok(_) => warn!("Lock on candidate {} expired before release", token.candidate),
            Err(e) => warn!("Failed to release lock on candidate {}: {e}", token.candidate),
        }
    }
}

#[derive(Default)]
pub struct LocalLocks {
    candidates: Mutex<HashMap<CandidateId, Arc<AsyncMutex<()>>>>,
    held: Mutex<HashMap<Uuid, OwnedMutexGuard<()>>>,
}

impl LocalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn candidate_mutex(&self, candidate: CandidateId) -> Result<Arc<AsyncMutex<()>>, VoteError> {
        let mut candidates = self
            .candidates
            .lock()
            .map_err(|_| VoteError::PersistenceFailure("lock table poisoned".into()))?;

        Ok(candidates.entry(candidate).or_default().clone())
    }
}

#[async_trait]
impl CandidateLocks for LocalLocks {
    async fn acquire(
        &self,
        candidate: CandidateId,
        wait: Duration,
    ) -> Result<LockToken, VoteError> {
        let mutex = self.candidate_mutex(candidate)?;

        let guard = timeout(wait, mutex.lock_owned())
            .await
            .map_err(|_| VoteError::LockTimeout(candidate))?;

        let token = Uuid::new_v4();
        self.held
            .lock()
            .map_err(|_| VoteError::PersistenceFailure("lock table poisoned".into()))?
            .insert(token, guard);

        Ok(LockToken { candidate, token })
    }

    async fn release(&self, token: LockToken) {
        match self.held.lock() {
            Ok(mut held) => {
                if held.remove(&token.token).is_none() {
                    warn!("Released unknown lock on candidate {}", token.candidate);
                }
            }
            Err(_) => warn!("Lock table poisoned, candidate {} stays locked", token.candidate),
        }
    }
}
