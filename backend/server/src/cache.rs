//! # Tally Cache
//!
//! Advisory per-candidate counters for the fast read path. The durable counter
//! in SQLite always wins.
//!
//! A missing key is seeded from the durable counter, never from zero, so an
//! eviction halfway through an election cannot make a candidate look like they
//! lost their votes.
use std::{collections::HashMap, sync::Mutex, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};
use registry::types::CandidateId;

const INCREMENT_SCRIPT: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 1 then
        local votes = redis.call("INCR", KEYS[1])
        redis.call("PEXPIRE", KEYS[1], ARGV[2])
        return votes
    else
        redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
        return tonumber(ARGV[1])
    end
"#;

#[async_trait]
pub trait TallyCache: Send + Sync {
    /// Counts one more vote. `durable` is the committed counter, used as the
    /// value when the key is missing.
    async fn increment(&self, candidate: CandidateId, durable: i64) -> anyhow::Result<i64>;

    async fn get(&self, candidate: CandidateId) -> anyhow::Result<Option<i64>>;

    /// Sets the counter only if the key is missing. A reader seeding from an
    /// older durable read must not overwrite a fresher increment.
    async fn seed(&self, candidate: CandidateId, votes: i64) -> anyhow::Result<()>;

    async fn evict(&self, candidate: CandidateId) -> anyhow::Result<()>;
}

pub fn tally_key(candidate: CandidateId) -> String {
    format!("tally:candidate:{candidate}")
}

pub struct RedisTally {
    redis_connection: ConnectionManager,
    ttl: Duration,
    increment_script: Script,
}

impl RedisTally {
    pub fn new(redis_connection: ConnectionManager, ttl: Duration) -> Self {
        Self {
            redis_connection,
            ttl,
            increment_script: Script::new(INCREMENT_SCRIPT),
        }
    }
}

#[async_trait]
impl TallyCache for RedisTally {
    async fn increment(&self, candidate: CandidateId, durable: i64) -> anyhow::Result<i64> {
        let mut connection = self.redis_connection.clone();

        let votes: i64 = self
            .increment_script
            .key(tally_key(candidate))
            .arg(durable)
            .arg(self.ttl.as_millis() as u64)
            .invoke_async(&mut connection)
            .await?;

        Ok(votes)
    }

    async fn get(&self, candidate: CandidateId) -> anyhow::Result<Option<i64>> {
        let mut connection = self.redis_connection.clone();

        let votes: Option<i64> = connection.get(tally_key(candidate)).await?;
        Ok(votes)
    }

    async fn seed(&self, candidate: CandidateId, votes: i64) -> anyhow::Result<()> {
        let mut connection = self.redis_connection.clone();

        let _: Option<String> = redis::cmd("SET")
            .arg(tally_key(candidate))
            .arg(votes)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut connection)
            .await?;
        Ok(())
    }

    async fn evict(&self, candidate: CandidateId) -> anyhow::Result<()> {
        let mut connection = self.redis_connection.clone();

        let _: () = connection.del(tally_key(candidate)).await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct LocalTally {
    votes: Mutex<HashMap<CandidateId, i64>>,
}

impl LocalTally {
    pub fn new() -> Self {
        Self::default()
    }

    fn votes(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<CandidateId, i64>>> {
        self.votes.lock().map_err(|_| anyhow!("tally cache poisoned"))
    }
}

#[async_trait]
impl TallyCache for LocalTally {
    async fn increment(&self, candidate: CandidateId, durable: i64) -> anyhow::Result<i64> {
        let mut votes = self.votes()?;

        let entry = votes
            .entry(candidate)
            .and_modify(|v| *v += 1)
            .or_insert(durable);

        Ok(*entry)
    }

    async fn get(&self, candidate: CandidateId) -> anyhow::Result<Option<i64>> {
        Ok(self.votes()?.get(&candidate).copied())
    }

    async fn seed(&self, candidate: CandidateId, votes: i64) -> anyhow::Result<()> {
        self.votes()?.entry(candidate).or_insert(votes);
        Ok(())
    }

    async fn evict(&self, candidate: CandidateId) -> anyhow::Result<()> {
        self.votes()?.remove(&candidate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_is_seeded_from_durable_counter() {
        let cache = LocalTally::new();

        assert_eq!(cache.increment(5, 41).await.unwrap(), 41);
        assert_eq!(cache.increment(5, 42).await.unwrap(), 42);

        cache.evict(5).await.unwrap();
        assert_eq!(cache.get(5).await.unwrap(), None);

        assert_eq!(cache.increment(5, 43).await.unwrap(), 43);
    }

    #[tokio::test]
    async fn seed_fills_a_miss() {
        let cache = LocalTally::new();

        cache.seed(9, 3).await.unwrap();
        assert_eq!(cache.get(9).await.unwrap(), Some(3));
        assert_eq!(cache.increment(9, 100).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn stale_seed_keeps_the_fresher_count() {
        let cache = LocalTally::new();

        // reader loads 5 from SQLite, a vote commits 6 and fills the miss,
        // then the reader seeds its stale value
        assert_eq!(cache.increment(9, 6).await.unwrap(), 6);
        cache.seed(9, 5).await.unwrap();

        assert_eq!(cache.get(9).await.unwrap(), Some(6));
    }
}
