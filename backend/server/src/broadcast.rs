//! # Live Tallies
//!
//! After a ballot commits, one `vote.casted` event goes out per picked
//! candidate. Delivery is best effort: subscribers that miss an event catch up
//! on the next one or from the tally endpoint.
use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use registry::types::CandidateId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const VOTE_CASTED: &str = "vote.casted";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VoteCasted {
    pub candidate_id: CandidateId,
    pub updated_count: i64,
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, event: &VoteCasted) -> anyhow::Result<()>;
}

pub struct RedisBroadcaster {
    redis_connection: ConnectionManager,
}

impl RedisBroadcaster {
    pub fn new(redis_connection: ConnectionManager) -> Self {
        Self { redis_connection }
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn publish(&self, event: &VoteCasted) -> anyhow::Result<()> {
        let mut connection = self.redis_connection.clone();
        let payload = serde_json::to_string(event)?;

        let _: i64 = connection.publish(VOTE_CASTED, payload).await?;
        Ok(())
    }
}

/// In-process fan-out.
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<VoteCasted>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoteCasted> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Broadcaster for ChannelBroadcaster {
    async fn publish(&self, event: &VoteCasted) -> anyhow::Result<()> {
        // no subscribers is not an error
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}
