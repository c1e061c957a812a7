use std::sync::Arc;

use super::{
    broadcast::RedisBroadcaster,
    cache::RedisTally,
    config::Config,
    database::{Store, init_redis},
    ledger::Ledger,
    lock::RedisLocks,
};

pub struct AppState {
    pub config: Config,
    pub ledger: Ledger,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Arc<Self>> {
        let config = Config::load()?;
        let ledger = redis_ledger(&config).await?;

        Ok(Self::with_ledger(config, ledger))
    }

    pub fn with_ledger(config: Config, ledger: Ledger) -> Arc<Self> {
        Arc::new(Self { config, ledger })
    }
}

/// Ledger over the SQLite file and the shared Redis instance.
pub async fn redis_ledger(config: &Config) -> anyhow::Result<Ledger> {
    let store = Store::open(&config.database_path)?;
    let redis_connection = init_redis(&config.redis_url).await?;

    Ok(Ledger::new(
        store,
        Arc::new(RedisLocks::new(redis_connection.clone(), config.lock_ttl)),
        Arc::new(RedisTally::new(redis_connection.clone(), config.cache_ttl)),
        Arc::new(RedisBroadcaster::new(redis_connection)),
        config.ledger_config(),
    ))
}
