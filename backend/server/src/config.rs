use std::{
    env,
    fmt::Display,
    fs::read_to_string,
    io::ErrorKind,
    path::Path,
    str::FromStr,
    time::Duration,
};

use anyhow::anyhow;
use tracing::{info, warn};

use crate::ledger::LedgerConfig;

pub const DEFAULT_DATABASE_PATH: &str = "portal.db";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub redis_url: String,
    pub lock_wait: Duration,
    pub lock_ttl: Duration,
    pub cache_ttl: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let ledger = LedgerConfig::default();

        Self {
            port: 1111,
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            lock_wait: ledger.lock_wait,
            lock_ttl: Duration::from_secs(15),
            cache_ttl: Duration::from_secs(60 * 60),
            retry_attempts: ledger.retry_attempts,
            retry_backoff: ledger.retry_backoff,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let redis_url = match read_secret("REDIS_URL") {
            Some(url) => url,
            None => try_load("REDIS_URL", DEFAULT_REDIS_URL)?,
        };

        let config = Self {
            port: try_load("RUST_PORT", "1111")?,
            database_path: try_load("DATABASE_PATH", DEFAULT_DATABASE_PATH)?,
            redis_url,
            lock_wait: Duration::from_millis(try_load("LOCK_WAIT_MS", "10000")?),
            lock_ttl: Duration::from_millis(try_load("LOCK_TTL_MS", "15000")?),
            cache_ttl: Duration::from_secs(try_load("CACHE_TTL_SECS", "3600")?),
            retry_attempts: try_load("RETRY_ATTEMPTS", "3")?,
            retry_backoff: Duration::from_millis(try_load("RETRY_BACKOFF_MS", "50")?),
        };

        config.check()?;
        Ok(config)
    }

    /// A lock that can expire while its holder still waits on SQLite would
    /// let a second writer in.
    fn check(&self) -> anyhow::Result<()> {
        if self.lock_ttl <= self.lock_wait {
            return Err(anyhow!(
                "LOCK_TTL_MS ({:?}) must be longer than LOCK_WAIT_MS ({:?})",
                self.lock_ttl,
                self.lock_wait
            ));
        }

        if self.retry_attempts == 0 {
            return Err(anyhow!("RETRY_ATTEMPTS must be at least 1"));
        }

        Ok(())
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            lock_wait: self.lock_wait,
            retry_attempts: self.retry_attempts,
            retry_backoff: self.retry_backoff,
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse_value(key, &raw)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}"))
}

fn read_secret(secret_name: &str) -> Option<String> {
    read_secret_from(Path::new("/run/secrets"), secret_name)
}

fn read_secret_from(dir: &Path, secret_name: &str) -> Option<String> {
    let path = dir.join(secret_name);

    match read_to_string(&path) {
        Ok(secret) => Some(secret.trim().to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No {secret_name} secret, using environment");
            None
        }
        Err(e) => {
            let e = anyhow::Error::from(e).context(format!("reading {}", path.display()));
            warn!("Secret {secret_name} unreadable, falling back to environment: {e:#}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_values() {
        assert_eq!(parse_value::<u16>("RUST_PORT", " 8080 ").unwrap(), 8080);
        assert!(parse_value::<u16>("RUST_PORT", "eighty").is_err());
        assert!(parse_value::<u32>("RETRY_ATTEMPTS", "-1").is_err());
    }

    #[test]
    fn defaults_are_consistent() {
        let config = Config::default();

        config.check().unwrap();
        assert_eq!(config.ledger_config().retry_attempts, 3);
        assert_eq!(config.lock_wait, Duration::from_secs(10));
    }

    #[test]
    fn secrets_are_trimmed_and_optional() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("REDIS_URL"), "redis://cache:6379\n").unwrap();

        assert_eq!(
            read_secret_from(dir.path(), "REDIS_URL").as_deref(),
            Some("redis://cache:6379")
        );
        assert_eq!(read_secret_from(dir.path(), "MISSING"), None);
    }

    #[test]
    fn ttl_must_outlive_wait() {
        let config = Config {
            lock_ttl: Duration::from_secs(5),
            ..Config::default()
        };

        assert!(config.check().is_err());
    }
}
