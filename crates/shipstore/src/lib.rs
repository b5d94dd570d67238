//! `shipstore`: the key/value + hash + sorted-set store behind the game.
//!
//! One contract, two backends: a real Redis server spoken to over a minimal
//! hand-rolled RESP client, and an in-process store with the same semantics
//! (TTL expiry, WRONGTYPE on cross-type operations). The rest of the system
//! never knows which one it got; if Redis is unreachable at startup the
//! process warns and carries on in memory.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{info, warn};

pub mod memory;
pub mod resp;

pub use memory::MemoryStore;
pub use resp::RespStore;

const CONNECT_ATTEMPTS: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum StoreError {
    /// Operation against a key holding the wrong data type.
    WrongType,
    /// `hincrby` against a non-integer field value.
    NotAnInteger,
    Protocol(String),
    Server(String),
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::WrongType => {
                write!(f, "operation against a key holding the wrong kind of value")
            }
            StoreError::NotAnInteger => write!(f, "hash value is not an integer"),
            StoreError::Protocol(s) => write!(f, "protocol error: {s}"),
            StoreError::Server(s) => write!(f, "server error: {s}"),
            StoreError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub addr: String,
    pub password: Option<String>,
    pub use_memory: bool,
}

/// Handle passed through the engine. Every method is a single atomic
/// operation on the backend; batch `hset` applies all fields at once.
#[derive(Debug)]
pub enum Store {
    Memory(MemoryStore),
    Redis(RespStore),
}

impl Store {
    pub fn memory() -> Self {
        Store::Memory(MemoryStore::new())
    }

    /// Connect to Redis with retries, falling back to the in-process store.
    /// Startup never fails on store unavailability.
    pub async fn open(cfg: &StoreConfig) -> Self {
        if cfg.use_memory {
            info!("memory store requested; skipping redis");
            return Store::memory();
        }

        for attempt in 1..=CONNECT_ATTEMPTS {
            match RespStore::connect(&cfg.addr, cfg.password.as_deref()).await {
                Ok(s) => {
                    info!(addr = %cfg.addr, "connected to redis");
                    return Store::Redis(s);
                }
                Err(e) => {
                    warn!(
                        addr = %cfg.addr,
                        attempt,
                        err = %e,
                        "redis connection failed; retrying"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }

        warn!(addr = %cfg.addr, "could not connect to redis; using in-memory store");
        Store::memory()
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        match self {
            Store::Memory(m) => m.ping(),
            Store::Redis(r) => r.ping().await,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Store::Memory(m) => m.get(key),
            Store::Redis(r) => r.get(key).await,
        }
    }

    /// Set a string value, optionally expiring after `ttl_secs`.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<(), StoreError> {
        match self {
            Store::Memory(m) => m.set(key, value, ttl_secs),
            Store::Redis(r) => r.set(key, value, ttl_secs).await,
        }
    }

    pub async fn del(&self, key: &str) -> Result<bool, StoreError> {
        match self {
            Store::Memory(m) => m.del(key),
            Store::Redis(r) => r.del(key).await,
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        match self {
            Store::Memory(m) => m.exists(key),
            Store::Redis(r) => r.exists(key).await,
        }
    }

    /// Live keys starting with `prefix`. `prefix` must not contain glob
    /// metacharacters; it is passed to `KEYS prefix*` on the Redis backend.
    pub async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self {
            Store::Memory(m) => m.scan_prefix(prefix),
            Store::Redis(r) => r.scan_prefix(prefix).await,
        }
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        match self {
            Store::Memory(m) => m.hget(key, field),
            Store::Redis(r) => r.hget(key, field).await,
        }
    }

    /// Write all `fields` into one hash as a single batch.
    pub async fn hset(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        match self {
            Store::Memory(m) => m.hset(key, fields),
            Store::Redis(r) => r.hset(key, fields).await,
        }
    }

    pub async fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>, StoreError> {
        match self {
            Store::Memory(m) => m.hgetall(key),
            Store::Redis(r) => r.hgetall(key).await,
        }
    }

    pub async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        match self {
            Store::Memory(m) => m.hincrby(key, field, delta),
            Store::Redis(r) => r.hincrby(key, field, delta).await,
        }
    }

    pub async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        match self {
            Store::Memory(m) => m.zadd(key, member, score),
            Store::Redis(r) => r.zadd(key, member, score).await,
        }
    }

    /// Top `n` members by descending score.
    pub async fn ztop(&self, key: &str, n: usize) -> Result<Vec<(String, i64)>, StoreError> {
        match self {
            Store::Memory(m) => m.ztop(key, n),
            Store::Redis(r) => r.ztop(key, n).await,
        }
    }
}
