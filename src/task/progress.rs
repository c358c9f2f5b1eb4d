use async_trait::async_trait;
use color_eyre::eyre::{Report, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Number of stages a job reports before it finishes.
pub const TOTAL_STAGES: u8 = 5;

/// Retention of a progress record after its last update.
pub const PROGRESS_TTL: Duration = Duration::from_secs(3600);

/// Key of a job's progress record.
///
/// ```rust
/// assert_eq!(vasco::task::progress_key("01J0"), "task_progress:01J0");
/// ```
pub fn progress_key(job_id: &str) -> String {
    format!("task_progress:{job_id}")
}

// ----------------------------------------------------------------------------
// Progress

/// Latest reported stage of a job.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Progress {
    pub current: u8,
    pub total: u8,
    pub status: String,
    pub partial_results: Option<Value>,
}

impl Default for Progress {
    fn default() -> Self {
        Progress::new(0, "Queued")
    }
}

impl Progress {
    pub fn new(current: u8, status: &str) -> Self {
        Progress { current, total: TOTAL_STAGES, status: status.to_string(), partial_results: None }
    }

    pub fn with_results(mut self, partial_results: Value) -> Self {
        self.partial_results = Some(partial_results);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

// ----------------------------------------------------------------------------
// Progress Store

/// Key-value store holding serialized progress records with a retention TTL.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Report>;

    /// Returns `None` for missing or expired keys.
    async fn get(&self, key: &str) -> Result<Option<String>, Report>;
}

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    /// [`None`] when the ttl is too long to represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

/// Single-process progress store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryProgressStore {
    data: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        InMemoryProgressStore::default()
    }

    /// Number of records that have not expired.
    pub async fn len(&self) -> usize {
        self.data.read().await.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Report> {
        let mut data = self.data.write().await;
        data.retain(|_, e| !e.is_expired());
        data.insert(key.to_string(), Entry { value, expires_at: Instant::now().checked_add(ttl) });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Report> {
        let data = self.data.read().await;
        let value = data.get(key).filter(|e| !e.is_expired()).map(|e| e.value.clone());
        Ok(value)
    }
}

/// Progress store shared through Redis, so other processes can poll.
#[cfg(feature = "redis")]
#[derive(Clone)]
pub struct RedisProgressStore {
    manager: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis")]
impl RedisProgressStore {
    pub async fn new(url: &str) -> Result<Self, Report> {
        use color_eyre::eyre::WrapErr;

        let client = redis::Client::open(url).wrap_err(format!("Invalid Redis URL: {url}"))?;
        let manager = redis::aio::ConnectionManager::new(client)
            .await
            .wrap_err(format!("Failed to connect to Redis: {url}"))?;
        Ok(RedisProgressStore { manager })
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), Report> {
        use redis::AsyncCommands;

        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Report> {
        use redis::AsyncCommands;

        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}
