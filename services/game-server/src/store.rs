//! Inventory and session repositories selectable from config.

use fishhunt_execution::inventory::StoreUnavailable;
use fishhunt_execution::session::SessionStoreUnavailable;
use fishhunt_execution::{
    InventoryRepository, MemoryInventoryRepository, MemorySessionRepository, SessionRepository,
};
use fishhunt_types::{Inventory, PlayerId, SessionRecord, Tier};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::config::StoreConfig;

/// Sessions kept per player; older ones are trimmed on write.
pub const SESSION_HISTORY: isize = 100;

#[derive(Debug, Error)]
pub enum RedisStoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("corrupt record: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Lazily opened connection shared by the repositories of one store.
///
/// The connection is opened on first use and dropped after any command error so the next call
/// reconnects.
struct Inner {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
    prefix: String,
}

impl Inner {
    fn open(url: &str, prefix: String) -> Result<Arc<Self>, redis::RedisError> {
        let client = redis::Client::open(url)?;
        Ok(Arc::new(Self {
            client,
            connection: Mutex::new(None),
            prefix,
        }))
    }

    async fn ensure_connection(
        &self,
    ) -> Result<MutexGuard<'_, Option<ConnectionManager>>, redis::RedisError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.client.get_connection_manager().await?);
        }
        Ok(guard)
    }
}

/// Inventory records stored as JSON under `{prefix}inventory:{tier}`.
#[derive(Clone)]
pub struct RedisInventoryRepository {
    inner: Arc<Inner>,
}

impl RedisInventoryRepository {
    pub fn new(url: &str, prefix: impl Into<String>) -> Result<Self, redis::RedisError> {
        Ok(Self {
            inner: Inner::open(url, prefix.into())?,
        })
    }

    /// Session repository sharing this store's connection.
    pub fn sessions(&self) -> RedisSessionRepository {
        RedisSessionRepository {
            inner: self.inner.clone(),
        }
    }

    fn key(&self, tier: Tier) -> String {
        format!("{}inventory:{tier}", self.inner.prefix)
    }

    async fn ensure_connection(
        &self,
    ) -> Result<MutexGuard<'_, Option<ConnectionManager>>, redis::RedisError> {
        self.inner.ensure_connection().await
    }
}

impl InventoryRepository for RedisInventoryRepository {
    type Error = RedisStoreError;

    async fn load(&self, tier: Tier) -> Result<Option<Inventory>, Self::Error> {
        let key = self.key(tier);
        let mut guard = self.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Ok(None);
        };
        let value: Option<String> = match conn.get(&key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(%key, %err, "redis get failed");
                *guard = None;
                return Err(err.into());
            }
        };
        drop(guard);
        match value {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, inventory: Inventory) -> Result<(), Self::Error> {
        let key = self.key(inventory.tier);
        let raw = serde_json::to_string(&inventory)?;
        let mut guard = self.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Ok(());
        };
        let result: redis::RedisResult<()> = conn.set(&key, raw).await;
        if let Err(err) = result {
            warn!(%key, %err, "redis set failed");
            *guard = None;
            return Err(err.into());
        }
        Ok(())
    }

    async fn load_all(&self) -> Result<HashMap<Tier, Inventory>, Self::Error> {
        let mut records = HashMap::new();
        for tier in Tier::ALL {
            if let Some(inventory) = self.load(tier).await? {
                records.insert(tier, inventory);
            }
        }
        Ok(records)
    }
}

/// Finished sessions as a JSON list per player under `{prefix}sessions:{player_id}`, newest last.
#[derive(Clone)]
pub struct RedisSessionRepository {
    inner: Arc<Inner>,
}

impl RedisSessionRepository {
    fn key(&self, player_id: PlayerId) -> String {
        format!("{}sessions:{player_id}", self.inner.prefix)
    }
}

impl SessionRepository for RedisSessionRepository {
    type Error = RedisStoreError;

    async fn save(&self, record: SessionRecord) -> Result<(), Self::Error> {
        let key = self.key(record.player_id);
        let raw = serde_json::to_string(&record)?;
        let mut guard = self.inner.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Ok(());
        };
        let result: redis::RedisResult<()> = redis::pipe()
            .atomic()
            .rpush(&key, raw)
            .ignore()
            .ltrim(&key, -SESSION_HISTORY, -1)
            .ignore()
            .query_async(conn)
            .await;
        if let Err(err) = result {
            warn!(%key, %err, "redis session write failed");
            *guard = None;
            return Err(err.into());
        }
        Ok(())
    }

    async fn history(&self, player_id: PlayerId) -> Result<Vec<SessionRecord>, Self::Error> {
        let key = self.key(player_id);
        let mut guard = self.inner.ensure_connection().await?;
        let Some(conn) = guard.as_mut() else {
            return Ok(Vec::new());
        };
        let raw: Vec<String> = match conn.lrange(&key, 0, -1).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%key, %err, "redis lrange failed");
                *guard = None;
                return Err(err.into());
            }
        };
        drop(guard);
        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(RedisStoreError::from))
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum StoreBackendError {
    #[error(transparent)]
    Memory(#[from] StoreUnavailable),
    #[error(transparent)]
    Redis(#[from] RedisStoreError),
}

#[derive(Clone)]
pub enum StoreBackend {
    Memory(MemoryInventoryRepository),
    Redis(RedisInventoryRepository),
}

impl StoreBackend {
    pub fn from_config(config: &StoreConfig) -> Result<Self, redis::RedisError> {
        Ok(match config {
            StoreConfig::Memory => StoreBackend::Memory(MemoryInventoryRepository::default()),
            StoreConfig::Redis { url, prefix } => {
                StoreBackend::Redis(RedisInventoryRepository::new(url, prefix.clone())?)
            }
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory(_) => "memory",
            StoreBackend::Redis(_) => "redis",
        }
    }

    /// Session repository on the same backend.
    pub fn sessions(&self) -> SessionBackend {
        match self {
            StoreBackend::Memory(_) => SessionBackend::Memory(MemorySessionRepository::default()),
            StoreBackend::Redis(store) => SessionBackend::Redis(store.sessions()),
        }
    }
}

impl InventoryRepository for StoreBackend {
    type Error = StoreBackendError;

    async fn load(&self, tier: Tier) -> Result<Option<Inventory>, Self::Error> {
        match self {
            StoreBackend::Memory(store) => Ok(store.load(tier).await?),
            StoreBackend::Redis(store) => Ok(store.load(tier).await?),
        }
    }

    async fn save(&self, inventory: Inventory) -> Result<(), Self::Error> {
        match self {
            StoreBackend::Memory(store) => Ok(store.save(inventory).await?),
            StoreBackend::Redis(store) => Ok(store.save(inventory).await?),
        }
    }

    async fn load_all(&self) -> Result<HashMap<Tier, Inventory>, Self::Error> {
        match self {
            StoreBackend::Memory(store) => Ok(store.load_all().await?),
            StoreBackend::Redis(store) => Ok(store.load_all().await?),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionBackendError {
    #[error(transparent)]
    Memory(#[from] SessionStoreUnavailable),
    #[error(transparent)]
    Redis(#[from] RedisStoreError),
}

#[derive(Clone)]
pub enum SessionBackend {
    Memory(MemorySessionRepository),
    Redis(RedisSessionRepository),
}

impl SessionRepository for SessionBackend {
    type Error = SessionBackendError;

    async fn save(&self, record: SessionRecord) -> Result<(), Self::Error> {
        match self {
            SessionBackend::Memory(store) => Ok(store.save(record).await?),
            SessionBackend::Redis(store) => Ok(store.save(record).await?),
        }
    }

    async fn history(&self, player_id: PlayerId) -> Result<Vec<SessionRecord>, Self::Error> {
        match self {
            SessionBackend::Memory(store) => Ok(store.history(player_id).await?),
            SessionBackend::Redis(store) => Ok(store.history(player_id).await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_keys_are_prefixed_per_tier() {
        let store = RedisInventoryRepository::new("redis://127.0.0.1:6379", "fishhunt:").unwrap();
        assert_eq!(store.key(Tier::Vip), "fishhunt:inventory:vip");
        assert_eq!(store.key(Tier::Novice), "fishhunt:inventory:novice");
        assert_eq!(store.sessions().key(42), "fishhunt:sessions:42");
    }

    #[test]
    fn test_bad_redis_url_rejected() {
        let config = StoreConfig::Redis {
            url: "http://not-redis".into(),
            prefix: "x:".into(),
        };
        assert!(StoreBackend::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_memory_backend_round_trips() {
        let store = StoreBackend::from_config(&StoreConfig::Memory).unwrap();
        assert_eq!(store.name(), "memory");
        let mut inventory = Inventory::new(Tier::Advanced);
        inventory.add_bet(1_000);
        store.save(inventory.clone()).await.unwrap();
        assert_eq!(store.load(Tier::Advanced).await.unwrap(), Some(inventory));
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_backend_keeps_session_history() {
        let store = StoreBackend::from_config(&StoreConfig::Memory).unwrap();
        let sessions = store.sessions();
        let mut first = SessionRecord::new(9, "room_vip_1".into(), 10);
        first.record_bullet(100);
        first.finish(20);
        let mut second = SessionRecord::new(9, "room_vip_1".into(), 30);
        second.finish(40);
        sessions.save(first.clone()).await.unwrap();
        sessions.save(second.clone()).await.unwrap();
        assert_eq!(sessions.history(9).await.unwrap(), vec![first, second]);
        assert!(sessions.history(10).await.unwrap().is_empty());
    }
}
