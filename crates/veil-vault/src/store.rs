use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{Result, VaultError};

/// Minimal key-value surface the vault needs from its backing store.
///
/// Per-key operations are atomic; values are UTF-8 strings with a TTL.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Write `key` only if it does not exist. Returns whether the write won.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool>;

    /// Write `key` unconditionally with a fresh TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Liveness probe, used at startup.
    async fn ping(&self) -> Result<()>;
}

fn unavailable(e: redis::RedisError) -> VaultError {
    VaultError::Unavailable(e.to_string())
}

/// Redis-backed store. `ConnectionManager` reconnects on its own and is
/// cheap to clone, so every operation works on its own handle.
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let client = redis::Client::open(format!("redis://{host}:{port}")).map_err(unavailable)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(unavailable)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut con = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;
        Ok(reply.is_some())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut con = self.manager.clone();
        let _: () = con
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut con = self.manager.clone();
        con.get(key).await.map_err(unavailable)
    }

    async fn ping(&self) -> Result<()> {
        let mut con = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut con)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

/// In-process store with lazy expiry. Used by tests and as the development
/// fallback when no Redis host is configured — entries die with the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn expiry(ttl_secs: u64) -> Instant {
        Instant::now() + Duration::from_secs(ttl_secs)
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        let live = entries
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now());
        if live {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), Self::expiry(ttl_secs)));
        Ok(true)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), Self::expiry(ttl_secs)));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
