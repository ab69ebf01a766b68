use std::{collections::HashMap, sync::Mutex, time::Duration};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::Result;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn set_raw(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
pub trait Cache: CacheBackend {
    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + Send + Sync,
    {
        let value_bytes = serde_json::to_vec(value)?;

        self.set_raw(key, &value_bytes, ttl).await
    }

    async fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get_raw(key).await? {
            Some(raw) => Ok(Some(serde_json::from_slice::<T>(&raw)?)),
            None => Ok(None),
        }
    }
}

/// 为所有实现了 CacheBackend 的类型自动实现 Cache
impl<T: CacheBackend> Cache for T {}

/// 进程内缓存，忽略TTL，主要用于测试
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn set_raw(&self, key: &str, value: &[u8], _ttl: Duration) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| crate::Error::Internal("memory cache poisoned".to_string()))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| crate::Error::Internal("memory cache poisoned".to_string()))?
            .get(key)
            .cloned())
    }
}
