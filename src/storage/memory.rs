//! In-memory [`ObjectStore`] for tests and local demos.
//!
//! Objects live in a `HashMap` behind `std::sync::RwLock`. Presigned URLs
//! use a `memory://` scheme and are not dereferenceable. Listing and stat
//! failures can be injected to exercise error paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use super::ObjectStore;
use crate::error::{Error, Result};
use crate::models::ObjectStat;

struct StoredObject {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    fail_listing: RwLock<bool>,
    broken_keys: RwLock<HashSet<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, bytes: impl Into<Vec<u8>>, last_modified: DateTime<Utc>) {
        self.objects.write().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.into(),
                last_modified,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.objects.write().unwrap().remove(key);
    }

    /// Make `list_keys` fail with a transport error until reset.
    pub fn set_listing_failure(&self, fail: bool) {
        *self.fail_listing.write().unwrap() = fail;
    }

    /// Make `stat` and `fetch_to_local` fail with a transport error for `key`.
    pub fn break_key(&self, key: &str) {
        self.broken_keys.write().unwrap().insert(key.to_string());
    }

    fn check_broken(&self, key: &str) -> Result<()> {
        if self.broken_keys.read().unwrap().contains(key) {
            return Err(Error::transport(format!("injected failure for '{}'", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        self.check_broken(key)?;
        let objects = self.objects.read().unwrap();
        let obj = objects.get(key).ok_or_else(|| Error::not_found(key))?;
        Ok(ObjectStat {
            size: obj.bytes.len() as i64,
            last_modified: obj.last_modified,
        })
    }

    async fn fetch_to_local(&self, key: &str, dest: &Path) -> Result<()> {
        self.check_broken(key)?;
        let bytes = {
            let objects = self.objects.read().unwrap();
            objects
                .get(key)
                .ok_or_else(|| Error::not_found(key))?
                .bytes
                .clone()
        };
        tokio::fs::write(dest, bytes)
            .await
            .map_err(|e| Error::processing(key, e))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        if *self.fail_listing.read().unwrap() {
            return Err(Error::transport("injected listing failure"));
        }
        let mut keys: Vec<String> = self.objects.read().unwrap().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String> {
        Ok(format!("memory://put/{}?expires={}", key, ttl.as_secs()))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        Ok(format!("memory://get/{}?expires={}", key, ttl.as_secs()))
    }

    async fn ensure_container(&self) -> Result<()> {
        Ok(())
    }
}
