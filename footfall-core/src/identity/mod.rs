//! src/identity/mod.rs
//!
//! Durable visitor identity. A UUID v4 is minted on first sight and parked
//! in the cookie jar for 365 days with SameSite=Lax; every later client in
//! the same profile reads the same id back. Jar failures degrade to a fresh
//! in-memory id rather than surfacing an error.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use footfall_common::Error;
use footfall_common::models::visitor::{CookieRecord, SameSite, VisitorIdentity};
use footfall_common::traits::identity_traits::CookieJar;

pub struct CookieIdentityStore {
    jar: Arc<dyn CookieJar>,
    cookie_name: String,
    ttl_days: i64,
}

impl CookieIdentityStore {
    pub fn new(jar: Arc<dyn CookieJar>, cookie_name: impl Into<String>, ttl_days: i64) -> Self {
        Self {
            jar,
            cookie_name: cookie_name.into(),
            ttl_days,
        }
    }

    /// Returns the stored visitor identity, minting and persisting a new one
    /// if the jar has no live record. Never fails: a jar that cannot be read
    /// or written just means a fresh id (and a warning).
    pub async fn get_or_create(&self) -> VisitorIdentity {
        match self.jar.load(&self.cookie_name).await {
            Ok(Some(record)) if !record.is_expired() => {
                debug!("[Identity] existing visitor id found");
                return VisitorIdentity::new(record.value);
            }
            Ok(Some(_)) => {
                debug!("[Identity] stored record expired => minting a new id");
            }
            Ok(None) => {}
            Err(e) => {
                warn!("[Identity] cookie load failed => {}", e);
            }
        }

        let visitor_id = Uuid::new_v4().to_string();
        let record = CookieRecord {
            name: self.cookie_name.clone(),
            value: visitor_id.clone(),
            expires_at: Utc::now() + Duration::days(self.ttl_days),
            same_site: SameSite::Lax,
        };
        if let Err(e) = self.jar.store(&record).await {
            warn!("[Identity] cookie store failed => {}; id will not persist", e);
        }
        VisitorIdentity::new(visitor_id)
    }
}

/// Jar backed by a single JSON file under a profile directory. Records are
/// read-modify-written as a whole map; the file is small (one entry in
/// practice) so no locking beyond the filesystem is attempted.
pub struct FileCookieJar {
    path: PathBuf,
}

impl FileCookieJar {
    /// `profile_dir` is created on first store.
    pub fn new(profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: profile_dir.into().join("cookies.json"),
        }
    }

    async fn read_map(&self) -> Result<HashMap<String, CookieRecord>, Error> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map(&self, map: &HashMap<String, CookieRecord>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }
}

#[async_trait]
impl CookieJar for FileCookieJar {
    async fn load(&self, name: &str) -> Result<Option<CookieRecord>, Error> {
        let map = self.read_map().await?;
        Ok(map.get(name).cloned())
    }

    async fn store(&self, record: &CookieRecord) -> Result<(), Error> {
        let mut map = self.read_map().await?;
        map.insert(record.name.clone(), record.clone());
        self.write_map(&map).await
    }

    async fn remove(&self, name: &str) -> Result<(), Error> {
        let mut map = self.read_map().await?;
        if map.remove(name).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

/// In-memory jar for tests and hosts without a usable filesystem.
#[derive(Default)]
pub struct MemoryCookieJar {
    records: RwLock<HashMap<String, CookieRecord>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CookieJar for MemoryCookieJar {
    async fn load(&self, name: &str) -> Result<Option<CookieRecord>, Error> {
        Ok(self.records.read().get(name).cloned())
    }

    async fn store(&self, record: &CookieRecord) -> Result<(), Error> {
        self.records.write().insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), Error> {
        self.records.write().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenJar;

    #[async_trait]
    impl CookieJar for BrokenJar {
        async fn load(&self, _name: &str) -> Result<Option<CookieRecord>, Error> {
            Err(Error::Io(std::io::Error::other("disk on fire")))
        }
        async fn store(&self, _record: &CookieRecord) -> Result<(), Error> {
            Err(Error::Io(std::io::Error::other("disk on fire")))
        }
        async fn remove(&self, _name: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn same_jar_yields_same_id() {
        let jar = Arc::new(MemoryCookieJar::new());
        let store = CookieIdentityStore::new(jar.clone(), "visitor_id", 365);

        let first = store.get_or_create().await;
        let second = store.get_or_create().await;
        assert_eq!(first, second);

        // A second store over the same jar sees the same id too.
        let other = CookieIdentityStore::new(jar, "visitor_id", 365);
        assert_eq!(other.get_or_create().await, first);
    }

    #[tokio::test]
    async fn expired_record_is_replaced() {
        let jar = Arc::new(MemoryCookieJar::new());
        jar.store(&CookieRecord {
            name: "visitor_id".into(),
            value: "stale".into(),
            expires_at: Utc::now() - Duration::days(1),
            same_site: SameSite::Lax,
        })
        .await
        .unwrap();

        let store = CookieIdentityStore::new(jar.clone(), "visitor_id", 365);
        let id = store.get_or_create().await;
        assert_ne!(id.visitor_id, "stale");

        let record = jar.load("visitor_id").await.unwrap().unwrap();
        assert_eq!(record.value, id.visitor_id);
        assert!(!record.is_expired());
        assert_eq!(record.same_site, SameSite::Lax);
    }

    #[tokio::test]
    async fn broken_jar_still_yields_an_id() {
        let store = CookieIdentityStore::new(Arc::new(BrokenJar), "visitor_id", 365);
        let id = store.get_or_create().await;
        assert!(!id.visitor_id.is_empty());
    }
}
