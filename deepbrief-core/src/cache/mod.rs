//! Content-addressed cache for provider responses.
//!
//! Entries are keyed by the SHA-256 of the serialized request parameters and
//! scoped by provider category, each with its own time-to-live. The gateway
//! never fails a caller: storage errors are logged and read as misses.

pub mod fs;
pub mod memory;

use crate::budget::ProviderClass;
use crate::config::{CacheBackend, CacheConfig};
use crate::error::CacheError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub use fs::FsCacheStore;
pub use memory::MemoryCacheStore;

/// A stored provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub category: ProviderClass,
    pub payload: serde_json::Value,
    pub written_at: SystemTime,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.written_at)
            .unwrap_or(Duration::ZERO)
    }
}

/// Storage behind the gateway.
pub trait CacheStore: Send + Sync {
    fn load(&self, category: ProviderClass, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn store(&self, entry: &CacheEntry) -> Result<(), CacheError>;
    fn remove(&self, category: ProviderClass, key: &str) -> Result<(), CacheError>;
    /// Remove every entry, or only those of one category. Returns the count removed.
    fn clear(&self, category: Option<ProviderClass>) -> Result<usize, CacheError>;
}

/// Stable cache key for a set of request parameters.
pub fn cache_key<P: Serialize + ?Sized>(params: &P) -> Result<String, CacheError> {
    let bytes = serde_json::to_vec(params).map_err(|e| CacheError::Encode {
        message: e.to_string(),
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Read-through cache shared by every run of an engine.
pub struct CacheGateway {
    store: Option<Box<dyn CacheStore>>,
    config: CacheConfig,
}

impl CacheGateway {
    pub fn new(store: Box<dyn CacheStore>, config: CacheConfig) -> Self {
        Self {
            store: Some(store),
            config,
        }
    }

    /// A gateway where every lookup misses.
    pub fn disabled() -> Self {
        Self {
            store: None,
            config: CacheConfig {
                backend: CacheBackend::Disabled,
                ..CacheConfig::default()
            },
        }
    }

    /// A process-local gateway with default TTLs.
    pub fn in_memory() -> Self {
        Self::new(
            Box::new(MemoryCacheStore::new()),
            CacheConfig {
                backend: CacheBackend::Memory,
                ..CacheConfig::default()
            },
        )
    }

    /// Build the gateway selected by configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.backend {
            CacheBackend::Memory => Self::new(Box::new(MemoryCacheStore::new()), config.clone()),
            CacheBackend::Filesystem => Self::new(
                Box::new(FsCacheStore::new(config.resolved_dir())),
                config.clone(),
            ),
            CacheBackend::Disabled => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Look up a cached response. Expired entries are purged and read as misses.
    pub fn get<P, T>(&self, category: ProviderClass, params: &P) -> Option<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.store.as_ref()?;
        let key = key_or_miss(category, params)?;
        let payload = self.load_fresh(category, &key)?;
        decode(category, &key, payload)
    }

    /// [`get`](Self::get) for callers on a runtime thread. Store I/O runs on
    /// the blocking pool.
    pub async fn fetch<P, T>(self: &Arc<Self>, category: ProviderClass, params: &P) -> Option<T>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.store.as_ref()?;
        let key = key_or_miss(category, params)?;
        let gateway = Arc::clone(self);
        let lookup = key.clone();
        let payload =
            match tokio::task::spawn_blocking(move || gateway.load_fresh(category, &lookup)).await {
                Ok(payload) => payload?,
                Err(e) => {
                    warn!(category = %category, error = %e, "Cache read task failed, treating as miss");
                    return None;
                }
            };
        decode(category, &key, payload)
    }

    /// Store a response. Failures are logged and swallowed.
    pub fn put<P, T>(&self, category: ProviderClass, params: &P, payload: &T)
    where
        P: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        if self.store.is_none() {
            return;
        }
        match entry_for(category, params, payload) {
            Ok(entry) => self.write(&entry),
            Err(e) => warn!(category = %category, error = %e, "Cache write failed"),
        }
    }

    /// [`put`](Self::put) for callers on a runtime thread. Store I/O runs on
    /// the blocking pool.
    pub async fn save<P, T>(self: &Arc<Self>, category: ProviderClass, params: &P, payload: &T)
    where
        P: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        if self.store.is_none() {
            return;
        }
        let entry = match entry_for(category, params, payload) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(category = %category, error = %e, "Cache write failed");
                return;
            }
        };
        let gateway = Arc::clone(self);
        if let Err(e) = tokio::task::spawn_blocking(move || gateway.write(&entry)).await {
            warn!(category = %category, error = %e, "Cache write task failed");
        }
    }

    /// Load an unexpired payload, purging the entry if it has aged out.
    fn load_fresh(&self, category: ProviderClass, key: &str) -> Option<serde_json::Value> {
        let store = self.store.as_ref()?;
        let entry = match store.load(category, key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(category = %category, key = %short(key), "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(category = %category, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        if entry.age() >= self.config.ttl_for(category) {
            debug!(category = %category, key = %short(key), "Cache entry expired");
            if let Err(e) = store.remove(category, key) {
                warn!(category = %category, error = %e, "Failed to purge expired cache entry");
            }
            return None;
        }
        Some(entry.payload)
    }

    fn write(&self, entry: &CacheEntry) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if let Err(e) = store.store(entry) {
            warn!(category = %entry.category, error = %e, "Cache write failed");
        }
    }

    /// Remove entries from the underlying store.
    pub fn clear(&self, category: Option<ProviderClass>) -> Result<usize, CacheError> {
        match self.store.as_ref() {
            Some(store) => store.clear(category),
            None => Ok(0),
        }
    }
}

fn key_or_miss<P: Serialize + ?Sized>(category: ProviderClass, params: &P) -> Option<String> {
    match cache_key(params) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(category = %category, error = %e, "Cache key unavailable, treating as miss");
            None
        }
    }
}

fn entry_for<P, T>(category: ProviderClass, params: &P, payload: &T) -> Result<CacheEntry, CacheError>
where
    P: Serialize + ?Sized,
    T: Serialize + ?Sized,
{
    let key = cache_key(params)?;
    let payload = serde_json::to_value(payload).map_err(|e| CacheError::Encode {
        message: e.to_string(),
    })?;
    Ok(CacheEntry {
        key,
        category,
        payload,
        written_at: SystemTime::now(),
    })
}

fn decode<T: DeserializeOwned>(
    category: ProviderClass,
    key: &str,
    payload: serde_json::Value,
) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(value) => {
            debug!(category = %category, key = %short(key), "Cache hit");
            Some(value)
        }
        Err(e) => {
            warn!(category = %category, error = %e, "Cached payload has an unexpected shape");
            None
        }
    }
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}

impl std::fmt::Debug for CacheGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheGateway")
            .field("backend", &self.config.backend)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
