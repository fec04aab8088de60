//! File-backed cache in front of a [`Fetch`] implementation, for
//! third-party trust-list runtimes that re-resolve the same URLs on every
//! run. One file per URL; the file's modification time is the freshness
//! marker; writes are atomic so concurrent readers never see a torn file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime};

use anyhow::anyhow;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;

use lote_trust_shared::uri::Uri;

use crate::env;
use crate::fetch::{Fetch, FetchOutcome};
use crate::utils;

const DEFAULT_MAX_AGE_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct HttpCacheConfig {
    pub dir: PathBuf,
    pub max_age: Duration,
}

impl HttpCacheConfig {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn from_env() -> Self {
        let dir: String = env::LOTE_HTTP_CACHE_DIR.required().value;
        let max_age_secs = env::LOTE_HTTP_CACHE_MAX_AGE_SECS
            .default(DEFAULT_MAX_AGE_SECS)
            .value;
        Self::new(dir, Duration::from_secs(max_age_secs))
    }
}

struct UrlLock {
    lock: Arc<AsyncMutex<()>>,
    holders: usize,
}

/// Serves fresh cache files without touching the network; everything else
/// goes to the inner fetcher and successful responses are written back.
/// A per-URL mutex serialises writers to the same cache file; the mutex is
/// dropped once its last holder releases it.
pub struct CachedFetcher {
    inner: Arc<dyn Fetch>,
    config: HttpCacheConfig,
    locks: StdMutex<HashMap<String, UrlLock>>,
}

impl CachedFetcher {
    pub fn new(inner: Arc<dyn Fetch>, config: HttpCacheConfig) -> Self {
        Self {
            inner,
            config,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn cache_file_name(uri: &Uri) -> String {
        format!("cache-{}", hex::encode(Sha256::digest(uri.as_str().as_bytes())))
    }

    fn cache_path(&self, uri: &Uri) -> PathBuf {
        self.config.dir.join(Self::cache_file_name(uri))
    }

    fn acquire(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("url lock table poisoned");
        let entry = locks.entry(key.to_owned()).or_insert_with(|| UrlLock {
            lock: Arc::new(AsyncMutex::new(())),
            holders: 0,
        });
        entry.holders += 1;
        Arc::clone(&entry.lock)
    }

    fn release(&self, key: &str) {
        let mut locks = self.locks.lock().expect("url lock table poisoned");
        if let Some(entry) = locks.get_mut(key) {
            entry.holders -= 1;
            if entry.holders == 0 {
                locks.remove(key);
            }
        }
    }

    fn read_fresh(&self, path: &Path) -> Option<String> {
        let modified = std::fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age >= self.config.max_age {
            tracing::debug!("Cache file {path:?} is {}s old, refetching", age.as_secs());
            return None;
        }
        utils::read_string(path)
            .inspect_err(|e| tracing::debug!("Failed to read cache file {path:?}: {e:?}"))
            .ok()
    }

    async fn fetch_locked(&self, uri: &Uri) -> anyhow::Result<FetchOutcome> {
        let path = self.cache_path(uri);
        if let Some(content) = self.read_fresh(&path) {
            tracing::debug!(uri = %uri, "Serving {uri} from cache file {path:?}");
            return Ok(FetchOutcome::Loaded(content));
        }

        let outcome = self.inner.fetch(uri).await?;
        if let FetchOutcome::Loaded(body) = &outcome {
            std::fs::create_dir_all(&self.config.dir)
                .map_err(|e| anyhow!("Failed to create cache dir {:?}: {e:#?}", self.config.dir))?;
            utils::atomic_write(&path, body.as_bytes())
                .map_err(|e| anyhow!("Failed to write cache file {path:?}: {e:#?}"))?;
            tracing::debug!(uri = %uri, "Wrote cache file {path:?}");
        }
        Ok(outcome)
    }
}

#[async_trait]
impl Fetch for CachedFetcher {
    async fn fetch(&self, uri: &Uri) -> anyhow::Result<FetchOutcome> {
        let key = Self::cache_file_name(uri);
        let lock = self.acquire(&key);
        let result = {
            let _guard = lock.lock().await;
            self.fetch_locked(uri).await
        };
        self.release(&key);
        result
    }
}
