use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// The full set of records cached under one data-source key.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRecordSet<T> {
    pub records: Vec<T>,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of a `put`: each record is persisted independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutReport {
    pub stored: usize,
    pub failed: usize,
}

/// Storage for the latest fetched record set of one data source.
///
/// `get` only reports fresh data: an absent or stale entry is `Ok(None)`.
/// Implementations must tolerate concurrent calls from the scheduler and
/// from in-flight requests.
#[async_trait]
pub trait CacheStore<T>: Send + Sync {
    fn key(&self) -> &str;

    async fn get(&self) -> anyhow::Result<Option<CachedRecordSet<T>>>;

    async fn put(&self, records: &[T]) -> anyhow::Result<PutReport>;
}

#[derive(Debug, Clone, Copy)]
struct Extension {
    window: Duration,
    since: Instant,
}

/// Maximum age a cached set may have and still count as a hit.
///
/// The window can be stretched temporarily (see [`FreshnessWindow::extend`])
/// so that an upstream which is rate limiting us is left alone for a while.
#[derive(Debug)]
pub struct FreshnessWindow {
    base: Duration,
    extension: Mutex<Option<Extension>>,
}

impl FreshnessWindow {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            extension: Mutex::new(None),
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// The window in effect right now.
    pub fn current(&self) -> Duration {
        let mut guard = self
            .extension
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(ext) = *guard {
            if ext.since.elapsed() < ext.window {
                return ext.window;
            }
            *guard = None;
        }
        self.base
    }

    /// Widens the window to `base + extra` until that widened window has
    /// itself elapsed.
    pub fn extend(&self, extra: Duration) {
        let window = self.base + extra;
        tracing::warn!("Extending freshness window to {:?}", window);
        let mut guard = self
            .extension
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Extension {
            window,
            since: Instant::now(),
        });
    }

    pub fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // A stamp in the future (clock step) counts as age zero.
        let age = (now - fetched_at).to_std().unwrap_or(Duration::ZERO);
        age < self.current()
    }
}

/// In-memory variant of [`CacheStore`]: one guarded cell holding the latest
/// snapshot. Reads take the shared lock, writes the exclusive one.
pub struct MemoryCache<T> {
    key: String,
    data: RwLock<Option<CachedRecordSet<T>>>,
    window: Arc<FreshnessWindow>,
}

impl<T: Clone + Send + Sync> MemoryCache<T> {
    pub fn new(key: impl Into<String>, window: Arc<FreshnessWindow>) -> Self {
        Self {
            key: key.into(),
            data: RwLock::new(None),
            window,
        }
    }

    /// Latest snapshot regardless of age.
    #[cfg(test)]
    pub(crate) async fn peek(&self) -> Option<CachedRecordSet<T>> {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> CacheStore<T> for MemoryCache<T> {
    fn key(&self) -> &str {
        &self.key
    }

    async fn get(&self) -> anyhow::Result<Option<CachedRecordSet<T>>> {
        let guard = self.data.read().await;
        if let Some(ref cached) = *guard {
            if self.window.is_fresh(cached.fetched_at, Utc::now()) {
                return Ok(Some(cached.clone()));
            }
        }
        Ok(None)
    }

    async fn put(&self, records: &[T]) -> anyhow::Result<PutReport> {
        let mut guard = self.data.write().await;
        let now = Utc::now();
        // Last write wins, but the stamp never moves backwards.
        let fetched_at = match guard.as_ref() {
            Some(prev) if prev.fetched_at > now => prev.fetched_at,
            _ => now,
        };
        *guard = Some(CachedRecordSet {
            records: records.to_vec(),
            fetched_at,
        });
        Ok(PutReport {
            stored: records.len(),
            failed: 0,
        })
    }
}
