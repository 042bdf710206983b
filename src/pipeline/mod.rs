use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheStore;
use crate::error::FetchError;

/// Source-specific upstream logic: performs the outbound calls and turns
/// the responses into typed records.
#[async_trait]
pub trait Fetcher<T>: Send + Sync {
    async fn fetch(&self) -> Result<Vec<T>, FetchError>;
}

/// Fetch-then-persist unit shared by the scheduler and by cache-miss reads.
pub struct RefreshPipeline<T> {
    name: String,
    fetcher: Arc<dyn Fetcher<T>>,
    store: Arc<dyn CacheStore<T>>,
}

impl<T: Clone + Send + Sync + 'static> RefreshPipeline<T> {
    pub fn new(
        name: impl Into<String>,
        fetcher: Arc<dyn Fetcher<T>>,
        store: Arc<dyn CacheStore<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            fetcher,
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetches unconditionally and writes the result to the store.
    ///
    /// On failure the store is left untouched. Persistence problems are
    /// logged only; the fetched records are returned either way.
    pub async fn refresh(&self) -> Result<Vec<T>, FetchError> {
        tracing::info!("[{}] Fetching fresh data from upstream", self.name);

        let records = match self.fetcher.fetch().await {
            Ok(records) => records,
            Err(e) => {
                if e.is_timeout() {
                    tracing::error!("[{}] Upstream timed out: {}", self.name, e);
                } else {
                    tracing::error!("[{}] Fetch failed: {}", self.name, e);
                }
                return Err(e);
            }
        };

        match self.store.put(&records).await {
            Ok(report) if report.failed > 0 => tracing::warn!(
                "[{}] Stored {} records, failed to store {}",
                self.name,
                report.stored,
                report.failed
            ),
            Ok(report) => tracing::info!(
                "[{}] Stored {}/{} records in {}",
                self.name,
                report.stored,
                records.len(),
                self.store.key()
            ),
            Err(e) => tracing::warn!(
                "[{}] Failed to persist {} records: {:#}",
                self.name,
                records.len(),
                e
            ),
        }

        Ok(records)
    }

    /// Serves from the store when it holds fresh data, otherwise refreshes.
    /// `force_refresh` skips the store lookup.
    pub async fn read(&self, force_refresh: bool) -> Result<Vec<T>, FetchError> {
        if force_refresh {
            tracing::info!("[{}] Refresh requested, bypassing cache", self.name);
        } else {
            match self.store.get().await {
                Ok(Some(cached)) => {
                    tracing::info!(
                        "[{}] Cache hit: {} records fetched at {}",
                        self.name,
                        cached.records.len(),
                        cached.fetched_at
                    );
                    return Ok(cached.records);
                }
                Ok(None) => tracing::info!("[{}] Cache miss: no recent data", self.name),
                Err(e) => tracing::warn!(
                    "[{}] Cache miss due to store error: {:#}",
                    self.name,
                    e
                ),
            }
        }

        self.refresh().await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubFetcher;
    use super::*;
    use crate::cache::{CachedRecordSet, FreshnessWindow, MemoryCache, PutReport};
    use std::time::Duration;

    fn pipeline(
        fetcher: Arc<StubFetcher<u32>>,
        window: Duration,
    ) -> (RefreshPipeline<u32>, Arc<MemoryCache<u32>>) {
        let store = Arc::new(MemoryCache::new(
            "numbers",
            Arc::new(FreshnessWindow::new(window)),
        ));
        let pipeline = RefreshPipeline::new("numbers", fetcher, store.clone());
        (pipeline, store)
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore<u32> for BrokenStore {
        fn key(&self) -> &str {
            "broken"
        }

        async fn get(&self) -> anyhow::Result<Option<CachedRecordSet<u32>>> {
            anyhow::bail!("disk I/O error")
        }

        async fn put(&self, _records: &[u32]) -> anyhow::Result<PutReport> {
            anyhow::bail!("disk I/O error")
        }
    }

    #[tokio::test]
    async fn test_cache_hit_never_calls_upstream() {
        let fetcher = Arc::new(StubFetcher::new(vec![1, 2]));
        let (pipeline, store) = pipeline(fetcher.clone(), Duration::from_secs(60));
        store.put(&[9]).await.unwrap();

        for _ in 0..5 {
            assert_eq!(pipeline.read(false).await.unwrap(), vec![9]);
        }
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_miss_fetches_once_and_populates() {
        let fetcher = Arc::new(StubFetcher::new(vec![1, 2]));
        let (pipeline, store) = pipeline(fetcher.clone(), Duration::from_secs(60));

        assert_eq!(pipeline.read(false).await.unwrap(), vec![1, 2]);
        assert_eq!(pipeline.read(false).await.unwrap(), vec![1, 2]);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.peek().await.unwrap().records, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_expired_window_triggers_exactly_one_refresh() {
        let fetcher = Arc::new(StubFetcher::new(vec![1]));
        let (pipeline, store) = pipeline(fetcher.clone(), Duration::from_millis(50));

        pipeline.read(false).await.unwrap();
        let first = store.peek().await.unwrap().fetched_at;
        assert_eq!(fetcher.calls(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        fetcher.set_records(vec![2]);

        assert_eq!(pipeline.read(false).await.unwrap(), vec![2]);
        assert_eq!(fetcher.calls(), 2);
        let second = store.peek().await.unwrap().fetched_at;
        assert!(second >= first);
    }

    #[tokio::test]
    async fn test_forced_refresh_bypasses_fresh_entry() {
        let fetcher = Arc::new(StubFetcher::new(vec![5]));
        let (pipeline, store) = pipeline(fetcher.clone(), Duration::from_secs(60));
        store.put(&[1]).await.unwrap();

        assert_eq!(pipeline.read(true).await.unwrap(), vec![5]);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(store.peek().await.unwrap().records, vec![5]);
    }

    #[tokio::test]
    async fn test_failure_without_prior_entry_leaves_store_empty() {
        let fetcher = Arc::new(StubFetcher::failing());
        let (pipeline, store) = pipeline(fetcher.clone(), Duration::from_secs(60));

        let err = pipeline.read(false).await.unwrap_err();
        assert!(!err.to_string().is_empty());
        assert!(store.peek().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_with_stale_entry_is_surfaced_and_entry_kept() {
        let fetcher = Arc::new(StubFetcher::failing());
        let (pipeline, store) = pipeline(fetcher.clone(), Duration::ZERO);
        store.put(&[3]).await.unwrap();

        assert!(pipeline.read(false).await.is_err());
        assert_eq!(store.peek().await.unwrap().records, vec![3]);
    }

    #[tokio::test]
    async fn test_store_errors_become_misses_and_do_not_fail_refresh() {
        let fetcher = Arc::new(StubFetcher::new(vec![4, 2]));
        let pipeline = RefreshPipeline::<u32>::new("broken", fetcher.clone(), Arc::new(BrokenStore));

        assert_eq!(pipeline.read(false).await.unwrap(), vec![4, 2]);
        assert_eq!(pipeline.refresh().await.unwrap(), vec![4, 2]);
        assert_eq!(fetcher.calls(), 2);
    }
}
