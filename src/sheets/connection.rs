use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{StoreConnector, TableStore};
use crate::error::AppResult;

/// Default handle lifetime (1 hour)
pub const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry {
    handle: Arc<dyn TableStore>,
    created_at: Instant,
}

/// Memoized table handle with a time-to-live and explicit invalidation
pub struct ConnectionCache {
    connector: Arc<dyn StoreConnector>,
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn StoreConnector>, ttl: Duration) -> Self {
        Self {
            connector,
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// Cached handle if still fresh, otherwise a new connection.
    /// `Ok(None)` when the backend is not configured.
    pub async fn get(&self) -> AppResult<Option<Arc<dyn TableStore>>> {
        {
            let entry = self.entry.read().await;
            if let Some(ref cached) = *entry {
                if cached.created_at.elapsed() < self.ttl {
                    return Ok(Some(cached.handle.clone()));
                }
            }
        }

        let mut entry = self.entry.write().await;
        // Another task may have reconnected while we waited for the lock
        if let Some(ref cached) = *entry {
            if cached.created_at.elapsed() < self.ttl {
                return Ok(Some(cached.handle.clone()));
            }
        }

        let handle = self.connector.connect().await?;
        *entry = handle.as_ref().map(|handle| CacheEntry {
            handle: handle.clone(),
            created_at: Instant::now(),
        });
        Ok(handle)
    }

    /// Drops the cached handle; the next `get` reconnects.
    pub async fn invalidate(&self) {
        if self.entry.write().await.take().is_some() {
            tracing::debug!("Connection cache invalidated");
        }
    }

    pub fn configuration_problem(&self) -> Option<String> {
        self.connector.configuration_problem()
    }

    pub fn is_configured(&self) -> bool {
        self.configuration_problem().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::MemoryTable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConnector {
        table: Arc<MemoryTable>,
        connects: AtomicUsize,
    }

    #[tonic::async_trait]
    impl StoreConnector for CountingConnector {
        async fn connect(&self) -> AppResult<Option<Arc<dyn TableStore>>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.table.clone()))
        }

        fn configuration_problem(&self) -> Option<String> {
            None
        }
    }

    fn counting() -> Arc<CountingConnector> {
        Arc::new(CountingConnector {
            table: Arc::new(MemoryTable::new("Tabelle1")),
            connects: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_handle_is_reused_within_ttl() {
        let connector = counting();
        let cache = ConnectionCache::new(connector.clone(), DEFAULT_CONNECTION_TTL);
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_handle_is_refreshed() {
        let connector = counting();
        let cache = ConnectionCache::new(connector.clone(), Duration::ZERO);
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reconnect() {
        let connector = counting();
        let cache = ConnectionCache::new(connector.clone(), DEFAULT_CONNECTION_TTL);
        cache.get().await.unwrap();
        cache.invalidate().await;
        let handle = cache.get().await.unwrap().unwrap();
        assert_eq!(handle.table_name(), "Tabelle1");
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }
}
