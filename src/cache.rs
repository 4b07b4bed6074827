//! TTL read-through cache fronting the REST client.
//!
//! The cache is shared mutable state read by independent callers (stream
//! list, stream detail, log viewer), so the map itself is a `DashMap`. The
//! contract is the TTL/force-refresh/invalidation semantics; a failed fetch
//! is never stored, so errors cannot poison the cache.

use crate::client::LogApiClient;
use crate::config::CacheConfig;
use crate::error::EngineError;
use crate::models::{
    AlertRule, LogRecord, QueryRequest, RetentionInfo, SavedFilter, SchemaField, ServerInfo,
    StreamInfo, StreamStats,
};
use dashmap::DashMap;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Streams,
    Schema,
    Stats,
    Retention,
    ServerInfo,
    SavedFilters,
    Alerts,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub key: Option<String>,
}

impl CacheKey {
    fn collection(kind: ResourceKind) -> Self {
        Self { kind, key: None }
    }

    fn keyed(kind: ResourceKind, key: &str) -> Self {
        Self {
            kind,
            key: Some(key.to_string()),
        }
    }
}

#[derive(Clone)]
enum CachedValue {
    Streams(Arc<Vec<StreamInfo>>),
    Schema(Arc<Vec<SchemaField>>),
    Stats(Arc<StreamStats>),
    Retention(Arc<RetentionInfo>),
    ServerInfo(Arc<ServerInfo>),
    SavedFilters(Arc<Vec<SavedFilter>>),
    Alerts(Arc<Vec<AlertRule>>),
}

struct CacheEntry {
    value: CachedValue,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_valid(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

pub struct CachingQueryGateway {
    client: Arc<dyn LogApiClient>,
    cache: DashMap<CacheKey, CacheEntry>,
    ttls: CacheConfig,
    // Concurrency ceiling for the stats fan-out; imposes no ordering.
    stats_gate: Arc<Semaphore>,
}

impl CachingQueryGateway {
    pub fn new(client: Arc<dyn LogApiClient>, ttls: CacheConfig, stats_concurrency: usize) -> Self {
        Self {
            client,
            cache: DashMap::new(),
            ttls,
            stats_gate: Arc::new(Semaphore::new(stats_concurrency.max(1))),
        }
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        self.cache
            .get(key)
            .filter(|entry| entry.is_valid())
            .map(|entry| entry.value.clone())
    }

    fn store(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        self.cache.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove matching entries. Collection kinds drop their single entry;
    /// per-stream kinds drop either the exact key or, with `key = None`,
    /// every entry of that kind.
    pub fn invalidate(&self, kind: ResourceKind, key: Option<&str>) {
        match key {
            Some(key) => {
                self.cache.remove(&CacheKey::keyed(kind, key));
            }
            None => {
                self.cache.retain(|k, _| k.kind != kind);
            }
        }
        tracing::debug!(?kind, key, "cache invalidated");
    }

    /// Drop everything. Used on logout, reconfigure, or credential change.
    pub fn invalidate_all(&self) {
        self.cache.clear();
    }

    /// Interactive and live-tail queries pass straight through; query
    /// results are never cached.
    pub async fn query(&self, request: QueryRequest) -> Result<Vec<LogRecord>, EngineError> {
        self.client.query(request).await
    }

    pub async fn get_streams(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<Vec<StreamInfo>>, EngineError> {
        let key = CacheKey::collection(ResourceKind::Streams);
        if !force_refresh {
            if let Some(CachedValue::Streams(cached)) = self.lookup(&key) {
                return Ok(cached);
            }
        }
        let fetched = Arc::new(self.client.list_streams().await?);
        self.store(
            key,
            CachedValue::Streams(fetched.clone()),
            self.ttls.streams_ttl(),
        );
        Ok(fetched)
    }

    pub async fn get_schema(
        &self,
        stream: &str,
        force_refresh: bool,
    ) -> Result<Arc<Vec<SchemaField>>, EngineError> {
        let key = CacheKey::keyed(ResourceKind::Schema, stream);
        if !force_refresh {
            if let Some(CachedValue::Schema(cached)) = self.lookup(&key) {
                return Ok(cached);
            }
        }
        let fetched = Arc::new(self.client.get_schema(stream).await?);
        self.store(
            key,
            CachedValue::Schema(fetched.clone()),
            self.ttls.schema_ttl(),
        );
        Ok(fetched)
    }

    pub async fn get_stats(
        &self,
        stream: &str,
        force_refresh: bool,
    ) -> Result<Arc<StreamStats>, EngineError> {
        let key = CacheKey::keyed(ResourceKind::Stats, stream);
        if !force_refresh {
            if let Some(CachedValue::Stats(cached)) = self.lookup(&key) {
                return Ok(cached);
            }
        }
        let fetched = Arc::new(self.client.get_stream_stats(stream).await?);
        self.store(
            key,
            CachedValue::Stats(fetched.clone()),
            self.ttls.stats_ttl(),
        );
        Ok(fetched)
    }

    pub async fn get_retention(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<RetentionInfo>, EngineError> {
        let key = CacheKey::collection(ResourceKind::Retention);
        if !force_refresh {
            if let Some(CachedValue::Retention(cached)) = self.lookup(&key) {
                return Ok(cached);
            }
        }
        let fetched = Arc::new(self.client.get_retention().await?);
        self.store(
            key,
            CachedValue::Retention(fetched.clone()),
            self.ttls.retention_ttl(),
        );
        Ok(fetched)
    }

    pub async fn get_server_info(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<ServerInfo>, EngineError> {
        let key = CacheKey::collection(ResourceKind::ServerInfo);
        if !force_refresh {
            if let Some(CachedValue::ServerInfo(cached)) = self.lookup(&key) {
                return Ok(cached);
            }
        }
        let fetched = Arc::new(self.client.get_server_info().await?);
        self.store(
            key,
            CachedValue::ServerInfo(fetched.clone()),
            self.ttls.server_info_ttl(),
        );
        Ok(fetched)
    }

    pub async fn get_saved_filters(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<Vec<SavedFilter>>, EngineError> {
        let key = CacheKey::collection(ResourceKind::SavedFilters);
        if !force_refresh {
            if let Some(CachedValue::SavedFilters(cached)) = self.lookup(&key) {
                return Ok(cached);
            }
        }
        let fetched = Arc::new(self.client.list_saved_filters().await?);
        self.store(
            key,
            CachedValue::SavedFilters(fetched.clone()),
            self.ttls.saved_filters_ttl(),
        );
        Ok(fetched)
    }

    pub async fn get_alerts(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<Vec<AlertRule>>, EngineError> {
        let key = CacheKey::collection(ResourceKind::Alerts);
        if !force_refresh {
            if let Some(CachedValue::Alerts(cached)) = self.lookup(&key) {
                return Ok(cached);
            }
        }
        let fetched = Arc::new(self.client.list_alerts().await?);
        self.store(
            key,
            CachedValue::Alerts(fetched.clone()),
            self.ttls.alerts_ttl(),
        );
        Ok(fetched)
    }

    // Mutations invalidate the affected collections before returning, so the
    // next read reflects the change even within TTL.

    pub async fn delete_stream(&self, stream: &str) -> Result<(), EngineError> {
        self.client.delete_stream(stream).await?;
        self.invalidate(ResourceKind::Streams, None);
        self.invalidate(ResourceKind::Schema, Some(stream));
        self.invalidate(ResourceKind::Stats, Some(stream));
        Ok(())
    }

    pub async fn delete_alert(&self, name: &str) -> Result<(), EngineError> {
        self.client.delete_alert(name).await?;
        self.invalidate(ResourceKind::Alerts, None);
        Ok(())
    }

    pub async fn create_saved_filter(
        &self,
        filter: SavedFilter,
    ) -> Result<SavedFilter, EngineError> {
        let created = self.client.create_saved_filter(filter).await?;
        self.invalidate(ResourceKind::SavedFilters, None);
        Ok(created)
    }

    pub async fn delete_saved_filter(&self, id: &str) -> Result<(), EngineError> {
        self.client.delete_saved_filter(id).await?;
        self.invalidate(ResourceKind::SavedFilters, None);
        Ok(())
    }

    /// Fetch stats for many streams with a bounded number of in-flight
    /// requests. Results come back in completion order.
    pub async fn fetch_all_stream_stats(
        &self,
        streams: &[String],
        force_refresh: bool,
    ) -> Vec<(String, Result<Arc<StreamStats>, EngineError>)> {
        futures::stream::iter(streams.iter().cloned().map(|name| {
            let gate = self.stats_gate.clone();
            async move {
                let _permit = match gate.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (name, Err(EngineError::Cancelled)),
                };
                let stats = self.get_stats(&name, force_refresh).await;
                (name, stats)
            }
        }))
        .buffer_unordered(streams.len().max(1))
        .collect()
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_entry_validity() {
        let entry = CacheEntry {
            value: CachedValue::Retention(Arc::new(RetentionInfo { retention_days: None })),
            fetched_at: Instant::now(),
            ttl: Duration::from_secs(30),
        };
        assert!(entry.is_valid());

        let expired = CacheEntry {
            value: entry.value.clone(),
            fetched_at: Instant::now() - Duration::from_secs(31),
            ttl: Duration::from_secs(30),
        };
        assert!(!expired.is_valid());
    }

    #[test]
    fn test_cache_key_equality() {
        assert_eq!(
            CacheKey::keyed(ResourceKind::Schema, "app"),
            CacheKey::keyed(ResourceKind::Schema, "app")
        );
        assert_ne!(
            CacheKey::keyed(ResourceKind::Schema, "app"),
            CacheKey::keyed(ResourceKind::Stats, "app")
        );
        assert_ne!(
            CacheKey::keyed(ResourceKind::Schema, "app"),
            CacheKey::collection(ResourceKind::Schema)
        );
    }
}
