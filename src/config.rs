use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    /// Concurrency ceiling for the per-stream stats fan-out.
    pub stats_concurrency: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5080/api/default".to_string(),
            timeout_seconds: 30,
            stats_concurrency: 6,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub streams_ttl_seconds: u64,
    pub schema_ttl_seconds: u64,
    pub stats_ttl_seconds: u64,
    pub retention_ttl_seconds: u64,
    pub server_info_ttl_seconds: u64,
    pub saved_filters_ttl_seconds: u64,
    pub alerts_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            streams_ttl_seconds: 30,
            schema_ttl_seconds: 120,
            stats_ttl_seconds: 30,
            retention_ttl_seconds: 300,
            server_info_ttl_seconds: 300,
            saved_filters_ttl_seconds: 60,
            alerts_ttl_seconds: 60,
        }
    }
}

impl CacheConfig {
    pub fn streams_ttl(&self) -> Duration {
        Duration::from_secs(self.streams_ttl_seconds)
    }
    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_ttl_seconds)
    }
    pub fn stats_ttl(&self) -> Duration {
        Duration::from_secs(self.stats_ttl_seconds)
    }
    pub fn retention_ttl(&self) -> Duration {
        Duration::from_secs(self.retention_ttl_seconds)
    }
    pub fn server_info_ttl(&self) -> Duration {
        Duration::from_secs(self.server_info_ttl_seconds)
    }
    pub fn saved_filters_ttl(&self) -> Duration {
        Duration::from_secs(self.saved_filters_ttl_seconds)
    }
    pub fn alerts_ttl(&self) -> Duration {
        Duration::from_secs(self.alerts_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    pub base_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Consecutive failures before a transient "retrying" banner shows.
    pub warn_threshold: u32,
    /// Consecutive failures that halt streaming with a persistent error.
    pub fatal_threshold: u32,
    /// Buffer cap; oldest records drop first once exceeded.
    pub max_buffer: usize,
    /// Per-tick row cap.
    pub tick_limit: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 2000,
            max_interval_ms: 30_000,
            warn_threshold: 3,
            fatal_threshold: 5,
            max_buffer: 1000,
            tick_limit: 200,
        }
    }
}

impl StreamingConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Quiet period before a search burst commits.
    pub debounce_ms: u64,
    /// Initial interactive result limit; load-more grows by `page_size`.
    pub default_limit: usize,
    pub page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            default_limit: 100,
            page_size: 100,
        }
    }
}

pub fn load_config() -> anyhow::Result<EngineConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name("streamtail").required(false))
        .add_source(config::Environment::with_prefix("STREAMTAIL").separator("__"))
        .build()?;

    let cfg: EngineConfig = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &EngineConfig) -> anyhow::Result<()> {
    if cfg.api.base_url.is_empty() {
        anyhow::bail!("api.base_url must not be empty");
    }
    if cfg.api.stats_concurrency == 0 {
        anyhow::bail!("api.stats_concurrency must be at least 1");
    }
    if cfg.streaming.base_interval_ms == 0 {
        anyhow::bail!("streaming.base_interval_ms must be positive");
    }
    if cfg.streaming.max_interval_ms < cfg.streaming.base_interval_ms {
        anyhow::bail!("streaming.max_interval_ms must be >= base_interval_ms");
    }
    if cfg.streaming.fatal_threshold <= cfg.streaming.warn_threshold {
        anyhow::bail!("streaming.fatal_threshold must exceed warn_threshold");
    }
    if cfg.streaming.max_buffer == 0 || cfg.streaming.tick_limit == 0 {
        anyhow::bail!("streaming buffer and tick limits must be positive");
    }
    if cfg.search.page_size == 0 || cfg.search.default_limit == 0 {
        anyhow::bail!("search limits must be positive");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = EngineConfig::default();
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.streaming.fatal_threshold, 5);
        assert_eq!(cfg.streaming.warn_threshold, 3);
        assert_eq!(cfg.search.debounce_ms, 300);
        assert_eq!(cfg.cache.schema_ttl(), Duration::from_secs(120));
    }

    #[test]
    fn test_validation_rejects_inverted_intervals() {
        let mut cfg = EngineConfig::default();
        cfg.streaming.max_interval_ms = 100;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut cfg = EngineConfig::default();
        cfg.api.stats_concurrency = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_validation_rejects_warn_at_or_above_fatal() {
        let mut cfg = EngineConfig::default();
        cfg.streaming.warn_threshold = 5;
        assert!(validate_config(&cfg).is_err());
    }
}
