use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tradegate_core::*;

/// Cache lifetimes, in seconds, for methods that are cached by default.
pub const DEFAULT_CACHE_TTLS: [(&str, u64); 12] = [
    ("balances", 5),
    ("position", 2),
    ("market", 60),
    ("symbols", 300),
    ("fetch_markets", 60),
    ("fetch_tickers", 5),
    ("fetch_orders", 5),
    ("fetch_open_orders", 5),
    ("fetch_closed_orders", 5),
    ("get_market_by_id", 5),
    ("get_market_by_symbol", 5),
    ("get_market_by_id_or_symbol", 5),
];

/// Deployment-wide normalizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Age after which the market index is rebuilt on the next call.
    pub market_refresh_secs: u64,
    /// Serialize concurrent misses on the same cache key so only one calls through.
    pub coalesce_misses: bool,
    /// Per-method TTL overrides in seconds; `0` disables caching for the method.
    pub cache_ttl: BTreeMap<String, u64>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            market_refresh_secs: 60,
            coalesce_misses: true,
            cache_ttl: BTreeMap::new(),
        }
    }
}

impl NormalizerConfig {
    /// The default TTL table with this config's overrides applied.
    pub fn cache_ttls(&self) -> HashMap<String, Duration> {
        let mut ttls: HashMap<String, u64> = DEFAULT_CACHE_TTLS
            .iter()
            .map(|(method, secs)| (method.to_string(), *secs))
            .collect();
        ttls.extend(self.cache_ttl.iter().map(|(m, s)| (m.clone(), *s)));
        ttls.into_iter()
            .filter(|(_, secs)| *secs > 0)
            .map(|(method, secs)| (method, Duration::from_secs(secs)))
            .collect()
    }

    pub fn market_refresh(&self) -> Duration {
        Duration::from_secs(self.market_refresh_secs)
    }
}

/// Collaborators shared by every normalizer.
#[derive(Clone)]
pub struct NormalizerContext {
    pub cache: Arc<dyn CacheStore>,
    pub stats: Arc<dyn StatsRecorder>,
    pub settings: Arc<dyn SettingsStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub connectors: Arc<dyn ConnectorFactory>,
    pub venues: Arc<dyn VenueCatalog>,
    pub config: NormalizerConfig,
}
