use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use tradegate_core::*;

use crate::error::NormalizerError;

/// Identity of the binding a call runs for. Part of every cache key and stat name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallScope {
    pub tenant: TenantId,
    pub stub: String,
    pub shortname: String,
}

type FlightMap = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Wraps dispatched calls with a per-method TTL cache and stats recording.
///
/// Failures never escape `run`; they come back as `Outcome::Error`.
pub struct CacheExecutor {
    scope: CallScope,
    cache: Arc<dyn CacheStore>,
    stats: Arc<dyn StatsRecorder>,
    ttls: RwLock<HashMap<String, Duration>>,
    coalesce: bool,
    inflight: Arc<FlightMap>,
}

impl CacheExecutor {
    pub fn new(
        scope: CallScope,
        cache: Arc<dyn CacheStore>,
        stats: Arc<dyn StatsRecorder>,
        ttls: HashMap<String, Duration>,
        coalesce: bool,
    ) -> Self {
        Self {
            scope,
            cache,
            stats,
            ttls: RwLock::new(ttls),
            coalesce,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn scope(&self) -> &CallScope {
        &self.scope
    }

    pub fn ttl(&self, method: &str) -> Option<Duration> {
        self.ttls
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(method)
            .copied()
    }

    /// Set the cache lifetime of `method`. Zero disables caching for it.
    pub fn set_cache_time(&self, method: &str, secs: u64) {
        let mut ttls = self.ttls.write().unwrap_or_else(|e| e.into_inner());
        if secs == 0 {
            ttls.remove(method);
        } else {
            ttls.insert(method.to_string(), Duration::from_secs(secs));
        }
    }

    /// SHA-256 of `tenant|stub|kind|method|params`, hex encoded.
    pub fn cache_key(&self, kind: CallKind, method: &str, params: &[Value]) -> String {
        let serialized = serde_json::to_string(params).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(
            [
                self.scope.tenant.to_string().as_str(),
                self.scope.stub.as_str(),
                kind.as_str(),
                method,
                serialized.as_str(),
            ]
            .join("|"),
        );
        format!("{:x}", hasher.finalize())
    }

    /// Run one call through the cache.
    ///
    /// Cache hits return without invoking `call`. Successful non-null results
    /// are written back when the method has a TTL, including `no_cache` runs.
    pub async fn run<F, Fut>(
        &self,
        kind: CallKind,
        method: &str,
        params: &[Value],
        no_cache: bool,
        call: F,
    ) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, NormalizerError>>,
    {
        let mut stat = MethodStat::start(&self.scope.shortname, &self.scope.stub, kind, method);
        let Some(ttl) = self.ttl(method) else {
            let result = call().await;
            return self.finish(stat, result);
        };
        let key = self.cache_key(kind, method, params);

        let mut _flight = None;
        if !no_cache {
            if let Some(value) = self.cache.get(&key).await {
                stat.cached = true;
                return self.finish(stat, Ok(value));
            }
            if self.coalesce {
                _flight = Some(Flight::acquire(&self.inflight, &key).await);
                if let Some(value) = self.cache.get(&key).await {
                    debug!(method, "Served coalesced miss from cache");
                    stat.cached = true;
                    return self.finish(stat, Ok(value));
                }
            }
        }

        let result = call().await;
        if let Ok(value) = &result {
            if !value.is_null() {
                self.cache.set(&key, value.clone(), ttl).await;
            }
        }
        self.finish(stat, result)
    }

    fn finish(&self, stat: MethodStat, result: Result<Value, NormalizerError>) -> Outcome {
        match result {
            Ok(value) => {
                self.stats.record(stat.end(true));
                Outcome::Success(value)
            }
            Err(err) => {
                debug!(
                    stub = %self.scope.stub,
                    method = %stat.method,
                    error = %err,
                    "Dispatched call failed"
                );
                self.stats.record(stat.end(false));
                Outcome::Error(err.into())
            }
        }
    }
}

/// Exclusive right to call through for one cache key.
struct Flight {
    key: String,
    map: Arc<FlightMap>,
    _guard: OwnedMutexGuard<()>,
}

impl Flight {
    async fn acquire(map: &Arc<FlightMap>, key: &str) -> Self {
        let lock = map
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.to_string())
            .or_default()
            .clone();
        Self {
            key: key.to_string(),
            map: map.clone(),
            _guard: lock.lock_owned().await,
        }
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(|e| e.into_inner());
        // The map and our guard hold the only references once nobody waits.
        if map.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) <= 2) {
            map.remove(&self.key);
        }
    }
}
