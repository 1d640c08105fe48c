use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;
use tradegate_core::*;

type SettingKey = (TenantId, String, String);

/// Settings kept in process memory, stored in their encoded form so that reads
/// go through the same decode path as persisted rows.
#[derive(Default)]
pub struct MemorySettingsStore {
    rows: RwLock<BTreeMap<SettingKey, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows_for(&self, tenant: TenantId, mainkey: &str, subkey: Option<&str>) -> Vec<(String, String)> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());
        rows.iter()
            .filter(|((t, m, s), _)| {
                *t == tenant && m == mainkey && subkey.map_or(true, |sub| s == sub)
            })
            .map(|((_, _, s), v)| (s.clone(), v.clone()))
            .collect()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: Option<&str>,
    ) -> Result<Option<SettingValue>, SettingsError> {
        let tenant = resolve_tenant(tenant, mainkey);
        Ok(collapse_rows(self.rows_for(tenant, mainkey, subkey)))
    }

    async fn entries(&self, tenant: TenantId, mainkey: &str) -> Result<Vec<(String, SettingValue)>, SettingsError> {
        let tenant = resolve_tenant(tenant, mainkey);
        let mut rows = self.rows_for(tenant, mainkey, None);
        rows.sort();
        Ok(rows
            .into_iter()
            .map(|(subkey, raw)| (subkey, SettingValue::decode(&raw)))
            .collect())
    }

    async fn set(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: &str,
        value: &SettingValue,
    ) -> Result<bool, SettingsError> {
        let tenant = resolve_tenant(tenant, mainkey);
        let encoded = value.encode();
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let previous = rows.insert((tenant, mainkey.to_string(), subkey.to_string()), encoded.clone());
        debug!(%tenant, mainkey, subkey, "Setting stored");
        Ok(previous.as_deref() != Some(encoded.as_str()))
    }

    async fn delete(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: Option<&str>,
    ) -> Result<bool, SettingsError> {
        let tenant = resolve_tenant(tenant, mainkey);
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());
        let before = rows.len();
        rows.retain(|(t, m, s), _| {
            !(*t == tenant && m == mainkey && subkey.map_or(true, |sub| s == sub))
        });
        Ok(rows.len() < before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn tenant() -> TenantId {
        TenantId::new(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemorySettingsStore::new();
        let t = tenant();

        assert!(store.set(t, "normalizer:binance", "stablecoins", &SettingValue::from(json!(["USDT"]))).await.unwrap());
        let value = store.get(t, "normalizer:binance", Some("stablecoins")).await.unwrap();
        assert_eq!(value, Some(SettingValue::Json(json!(["USDT"]))));

        assert!(store.delete(t, "normalizer:binance", Some("stablecoins")).await.unwrap());
        assert_eq!(store.get(t, "normalizer:binance", Some("stablecoins")).await.unwrap(), None);
        assert!(!store.delete(t, "normalizer:binance", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = MemorySettingsStore::new();
        let (a, b) = (tenant(), tenant());
        store.set(a, "cache", "balances", &SettingValue::from(10u64)).await.unwrap();
        assert_eq!(store.get(b, "cache", Some("balances")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_global_keys_are_shared() {
        let store = MemorySettingsStore::new();
        let (a, b) = (tenant(), tenant());
        store.set(a, "core", "debug", &SettingValue::from(true)).await.unwrap();
        assert_eq!(
            store.get(b, "core", Some("debug")).await.unwrap(),
            Some(SettingValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_main_key_lookup_collapses_rows() {
        let store = MemorySettingsStore::new();
        let t = tenant();
        store.set(t, "cache", "balances", &SettingValue::from(10u64)).await.unwrap();
        store.set(t, "cache", "symbols", &SettingValue::from(600u64)).await.unwrap();
        assert_eq!(
            store.get(t, "cache", None).await.unwrap(),
            Some(SettingValue::Json(json!({"balances": 10, "symbols": 600})))
        );
    }

    #[tokio::test]
    async fn test_entries_keep_subkeys() {
        let store = MemorySettingsStore::new();
        let t = tenant();
        store.set(t, "cache", "symbols", &SettingValue::from(600u64)).await.unwrap();
        assert_eq!(
            store.entries(t, "cache").await.unwrap(),
            vec![("symbols".to_string(), SettingValue::from(600u64))]
        );

        store.set(t, "cache", "fetch_ticker", &SettingValue::from(30u64)).await.unwrap();
        let subkeys: Vec<String> = store.entries(t, "cache").await.unwrap().into_iter().map(|(s, _)| s).collect();
        assert_eq!(subkeys, ["fetch_ticker", "symbols"]);
        assert!(store.entries(tenant(), "cache").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_or_default_persists_default() {
        let store = MemorySettingsStore::new();
        let t = tenant();
        let value = store
            .get_or_default(t, "normalizer:ftx", "market_map", SettingValue::from("{currency}/USD"))
            .await
            .unwrap();
        assert_eq!(value, SettingValue::Text("{currency}/USD".into()));
        assert_eq!(
            store.get(t, "normalizer:ftx", Some("market_map")).await.unwrap(),
            Some(SettingValue::Text("{currency}/USD".into()))
        );
    }

    #[tokio::test]
    async fn test_unchanged_write_reports_no_change() {
        let store = MemorySettingsStore::new();
        let t = tenant();
        assert!(store.set(t, "cache", "balances", &SettingValue::from(5u64)).await.unwrap());
        assert!(!store.set(t, "cache", "balances", &SettingValue::from(5u64)).await.unwrap());
    }
}
