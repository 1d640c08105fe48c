use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tradegate_core::*;

use crate::binding::AccountBinding;
use crate::context::NormalizerContext;
use crate::error::BindingError;
use crate::normalizer::Normalizer;

/// Main key of per-method cache lifetime overrides.
const CACHE_SETTINGS: &str = "cache";

/// Normalizers by tenant and stub, created on first use.
pub struct NormalizerPool {
    context: NormalizerContext,
    normalizers: Mutex<HashMap<(TenantId, String), Arc<Normalizer>>>,
}

impl NormalizerPool {
    pub fn new(context: NormalizerContext) -> Self {
        Self {
            context,
            normalizers: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &NormalizerContext {
        &self.context
    }

    /// The normalizer bound to `stub`, building it with the tenant's settings on first use.
    pub async fn get(&self, tenant: TenantId, stub: &str) -> Result<Arc<Normalizer>, BindingError> {
        let key = (tenant, stub.to_string());
        if let Some(existing) = self.normalizers.lock().await.get(&key) {
            return Ok(existing.clone());
        }

        let normalizer = Arc::new(self.build(tenant, stub).await?);
        let mut normalizers = self.normalizers.lock().await;
        Ok(normalizers.entry(key).or_insert(normalizer).clone())
    }

    async fn build(&self, tenant: TenantId, stub: &str) -> Result<Normalizer, BindingError> {
        let account = self
            .context
            .accounts
            .account(tenant, stub)
            .await?
            .ok_or_else(|| BindingError::UnknownAccount {
                tenant,
                stub: stub.to_string(),
            })?;
        let venue = self
            .context
            .venues
            .profile(&account.venue)
            .ok_or_else(|| BindingError::UnknownVenue(account.venue.clone()))?;

        let venue_key = format!("normalizer:{}", account.venue);
        let stablecoins = self
            .context
            .settings
            .get(tenant, &venue_key, Some("stablecoins"))
            .await?
            .and_then(|value| value.as_string_list());

        let binding = AccountBinding::new(account, self.context.connectors.clone());
        let mut normalizer = Normalizer::new(binding, venue, &self.context);
        if let Some(stablecoins) = stablecoins {
            debug!(stub, ?stablecoins, "Stablecoins overridden");
            normalizer = normalizer.with_stablecoins(stablecoins);
        }

        for (method, value) in self.context.settings.entries(tenant, CACHE_SETTINGS).await? {
            match value.as_u64() {
                Some(secs) => {
                    debug!(stub, method = %method, secs, "Cache time overridden");
                    normalizer.set_cache_time(&method, secs);
                }
                None => warn!(stub, method = %method, "Ignoring non-numeric cache time"),
            }
        }

        info!(%tenant, stub, venue = %normalizer.venue().id(), "Normalizer created");
        Ok(normalizer)
    }

    /// Dispatch `method` for the stub. Binding failures come back as error envelopes.
    pub async fn execute(&self, tenant: TenantId, stub: &str, method: &str, params: Value, no_cache: bool) -> Outcome {
        match self.get(tenant, stub).await {
            Ok(normalizer) => normalizer.execute_with(method, params, no_cache).await,
            Err(err) => Outcome::Error(ErrorData::new(binding_error_name(&err), err.to_string())),
        }
    }

    /// Drop the stub's normalizer. The next call rebuilds it from current settings.
    pub async fn remove(&self, tenant: TenantId, stub: &str) -> bool {
        self.normalizers
            .lock()
            .await
            .remove(&(tenant, stub.to_string()))
            .is_some()
    }

    pub async fn len(&self) -> usize {
        self.normalizers.lock().await.len()
    }
}

fn binding_error_name(err: &BindingError) -> &str {
    match err {
        BindingError::UnknownAccount { .. } => "UnknownAccount",
        BindingError::UnknownVenue(_) => "UnknownVenue",
        BindingError::Account(_) => "AccountError",
        BindingError::Settings(_) => "SettingsError",
        BindingError::Connector(err) => err.name(),
    }
}
