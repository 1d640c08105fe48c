use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};
use tradegate_core::*;

use crate::error::{BindingError, NormalizerError};

/// A tenant's stub bound to a lazily built venue connector.
///
/// The connector is created on first use. If creating it fails the next call
/// tries again.
pub struct AccountBinding {
    account: Account,
    factory: Arc<dyn ConnectorFactory>,
    connector: OnceCell<Arc<dyn Connector>>,
}

impl AccountBinding {
    pub fn new(account: Account, factory: Arc<dyn ConnectorFactory>) -> Self {
        Self {
            account,
            factory,
            connector: OnceCell::new(),
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.account.tenant
    }

    pub fn stub(&self) -> &str {
        &self.account.stub
    }

    pub fn venue(&self) -> &str {
        &self.account.venue
    }

    pub fn shortname(&self) -> &str {
        &self.account.shortname
    }

    pub fn is_connected(&self) -> bool {
        self.connector.initialized()
    }

    pub async fn connector(&self) -> Result<Arc<dyn Connector>, BindingError> {
        self.connector
            .get_or_try_init(|| async {
                let connector = self.factory.connect(&self.account)?;
                if let Err(err) = connector.load_markets().await {
                    warn!(stub = %self.account.stub, error = %err, "Could not load markets");
                }
                info!(
                    stub = %self.account.stub,
                    venue = %self.account.venue,
                    testnet = self.account.testnet,
                    "Connected account"
                );
                Ok::<_, BindingError>(connector)
            })
            .await
            .cloned()
    }

    /// Forward one call to the venue connector.
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value, NormalizerError> {
        let connector = self.connector().await?;
        Ok(connector.call(method, params).await?)
    }
}
