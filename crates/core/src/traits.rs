use crate::events::*;
use crate::models::*;
use crate::settings::SettingValue;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Venue Connector
// ---------------------------------------------------------------------------

/// Errors raised by a venue connector.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectorError {
    /// The venue answered with an error of the given class.
    #[error("{name}: {message}")]
    Venue { name: String, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Method not supported: {0}")]
    NotSupported(String),
}

impl ConnectorError {
    pub fn venue(name: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::Venue {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Error class name, as reported in result envelopes.
    pub fn name(&self) -> &str {
        match self {
            ConnectorError::Venue { name, .. } => name,
            ConnectorError::Network(_) => "NetworkError",
            ConnectorError::Authentication(_) => "AuthenticationError",
            ConnectorError::NotSupported(_) => "NotSupported",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ConnectorError::Venue { message, .. } => message,
            ConnectorError::Network(m)
            | ConnectorError::Authentication(m)
            | ConnectorError::NotSupported(m) => m,
        }
    }
}

impl From<ConnectorError> for ErrorData {
    fn from(err: ConnectorError) -> Self {
        ErrorData::new(err.name(), err.message())
    }
}

/// A credentialed connection to one remote venue.
///
/// `call` is the pass-through surface: method names and payloads are
/// venue-library native (`fetch_balance`, `fetch_markets`, `create_order`, ...).
#[async_trait]
pub trait Connector: Send + Sync {
    fn venue_id(&self) -> &str;

    /// Load the venue's market catalog. Must succeed before other calls are meaningful.
    async fn load_markets(&self) -> Result<(), ConnectorError>;

    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, ConnectorError>;
}

/// Builds connectors from stored accounts.
pub trait ConnectorFactory: Send + Sync {
    fn connect(&self, account: &Account) -> Result<Arc<dyn Connector>, ConnectorError>;
}

// ---------------------------------------------------------------------------
// Cache & Stats
// ---------------------------------------------------------------------------

/// Key/value cache with per-entry time-to-live.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `None` for missing or expired keys.
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Duration);
}

/// Sink for per-call execution stats.
pub trait StatsRecorder: Send + Sync {
    fn record(&self, stat: MethodStat);
}

// ---------------------------------------------------------------------------
// Settings & Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings backend error: {0}")]
    Backend(String),
}

/// Tenant-scoped settings. Global main keys resolve to the shared namespace
/// (see [`crate::settings::resolve_tenant`]).
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// With a subkey, the single value. Without one, every value under the main key.
    async fn get(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: Option<&str>,
    ) -> Result<Option<SettingValue>, SettingsError>;

    /// Every value under the main key with its subkey, ordered by subkey.
    async fn entries(&self, tenant: TenantId, mainkey: &str) -> Result<Vec<(String, SettingValue)>, SettingsError>;

    /// Insert or replace. Returns whether a row changed.
    async fn set(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: &str,
        value: &SettingValue,
    ) -> Result<bool, SettingsError>;

    /// Delete one value, or every value under the main key. Returns whether anything was removed.
    async fn delete(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: Option<&str>,
    ) -> Result<bool, SettingsError>;

    /// Read a value, storing and returning `default` when it is absent.
    async fn get_or_default(
        &self,
        tenant: TenantId,
        mainkey: &str,
        subkey: &str,
        default: SettingValue,
    ) -> Result<SettingValue, SettingsError> {
        match self.get(tenant, mainkey, Some(subkey)).await? {
            Some(value) => Ok(value),
            None => {
                self.set(tenant, mainkey, subkey, &default).await?;
                Ok(default)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Account backend error: {0}")]
    Backend(String),
    #[error("Invalid account {stub}: {reason}")]
    Invalid { stub: String, reason: String },
}

/// Lookup of stored venue accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account(&self, tenant: TenantId, stub: &str) -> Result<Option<Account>, AccountError>;

    async fn accounts(&self, tenant: TenantId) -> Result<Vec<Account>, AccountError>;
}

// ---------------------------------------------------------------------------
// Venue Profiles
// ---------------------------------------------------------------------------

/// A pass-through call a venue profile wants issued.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl VenueCall {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// How a venue exposes its order history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderHistory {
    /// One `fetch_orders` call returns open and closed orders.
    Unified,
    /// Open and closed orders come from `fetch_open_orders` and `fetch_closed_orders`.
    Split,
}

/// Venue-specific normalizer hooks: how a venue's native payloads map onto
/// the canonical types, and which calls it needs for venue-specific features.
pub trait VenueProfile: Send + Sync {
    fn id(&self) -> &str;

    /// Stablecoins in pricing priority order.
    fn stablecoins(&self) -> &[String];

    /// Template for the market that prices a balance currency.
    fn balances_market_map(&self) -> &str {
        "{currency}/{stablecoin}"
    }

    /// Substrings stripped from venue error messages before parsing them.
    fn error_noise(&self) -> &[String];

    fn order_sizing(&self) -> OrderSizing {
        OrderSizing::Base
    }

    fn order_history(&self) -> OrderHistory {
        OrderHistory::Split
    }

    fn parse_market(&self, raw: &Value, ticker: Option<&Value>) -> Option<Market>;

    fn parse_ticker(&self, raw: &Value) -> Option<Ticker>;

    fn parse_order(&self, raw: &Value) -> Option<Order>;

    /// The call listing open positions; `None` for venues without positions.
    fn positions_request(&self) -> Option<VenueCall> {
        None
    }

    fn parse_position(&self, _raw: &Value, _market: Option<&Market>) -> Option<Position> {
        None
    }

    /// The call changing leverage; `None` when the venue does not support it.
    fn leverage_request(&self, _params: &LeverageParams, _market: &Market) -> Option<VenueCall> {
        None
    }

    /// Translate canonical order options into venue order parameters.
    fn custom_params(&self, options: &OrderOptions) -> Value;
}

/// Lookup of venue profiles by venue id.
pub trait VenueCatalog: Send + Sync {
    fn profile(&self, venue: &str) -> Option<Arc<dyn VenueProfile>>;

    fn venues(&self) -> Vec<String>;
}
