use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Tenant & Account
// ---------------------------------------------------------------------------

/// Identity of the tenant on whose behalf a call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub Uuid);

impl TenantId {
    /// The shared namespace used for settings that are not tenant-scoped.
    pub const GLOBAL: TenantId = TenantId(Uuid::nil());

    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn is_global(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::GLOBAL
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// API credentials for a venue account.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub passphrase: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("secret", &redact(&self.secret))
            .field("passphrase", &redact(&self.passphrase))
            .finish()
    }
}

/// A tenant's account on one venue, addressed by its stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub tenant: TenantId,
    pub stub: String,
    /// Venue identifier (e.g. "binance", "deribit").
    pub venue: String,
    /// Human-readable account name used in stats and logs.
    pub shortname: String,
    #[serde(default)]
    pub testnet: bool,
    #[serde(default)]
    pub credentials: Credentials,
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    #[default]
    Spot,
    Future,
    Swap,
    Option,
}

/// Symbols of the stablecoin-quoted markets used to value a market in USD.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsdPairs {
    pub base: Option<String>,
    pub quote: Option<String>,
}

/// USD valuation of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UsdValuation {
    /// The market is quoted in a stablecoin; its average price is already USD.
    Direct(Decimal),
    /// USD prices of the base and quote assets, derived through stablecoin markets.
    Triangulated {
        base: Option<Decimal>,
        quote: Option<Decimal>,
        pairs: UsdPairs,
    },
}

/// A tradeable market in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Venue-native identifier.
    pub id: String,
    /// Canonical `BASE/QUOTE` symbol.
    pub symbol: String,
    pub base: String,
    pub quote: String,
    #[serde(default)]
    pub kind: MarketKind,
    pub contract_size: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub avg: Option<Decimal>,
    #[serde(default)]
    pub usd: Option<UsdValuation>,
}

impl Market {
    /// Midpoint of the current book, if both sides are known.
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }
}

/// Latest top-of-book snapshot for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// USD value of a balance (or of a set of balances).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUsd {
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
}

/// A single currency balance valued in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    /// USD price of one unit; `None` when no market could price the currency.
    pub price: Option<Decimal>,
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
    pub usd: BalanceUsd,
}

impl Balance {
    pub fn new(
        currency: impl Into<String>,
        price: Option<Decimal>,
        free: Decimal,
        used: Decimal,
        total: Decimal,
    ) -> Self {
        let rate = price.unwrap_or(Decimal::ZERO);
        Self {
            currency: currency.into(),
            price,
            free,
            used,
            total,
            usd: BalanceUsd {
                free: free * rate,
                used: used * rate,
                total: total * rate,
            },
        }
    }

    pub fn is_priced(&self) -> bool {
        self.price.is_some()
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Parse a venue side string ("buy", "BUY", "sell", "Sell").
    pub fn from_venue(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" | "bid" | "long" => Some(Side::Buy),
            "sell" | "ask" | "short" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    TakeProfit,
    TakeProfitLimit,
    #[serde(other)]
    Other,
}

impl OrderType {
    /// Map the many spellings venues use onto the canonical order types.
    pub fn from_venue(s: &str) -> Self {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "market" => OrderType::Market,
            "limit" => OrderType::Limit,
            "stop" | "stop_market" | "stop_loss" => OrderType::Stop,
            "stop_limit" | "stop_loss_limit" => OrderType::StopLimit,
            "take_profit" | "take_profit_market" | "take_market" => OrderType::TakeProfit,
            "take_profit_limit" | "take_limit" => OrderType::TakeProfitLimit,
            _ => OrderType::Other,
        }
    }
}

/// The lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    Closed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn from_venue(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "open" | "new" | "untriggered" | "partially_filled" => OrderStatus::Open,
            "closed" | "filled" => OrderStatus::Closed,
            "canceled" | "cancelled" | "expired" | "rejected" => OrderStatus::Cancelled,
            _ => OrderStatus::Unknown,
        }
    }
}

/// An order in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub direction: Side,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    /// Trigger price for stop / take-profit orders.
    pub trigger: Option<Decimal>,
    pub filled: Option<Decimal>,
    pub status: OrderStatus,
    /// Creation time. Venues occasionally omit it; such orders sort last.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }
}

/// Filter applied to order listings and cancellations. Absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Side>,
}

impl OrderFilter {
    /// The filter used when the caller gives none: every order.
    pub fn all() -> Self {
        Self {
            id: Some("all".to_string()),
            ..Default::default()
        }
    }

    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Default::default()
        }
    }

    /// Client-side status/type/direction match.
    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.status == s)
            && self.order_type.map_or(true, |t| order.order_type == t)
            && self.direction.map_or(true, |d| order.direction == d)
    }
}

/// Parameters for creating an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderParams {
    /// Market id or canonical symbol.
    pub symbol: String,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: Side,
    pub amount: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Venue-specific extra parameters (see `custom_params`).
    #[serde(default)]
    pub params: Option<Value>,
}

/// Normalized order-creation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Result envelope for order creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum OrderResult {
    Success {
        params: CreateOrderParams,
        order: Order,
    },
    Error {
        params: CreateOrderParams,
        error: OrderError,
    },
}

impl OrderResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OrderResult::Success { .. })
    }
}

/// Options translated into venue-specific order parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderOptions {
    #[serde(default, rename = "type")]
    pub order_type: Option<OrderType>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub post_only: bool,
    #[serde(default)]
    pub trigger: Option<Decimal>,
}

/// Whether a venue sizes orders in base or quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSizing {
    Base,
    Quote,
}

// ---------------------------------------------------------------------------
// Positions & Leverage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionDirection {
    Long,
    Short,
}

/// An open derivatives position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub direction: PositionDirection,
    /// Size in base units (contracts converted where the venue reports contracts).
    pub size: Decimal,
    pub entry_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub liquidation_price: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub usd_size: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginMode {
    Cross,
    Isolated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageParams {
    pub symbol: String,
    pub leverage: Decimal,
    #[serde(default)]
    pub mode: Option<MarginMode>,
}

// ---------------------------------------------------------------------------
// Result envelope
// ---------------------------------------------------------------------------

/// Name and message of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorData {
    pub name: String,
    pub message: String,
}

impl ErrorData {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Uniform outcome of a dispatched call: `{"result": "success"|"error", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", content = "data", rename_all = "lowercase")]
pub enum Outcome {
    Success(Value),
    Error(ErrorData),
}

impl Outcome {
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Outcome::Error(ErrorData::new(name, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn into_result(self) -> Result<Value, ErrorData> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Error(err) => Err(err),
        }
    }
}

/// A filtered lookup: the single match, or every match when there is not exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Selection<T> {
    pub fn from_matches(mut matches: Vec<T>) -> Self {
        if matches.len() == 1 {
            Selection::One(matches.remove(0))
        } else {
            Selection::Many(matches)
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            Selection::One(item) => vec![item],
            Selection::Many(items) => items,
        }
    }
}

impl<T> Default for Selection<T> {
    fn default() -> Self {
        Selection::Many(Vec::new())
    }
}
