use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use tradegate_core::*;
use uuid::Uuid;

/// A venue error the simulator raises instead of answering a method.
#[derive(Debug, Clone, Deserialize)]
pub struct FailureFixture {
    pub name: String,
    pub message: String,
}

/// Canned venue state, in the unified payload shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VenueFixture {
    #[serde(default)]
    pub markets: Vec<Value>,
    /// Tickers keyed by symbol.
    #[serde(default)]
    pub tickers: Map<String, Value>,
    /// `fetch_balance` payload: per-currency `{free, used, total}` objects.
    #[serde(default)]
    pub balance: Map<String, Value>,
    #[serde(default)]
    pub orders: Vec<Value>,
    #[serde(default)]
    pub positions: Vec<Value>,
    /// Methods that fail, keyed by method name.
    #[serde(default)]
    pub failures: HashMap<String, FailureFixture>,
}

#[derive(Default)]
struct VenueState {
    orders: Vec<Value>,
    leverage: HashMap<String, Value>,
    failures: HashMap<String, FailureFixture>,
    calls: HashMap<String, usize>,
}

/// An in-process venue serving fixture data.
///
/// Orders created through `create_order` rest on the book until cancelled;
/// market orders fill immediately.
pub struct SimulatedVenue {
    id: String,
    markets: Vec<Value>,
    tickers: Map<String, Value>,
    balance: Map<String, Value>,
    positions: Vec<Value>,
    latency: Option<Duration>,
    state: Mutex<VenueState>,
}

impl SimulatedVenue {
    pub fn new(id: impl Into<String>, fixture: VenueFixture) -> Self {
        Self {
            id: id.into(),
            markets: fixture.markets,
            tickers: fixture.tickers,
            balance: fixture.balance,
            positions: fixture.positions,
            latency: None,
            state: Mutex::new(VenueState {
                orders: fixture.orders,
                failures: fixture.failures,
                ..Default::default()
            }),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make `method` fail with a venue error until cleared.
    pub fn fail(&self, method: &str, name: &str, message: &str) {
        self.state().failures.insert(
            method.to_string(),
            FailureFixture {
                name: name.to_string(),
                message: message.to_string(),
            },
        );
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Number of times `method` reached the venue.
    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    /// Leverage last set for `symbol`.
    pub fn leverage(&self, symbol: &str) -> Option<Value> {
        self.state().leverage.get(symbol).cloned()
    }

    fn state(&self) -> MutexGuard<'_, VenueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn respond(&self, method: &str, params: &[Value]) -> Result<Value, ConnectorError> {
        let mut state = self.state();
        *state.calls.entry(method.to_string()).or_insert(0) += 1;
        if let Some(failure) = state.failures.get(method) {
            return Err(ConnectorError::venue(&failure.name, &failure.message));
        }

        let symbol = params.first().and_then(Value::as_str);
        match method {
            "load_markets" => Ok(Value::Null),
            "fetch_markets" => Ok(Value::Array(self.markets.clone())),
            "fetch_tickers" => Ok(Value::Object(self.tickers.clone())),
            "fetch_ticker" => symbol
                .and_then(|s| self.tickers.get(s))
                .cloned()
                .ok_or_else(|| {
                    ConnectorError::venue("BadSymbol", format!("{} does not have market symbol {:?}", self.id, symbol))
                }),
            "fetch_balance" => Ok(Value::Object(self.balance.clone())),
            "fetch_orders" => Ok(select_orders(&state.orders, symbol, |_| true)),
            "fetch_open_orders" => Ok(select_orders(&state.orders, symbol, is_open)),
            "fetch_closed_orders" => Ok(select_orders(&state.orders, symbol, |o| !is_open(o))),
            "fetch_positions" => Ok(Value::Array(self.positions.clone())),
            "create_order" => Ok(create_order(&mut state.orders, params)),
            "cancel_order" => {
                let id = params.first().and_then(id_string).unwrap_or_default();
                state
                    .orders
                    .iter_mut()
                    .find(|o| o.get("id").and_then(id_string).as_deref() == Some(id.as_str()) && is_open(o))
                    .map(|order| {
                        order["status"] = json!("canceled");
                        order.clone()
                    })
                    .ok_or_else(|| ConnectorError::venue("OrderNotFound", format!("{} order {} not found", self.id, id)))
            }
            "cancel_all_orders" => {
                let cancelled: Vec<Value> = state
                    .orders
                    .iter_mut()
                    .filter(|o| is_open(o) && symbol_matches(o, symbol))
                    .map(|order| {
                        order["status"] = json!("canceled");
                        order.clone()
                    })
                    .collect();
                Ok(Value::Array(cancelled))
            }
            "set_leverage" => {
                let leverage = params.first().cloned().unwrap_or(Value::Null);
                let symbol = params.get(1).and_then(Value::as_str).unwrap_or_default().to_string();
                state.leverage.insert(symbol.clone(), leverage.clone());
                Ok(json!({"symbol": symbol, "leverage": leverage}))
            }
            other => Err(ConnectorError::NotSupported(format!("{}.{}", self.id, other))),
        }
    }
}

#[async_trait]
impl Connector for SimulatedVenue {
    fn venue_id(&self) -> &str {
        &self.id
    }

    async fn load_markets(&self) -> Result<(), ConnectorError> {
        self.call("load_markets", &[]).await.map(|_| ())
    }

    async fn call(&self, method: &str, params: &[Value]) -> Result<Value, ConnectorError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        debug!(venue = %self.id, method, "Simulated call");
        self.respond(method, params)
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_open(order: &Value) -> bool {
    order.get("status").and_then(Value::as_str) == Some("open")
}

fn symbol_matches(order: &Value, symbol: Option<&str>) -> bool {
    symbol.map_or(true, |s| order.get("symbol").and_then(Value::as_str) == Some(s))
}

fn select_orders(orders: &[Value], symbol: Option<&str>, keep: impl Fn(&Value) -> bool) -> Value {
    Value::Array(
        orders
            .iter()
            .filter(|o| symbol_matches(o, symbol) && keep(o))
            .cloned()
            .collect(),
    )
}

/// `[symbol, type, side, amount, price, params]`
fn create_order(orders: &mut Vec<Value>, params: &[Value]) -> Value {
    let arg = |i: usize| params.get(i).cloned().unwrap_or(Value::Null);
    let order_type = arg(1);
    let extra = arg(5);
    let status = if order_type.as_str() == Some("market") { "closed" } else { "open" };
    let trigger = extra
        .get("stopPrice")
        .or_else(|| extra.get("stop_price"))
        .or_else(|| extra.get("triggerPrice"))
        .cloned()
        .unwrap_or(Value::Null);
    let amount = arg(3);

    let order = json!({
        "id": Uuid::new_v4().to_string(),
        "symbol": arg(0),
        "type": order_type,
        "side": arg(2),
        "amount": amount.clone(),
        "price": arg(4),
        "triggerPrice": trigger,
        "filled": if status == "closed" { amount } else { json!(0) },
        "status": status,
        "timestamp": Utc::now().timestamp_millis(),
    });
    orders.push(order.clone());
    order
}

/// Hands out simulated venues by venue id.
///
/// Every account on the same venue shares one simulator instance.
#[derive(Default)]
pub struct SimulatedConnectorFactory {
    venues: HashMap<String, Arc<SimulatedVenue>>,
}

impl SimulatedConnectorFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, venue: Arc<SimulatedVenue>) {
        self.venues.insert(venue.id.clone(), venue);
    }

    pub fn with_venue(mut self, venue: Arc<SimulatedVenue>) -> Self {
        self.insert(venue);
        self
    }

    pub fn venue(&self, id: &str) -> Option<Arc<SimulatedVenue>> {
        self.venues.get(id).cloned()
    }
}

impl ConnectorFactory for SimulatedConnectorFactory {
    fn connect(&self, account: &Account) -> Result<Arc<dyn Connector>, ConnectorError> {
        let venue = self
            .venues
            .get(&account.venue)
            .ok_or_else(|| ConnectorError::NotSupported(format!("no simulated venue {}", account.venue)))?;
        Ok(venue.clone() as Arc<dyn Connector>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn venue() -> SimulatedVenue {
        let fixture: VenueFixture = serde_json::from_value(json!({
            "markets": [{"id": "BTCUSDT", "symbol": "BTC/USDT", "base": "BTC", "quote": "USDT"}],
            "tickers": {"BTC/USDT": {"symbol": "BTC/USDT", "bid": 29990, "ask": 30010}},
            "orders": [
                {"id": "1", "symbol": "BTC/USDT", "type": "limit", "side": "buy", "amount": 1,
                 "price": 29000, "status": "open", "timestamp": 1000},
                {"id": "2", "symbol": "BTC/USDT", "type": "limit", "side": "sell", "amount": 1,
                 "price": 31000, "status": "closed", "timestamp": 2000}
            ]
        }))
        .unwrap();
        SimulatedVenue::new("binance", fixture)
    }

    #[tokio::test]
    async fn test_open_and_closed_orders() {
        let venue = venue();
        let open = venue.call("fetch_open_orders", &[json!("BTC/USDT")]).await.unwrap();
        assert_eq!(open.as_array().unwrap().len(), 1);
        let closed = venue.call("fetch_closed_orders", &[]).await.unwrap();
        assert_eq!(closed[0]["id"], "2");
        assert_eq!(venue.calls("fetch_open_orders"), 1);
    }

    #[tokio::test]
    async fn test_create_then_cancel() {
        let venue = venue();
        let order = venue
            .call(
                "create_order",
                &[json!("BTC/USDT"), json!("limit"), json!("buy"), json!(2), json!(28000), json!({})],
            )
            .await
            .unwrap();
        assert_eq!(order["status"], "open");

        let id = order["id"].clone();
        let cancelled = venue.call("cancel_order", &[id.clone(), json!("BTC/USDT")]).await.unwrap();
        assert_eq!(cancelled["status"], "canceled");

        let again = venue.call("cancel_order", &[id, json!("BTC/USDT")]).await;
        assert!(matches!(again, Err(ConnectorError::Venue { ref name, .. }) if name == "OrderNotFound"));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let venue = venue();
        venue.fail("create_order", "InsufficientFunds", "binance {\"error\":\"Insufficient margin\"}");
        let err = venue.call("create_order", &[]).await.unwrap_err();
        assert_eq!(err.name(), "InsufficientFunds");

        venue.clear_failures();
        assert!(venue.call("fetch_markets", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let err = venue().call("fetch_funding_rate", &[]).await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotSupported(_)));
    }

    #[test]
    fn test_factory_by_venue() {
        let factory = SimulatedConnectorFactory::new().with_venue(Arc::new(venue()));
        let account = Account {
            tenant: TenantId::GLOBAL,
            stub: "b1".into(),
            venue: "binance".into(),
            shortname: "main".into(),
            testnet: false,
            credentials: Credentials::default(),
        };
        assert_eq!(factory.connect(&account).unwrap().venue_id(), "binance");

        let other = Account {
            venue: "kraken".into(),
            ..account
        };
        assert!(factory.connect(&other).is_err());
    }
}
