use serde_json::{json, Map, Value};
use tradegate_core::*;

use crate::unified;

/// Profile for spot exchanges that speak the unified payload shape.
///
/// Spot venues have no positions and no leverage.
#[derive(Debug, Clone)]
pub struct SpotVenue {
    id: String,
    stablecoins: Vec<String>,
    noise: Vec<String>,
    market_map: String,
    history: OrderHistory,
}

impl SpotVenue {
    pub fn new(id: &str, stablecoins: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            stablecoins: stablecoins.iter().map(|s| s.to_string()).collect(),
            noise: vec![id.to_string()],
            market_map: "{currency}/{stablecoin}".to_string(),
            history: OrderHistory::Split,
        }
    }

    pub fn with_history(mut self, history: OrderHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_market_map(mut self, template: &str) -> Self {
        self.market_map = template.to_string();
        self
    }

    pub fn binance() -> Self {
        Self::new("binance", &["USDT", "BUSD", "USDC"])
    }

    pub fn coinbase() -> Self {
        Self::new("coinbase", &["USD", "USDC", "USDT"]).with_history(OrderHistory::Unified)
    }
}

impl VenueProfile for SpotVenue {
    fn id(&self) -> &str {
        &self.id
    }

    fn stablecoins(&self) -> &[String] {
        &self.stablecoins
    }

    fn balances_market_map(&self) -> &str {
        &self.market_map
    }

    fn error_noise(&self) -> &[String] {
        &self.noise
    }

    fn order_history(&self) -> OrderHistory {
        self.history
    }

    fn parse_market(&self, raw: &Value, ticker: Option<&Value>) -> Option<Market> {
        unified::parse_market(raw, ticker)
    }

    fn parse_ticker(&self, raw: &Value) -> Option<Ticker> {
        unified::parse_ticker(raw)
    }

    fn parse_order(&self, raw: &Value) -> Option<Order> {
        unified::parse_order(raw)
    }

    fn custom_params(&self, options: &OrderOptions) -> Value {
        let mut params = Map::new();
        if options.post_only {
            params.insert("postOnly".into(), json!(true));
        }
        if let Some(trigger) = options.trigger {
            params.insert("stopPrice".into(), json!(trigger));
        }
        Value::Object(params)
    }
}
