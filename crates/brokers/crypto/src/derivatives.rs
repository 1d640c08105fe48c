use serde_json::{json, Map, Value};
use tradegate_core::*;

use crate::unified;

/// Spelling of order parameters a derivatives venue expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `reduce_only`, `post_only`, `stop_price` (Deribit-style).
    Snake,
    /// `reduceOnly`, `timeInForce: PostOnly`, `triggerPrice` (Bybit-style).
    Camel,
}

/// Profile for perpetual/futures venues with positions and adjustable leverage.
#[derive(Debug, Clone)]
pub struct DerivativesVenue {
    id: String,
    stablecoins: Vec<String>,
    noise: Vec<String>,
    sizing: OrderSizing,
    style: ParamStyle,
}

impl DerivativesVenue {
    pub fn new(id: &str, stablecoins: &[&str], sizing: OrderSizing, style: ParamStyle) -> Self {
        Self {
            id: id.to_string(),
            stablecoins: stablecoins.iter().map(|s| s.to_string()).collect(),
            noise: vec![id.to_string()],
            sizing,
            style,
        }
    }

    /// Deribit sizes inverse contracts in USD.
    pub fn deribit() -> Self {
        Self::new("deribit", &["USD"], OrderSizing::Quote, ParamStyle::Snake)
    }

    pub fn bybit() -> Self {
        Self::new("bybit", &["USDT", "USDC"], OrderSizing::Base, ParamStyle::Camel)
    }
}

impl VenueProfile for DerivativesVenue {
    fn id(&self) -> &str {
        &self.id
    }

    fn stablecoins(&self) -> &[String] {
        &self.stablecoins
    }

    fn error_noise(&self) -> &[String] {
        &self.noise
    }

    fn order_sizing(&self) -> OrderSizing {
        self.sizing
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

    fn positions_request(&self) -> Option<VenueCall> {
        Some(VenueCall::new("fetch_positions", Vec::new()))
    }

    fn parse_position(&self, raw: &Value, market: Option<&Market>) -> Option<Position> {
        unified::parse_position(raw, market)
    }

    fn leverage_request(&self, params: &LeverageParams, market: &Market) -> Option<VenueCall> {
        let mut extra = Map::new();
        if let Some(mode) = params.mode {
            extra.insert("marginMode".into(), json!(mode));
        }
        Some(VenueCall::new(
            "set_leverage",
            vec![json!(params.leverage), json!(market.symbol), Value::Object(extra)],
        ))
    }

    fn custom_params(&self, options: &OrderOptions) -> Value {
        let mut params = Map::new();
        match self.style {
            ParamStyle::Snake => {
                if options.reduce_only {
                    params.insert("reduce_only".into(), json!(true));
                }
                if options.post_only {
                    params.insert("post_only".into(), json!(true));
                }
                if let Some(trigger) = options.trigger {
                    params.insert("stop_price".into(), json!(trigger));
                    params.insert("trigger".into(), json!("last_price"));
                }
            }
            ParamStyle::Camel => {
                if options.reduce_only {
                    params.insert("reduceOnly".into(), json!(true));
                }
                if options.post_only {
                    params.insert("timeInForce".into(), json!("PostOnly"));
                }
                if let Some(trigger) = options.trigger {
                    params.insert("triggerPrice".into(), json!(trigger));
                }
            }
        }
        Value::Object(params)
    }
}
