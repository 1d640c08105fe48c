use serde_json::{json, Value};
use std::cmp::Ordering;
use tracing::{info, warn};
use tradegate_core::*;

use crate::error::NormalizerError;
use crate::normalizer::Normalizer;
use crate::registry::NormalizerMethod;

/// Id that cancels every open order in scope.
const CANCEL_ALL: &str = "all";

/// Merge two order lists, newest first. Equal timestamps order by id and
/// orders without a timestamp come last.
pub fn merge_orders(a: Vec<Order>, b: Vec<Order>) -> Vec<Order> {
    let mut orders = a;
    orders.extend(b);
    orders.sort_by(|x, y| match y.timestamp.cmp(&x.timestamp) {
        Ordering::Equal => x.id.cmp(&y.id),
        other => other,
    });
    orders
}

/// Parse a venue order list, skipping entries the venue profile rejects.
pub fn parse_orders(venue: &dyn VenueProfile, raw: &Value) -> Vec<Order> {
    match raw {
        Value::Array(entries) => entries.iter().filter_map(|o| venue.parse_order(o)).collect(),
        _ => Vec::new(),
    }
}

/// Human readable text of a venue error.
///
/// Venue errors often embed a JSON body after the venue name. When the
/// message minus `noise` parses as JSON, its `error` string or
/// `error.message` is used; otherwise the message is returned unchanged.
pub fn venue_error_message(message: &str, noise: &[String]) -> String {
    let stripped = noise
        .iter()
        .fold(message.to_string(), |text, n| text.replace(n.as_str(), ""));
    let body: Value = match serde_json::from_str(stripped.trim()) {
        Ok(body) => body,
        Err(_) => return message.to_string(),
    };
    match body.get("error") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Object(error)) => match error.get("message").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => message.to_string(),
        },
        _ => body
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| message.to_string(), str::to_string),
    }
}

impl Normalizer {
    /// Venue symbol for a market id or symbol. Unknown keys pass through.
    async fn resolve_symbol(&self, key: &str) -> Result<String, NormalizerError> {
        let index = self.ensure_markets().await?;
        Ok(index
            .by_id_or_symbol(key)
            .map_or_else(|| key.to_string(), |m| m.symbol.clone()))
    }

    async fn symbol_params(&self, symbol: Option<&str>) -> Result<Vec<Value>, NormalizerError> {
        Ok(match symbol {
            Some(key) => vec![Value::String(self.resolve_symbol(key).await?)],
            None => Vec::new(),
        })
    }

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, NormalizerError> {
        let params = self.symbol_params(symbol).await?;
        let raw = self.through("fetch_open_orders", params).await?;
        Ok(parse_orders(self.venue(), &raw))
    }

    async fn all_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>, NormalizerError> {
        let params = self.symbol_params(symbol).await?;
        match self.venue.order_history() {
            OrderHistory::Unified => {
                let raw = self.through("fetch_orders", params).await?;
                Ok(merge_orders(parse_orders(self.venue(), &raw), Vec::new()))
            }
            OrderHistory::Split => {
                let open = self.through("fetch_open_orders", params.clone()).await?;
                let closed = self.through("fetch_closed_orders", params).await?;
                Ok(merge_orders(
                    parse_orders(self.venue(), &open),
                    parse_orders(self.venue(), &closed),
                ))
            }
        }
    }

    /// Orders matching `filter`. Asking for open orders only reads the open book.
    pub(crate) async fn list_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, NormalizerError> {
        let symbol = filter.symbol.as_deref();
        let orders = match filter.status {
            Some(OrderStatus::Open) => self.open_orders(symbol).await?,
            _ => self.all_orders(symbol).await?,
        };
        let id = filter.id.as_deref().filter(|id| *id != CANCEL_ALL);
        Ok(orders
            .into_iter()
            .filter(|o| id.map_or(true, |id| o.id == id) && filter.matches(o))
            .collect())
    }

    /// Cancel one order by id, or every open order in scope when the id is `all`.
    pub(crate) async fn cancel_orders(&self, filter: OrderFilter) -> Result<Vec<Order>, NormalizerError> {
        let symbol = match filter.symbol.as_deref() {
            Some(key) => Value::String(self.resolve_symbol(key).await?),
            None => Value::Null,
        };
        let raw = match filter.id.as_deref() {
            Some(CANCEL_ALL) => self.through("cancel_all_orders", vec![symbol]).await?,
            Some(id) => self.through("cancel_order", vec![json!(id), symbol]).await?,
            None => {
                return Err(NormalizerError::invalid_params(
                    NormalizerMethod::Cancel.name(),
                    "an order id or \"all\" is required",
                ))
            }
        };
        self.reset_balances().await;

        let cancelled = match &raw {
            Value::Array(_) => parse_orders(self.venue(), &raw),
            single => self.venue.parse_order(single).into_iter().collect(),
        };
        info!(stub = %self.binding.stub(), count = cancelled.len(), "Orders cancelled");
        Ok(cancelled)
    }

    /// Cancel open orders matching `filter`.
    ///
    /// Without an order type the venue cancels everything in one call. With a
    /// type, matching open orders are cancelled one by one and orders that
    /// fail to cancel are skipped.
    pub(crate) async fn cancel_matching(&self, filter: OrderFilter) -> Result<Vec<Order>, NormalizerError> {
        if filter.order_type.is_none() {
            let all = OrderFilter {
                id: Some(CANCEL_ALL.to_string()),
                ..filter
            };
            return self.nested(NormalizerMethod::Cancel, vec![json!(all)]).await;
        }

        let open = OrderFilter {
            id: None,
            status: Some(OrderStatus::Open),
            ..filter
        };
        let orders: Vec<Order> = self.nested(NormalizerMethod::Orders, vec![json!(open)]).await?;
        let mut cancelled = Vec::with_capacity(orders.len());
        for order in orders {
            let target = OrderFilter {
                symbol: Some(order.symbol.clone()),
                id: Some(order.id.clone()),
                ..Default::default()
            };
            match self
                .nested::<Vec<Order>>(NormalizerMethod::Cancel, vec![json!(target)])
                .await
            {
                Ok(mut result) if !result.is_empty() => cancelled.push(result.swap_remove(0)),
                Ok(_) => {}
                Err(err) => warn!(stub = %self.binding.stub(), order_id = %order.id, error = %err, "Cancel failed"),
            }
        }
        Ok(cancelled)
    }

    pub(crate) async fn place_order(&self, params: CreateOrderParams) -> Result<OrderResult, NormalizerError> {
        let index = self.ensure_markets().await?;
        let Some(market) = index.by_id_or_symbol(&params.symbol) else {
            return Ok(OrderResult::Error {
                error: OrderError {
                    kind: "MarketNotFound".to_string(),
                    message: format!("unknown market {}", params.symbol),
                },
                params,
            });
        };

        let call = vec![
            json!(market.symbol),
            json!(params.order_type),
            json!(params.side),
            json!(params.amount),
            json!(params.price),
            params.params.clone().unwrap_or_else(|| json!({})),
        ];
        let outcome = self.pass_through("create_order", call, false).await;
        self.reset_balances().await;

        let result = match outcome {
            Outcome::Success(raw) => match self.venue.parse_order(&raw) {
                Some(order) => {
                    info!(
                        stub = %self.binding.stub(),
                        symbol = %order.symbol,
                        order_id = %order.id,
                        side = ?order.direction,
                        "Order created"
                    );
                    OrderResult::Success { params, order }
                }
                None => OrderResult::Error {
                    params,
                    error: OrderError {
                        kind: "InvalidOrder".to_string(),
                        message: "venue returned an unreadable order".to_string(),
                    },
                },
            },
            Outcome::Error(err) => {
                warn!(stub = %self.binding.stub(), error = %err, "Order rejected");
                OrderResult::Error {
                    params,
                    error: OrderError {
                        message: venue_error_message(&err.message, self.venue.error_noise()),
                        kind: err.name,
                    },
                }
            }
        };
        Ok(result)
    }

    pub(crate) async fn apply_leverage(&self, params: LeverageParams) -> Result<Value, NormalizerError> {
        let index = self.ensure_markets().await?;
        let market = index
            .by_id_or_symbol(&params.symbol)
            .ok_or_else(|| NormalizerError::MarketNotFound(params.symbol.clone()))?;
        let request = self
            .venue
            .leverage_request(&params, market)
            .ok_or_else(|| NormalizerError::LeverageUnsupported(self.venue.id().to_string()))?;
        let result = self.through(&request.method, request.params).await?;
        info!(stub = %self.binding.stub(), symbol = %market.symbol, leverage = %params.leverage, "Leverage set");
        Ok(result)
    }
}
