//! Parsers for the unified payload shape most venue libraries emit
//! (`id`/`symbol`/`base`/`quote` markets, `bid`/`ask`/`last` tickers,
//! `side`/`type`/`status` orders).

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;
use tradegate_core::*;

/// Read a decimal from a JSON number or numeric string.
pub fn decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(&text).ok())
}

pub fn decimal_field(raw: &Value, key: &str) -> Option<Decimal> {
    raw.get(key).and_then(decimal)
}

/// Read a string field, accepting numeric ids.
pub fn string_field(raw: &Value, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Millisecond epoch `timestamp`, falling back to an RFC 3339 `datetime`.
pub fn timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    if let Some(ms) = raw.get("timestamp").and_then(Value::as_i64) {
        return Utc.timestamp_millis_opt(ms).single();
    }
    raw.get("datetime")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Split `BASE/QUOTE[:SETTLE]` into base and quote.
pub fn split_symbol(symbol: &str) -> Option<(String, String)> {
    let pair = symbol.split(':').next()?;
    let (base, quote) = pair.split_once('/')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base.to_string(), quote.to_string()))
}

pub fn parse_market(raw: &Value, ticker: Option<&Value>) -> Option<Market> {
    let id = string_field(raw, "id")?;
    let symbol = string_field(raw, "symbol")?;
    let (base, quote) = match (string_field(raw, "base"), string_field(raw, "quote")) {
        (Some(base), Some(quote)) => (base, quote),
        _ => match split_symbol(&symbol) {
            Some(pair) => pair,
            None => {
                debug!(market_id = %id, %symbol, "Market without base or quote skipped");
                return None;
            }
        },
    };
    let kind = match raw.get("type").and_then(Value::as_str) {
        Some("future") => MarketKind::Future,
        Some("swap") => MarketKind::Swap,
        Some("option") => MarketKind::Option,
        _ => MarketKind::Spot,
    };

    let book = ticker.unwrap_or(raw);
    let bid = decimal_field(book, "bid");
    let ask = decimal_field(book, "ask");
    let last = decimal_field(book, "last");
    let mid = match (bid, ask) {
        (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
        _ => None,
    };

    Some(Market {
        id,
        symbol,
        base,
        quote,
        kind,
        contract_size: decimal_field(raw, "contractSize"),
        bid,
        ask,
        avg: mid.or(last).or_else(|| decimal_field(raw, "avg")),
        usd: None,
    })
}

pub fn parse_ticker(raw: &Value) -> Option<Ticker> {
    Some(Ticker {
        symbol: string_field(raw, "symbol")?,
        bid: decimal_field(raw, "bid"),
        ask: decimal_field(raw, "ask"),
        last: decimal_field(raw, "last"),
        timestamp: timestamp(raw),
    })
}

pub fn parse_order(raw: &Value) -> Option<Order> {
    let id = string_field(raw, "id")?;
    Some(Order {
        symbol: string_field(raw, "symbol")?,
        order_type: raw
            .get("type")
            .and_then(Value::as_str)
            .map(OrderType::from_venue)
            .unwrap_or(OrderType::Other),
        direction: raw.get("side").and_then(Value::as_str).and_then(Side::from_venue)?,
        amount: decimal_field(raw, "amount")?,
        price: decimal_field(raw, "price"),
        trigger: decimal_field(raw, "triggerPrice").or_else(|| decimal_field(raw, "stopPrice")),
        filled: decimal_field(raw, "filled"),
        status: raw
            .get("status")
            .and_then(Value::as_str)
            .map(OrderStatus::from_venue)
            .unwrap_or(OrderStatus::Unknown),
        timestamp: timestamp(raw),
        id,
    })
}

pub fn parse_position(raw: &Value, market: Option<&Market>) -> Option<Position> {
    let contracts = decimal_field(raw, "contracts")?;
    if contracts.is_zero() {
        return None;
    }
    let direction = match raw.get("side").and_then(Value::as_str) {
        Some("short") | Some("sell") => PositionDirection::Short,
        _ => PositionDirection::Long,
    };
    let contract_size = decimal_field(raw, "contractSize")
        .or_else(|| market.and_then(|m| m.contract_size))
        .unwrap_or(Decimal::ONE);
    let size = contracts.abs() * contract_size;
    let mark_price = decimal_field(raw, "markPrice");

    Some(Position {
        symbol: string_field(raw, "symbol").or_else(|| market.map(|m| m.symbol.clone()))?,
        direction,
        size,
        entry_price: decimal_field(raw, "entryPrice"),
        mark_price,
        liquidation_price: decimal_field(raw, "liquidationPrice"),
        unrealized_pnl: decimal_field(raw, "unrealizedPnl"),
        usd_size: decimal_field(raw, "notional")
            .map(|n| n.abs())
            .or_else(|| mark_price.map(|p| p * size)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_decimal_parsing() {
        assert_eq!(decimal(&json!(30000)), Some(dec!(30000)));
        assert_eq!(decimal(&json!(0.07)), Some(dec!(0.07)));
        assert_eq!(decimal(&json!("1.5")), Some(dec!(1.5)));
        assert_eq!(decimal(&json!(1e-7)), Some(dec!(0.0000001)));
        assert_eq!(decimal(&json!(null)), None);
    }

    #[test]
    fn test_split_symbol() {
        assert_eq!(split_symbol("ETH/BTC"), Some(("ETH".into(), "BTC".into())));
        assert_eq!(split_symbol("BTC/USDT:USDT"), Some(("BTC".into(), "USDT".into())));
        assert_eq!(split_symbol("BTCUSDT"), None);
    }

    #[test]
    fn test_market_prices_from_ticker() {
        let raw = json!({"id": "BTCUSDT", "symbol": "BTC/USDT", "base": "BTC", "quote": "USDT"});
        let ticker = json!({"symbol": "BTC/USDT", "bid": 29000, "ask": 31000, "last": 30500});
        let market = parse_market(&raw, Some(&ticker)).unwrap();
        assert_eq!(market.avg, Some(dec!(30000)));
        assert_eq!(market.kind, MarketKind::Spot);
        assert!(market.usd.is_none());
    }

    #[test]
    fn test_market_avg_fallbacks() {
        let raw = json!({"id": "ETHBTC", "symbol": "ETH/BTC", "avg": 0.07});
        let market = parse_market(&raw, None).unwrap();
        assert_eq!(market.base, "ETH");
        assert_eq!(market.quote, "BTC");
        assert_eq!(market.avg, Some(dec!(0.07)));

        let ticker = json!({"last": 0.071});
        assert_eq!(parse_market(&raw, Some(&ticker)).unwrap().avg, Some(dec!(0.071)));
    }

    #[test]
    fn test_order_parsing() {
        let raw = json!({
            "id": 123, "symbol": "BTC/USDT", "type": "stop_market", "side": "sell",
            "amount": "0.5", "price": null, "stopPrice": 25000, "filled": 0,
            "status": "open", "timestamp": 1_700_000_000_000i64
        });
        let order = parse_order(&raw).unwrap();
        assert_eq!(order.id, "123");
        assert_eq!(order.order_type, OrderType::Stop);
        assert_eq!(order.direction, Side::Sell);
        assert_eq!(order.trigger, Some(dec!(25000)));
        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.timestamp.map(|t| t.timestamp_millis()), Some(1_700_000_000_000));
    }

    #[test]
    fn test_order_without_side_rejected() {
        assert!(parse_order(&json!({"id": "1", "symbol": "X/Y", "amount": 1, "timestamp": 1})).is_none());
    }

    #[test]
    fn test_order_without_time_kept() {
        let order = parse_order(&json!({"id": "1", "symbol": "X/Y", "side": "buy", "amount": 1})).unwrap();
        assert_eq!(order.id, "1");
        assert_eq!(order.timestamp, None);
    }

    #[test]
    fn test_position_parsing() {
        let market = parse_market(
            &json!({"id": "BTC-PERPETUAL", "symbol": "BTC/USD:BTC", "type": "swap", "contractSize": 10}),
            None,
        )
        .unwrap();
        let raw = json!({"side": "short", "contracts": 5, "entryPrice": 30000, "markPrice": 31000});
        let position = parse_position(&raw, Some(&market)).unwrap();
        assert_eq!(position.symbol, "BTC/USD:BTC");
        assert_eq!(position.direction, PositionDirection::Short);
        assert_eq!(position.size, dec!(50));
        assert_eq!(position.usd_size, Some(dec!(1550000)));

        assert!(parse_position(&json!({"contracts": 0}), Some(&market)).is_none());
    }
}
