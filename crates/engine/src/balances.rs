use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use tradegate_core::*;

use crate::error::NormalizerError;
use crate::markets::MarketIndex;
use crate::normalizer::Normalizer;

/// Summary keys in a `fetch_balance` payload that are not currencies.
const AGGREGATE_KEYS: [&str; 4] = ["info", "free", "used", "total"];

/// USD price of one unit of `currency`.
///
/// Stablecoins are worth 1. Other currencies are priced from the first
/// `template` market (`{currency}/{stablecoin}` by default) that exists,
/// at its mid price or its average when the book is one-sided.
pub fn usd_price(index: &MarketIndex, currency: &str, stablecoins: &[String], template: &str) -> Option<Decimal> {
    if stablecoins.iter().any(|s| s == currency) {
        return Some(Decimal::ONE);
    }
    stablecoins.iter().find_map(|stablecoin| {
        let symbol = template
            .replace("{currency}", currency)
            .replace("{stablecoin}", stablecoin);
        index.by_symbol(&symbol).and_then(|m| m.mid().or(m.avg))
    })
}

/// Turn a venue balance payload into priced balances, dropping empty ones.
pub fn aggregate(raw: &Value, price: impl Fn(&str) -> Option<Decimal>) -> Vec<Balance> {
    let Some(entries) = raw.as_object() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|(currency, _)| !AGGREGATE_KEYS.contains(&currency.as_str()))
        .filter_map(|(currency, entry)| {
            let free = amount(entry.get("free")).unwrap_or_default();
            let used = amount(entry.get("used")).unwrap_or_default();
            let total = amount(entry.get("total")).unwrap_or(free + used);
            if total.is_zero() {
                return None;
            }
            Some(Balance::new(currency.clone(), price(currency.as_str()), free, used, total))
        })
        .collect()
}

pub fn total_usd(balances: &[Balance]) -> BalanceUsd {
    balances.iter().fold(BalanceUsd::default(), |sum, b| BalanceUsd {
        free: sum.free + b.usd.free,
        used: sum.used + b.usd.used,
        total: sum.total + b.usd.total,
    })
}

fn amount(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => {
            let text = n.to_string();
            text.parse().ok().or_else(|| Decimal::from_scientific(&text).ok())
        }
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Normalizer {
    pub async fn usd_price(&self, currency: &str) -> Option<Decimal> {
        match self.ensure_markets().await {
            Ok(index) => usd_price(&index, currency, &self.stablecoins, self.venue.balances_market_map()),
            Err(err) => {
                warn!(stub = %self.binding.stub(), currency, error = %err, "Cannot price currency");
                None
            }
        }
    }

    /// Balances from the snapshot. Only [`Normalizer::reset_balances`] makes the next read refetch.
    pub(crate) async fn load_balances(&self) -> Result<Arc<Vec<Balance>>, NormalizerError> {
        if let Some(balances) = &self.snapshot.read().await.balances {
            return Ok(balances.clone());
        }

        let raw = self.through("fetch_balance", Vec::new()).await?;
        let index = self.ensure_markets().await?;
        let template = self.venue.balances_market_map();
        let balances = Arc::new(aggregate(&raw, |currency| {
            usd_price(&index, currency, &self.stablecoins, template)
        }));
        self.snapshot.write().await.balances = Some(balances.clone());
        Ok(balances)
    }

    pub(crate) async fn sum_balances(&self) -> Result<BalanceUsd, NormalizerError> {
        Ok(total_usd(&self.load_balances().await?))
    }

    /// Forget the balance snapshot so the next read fetches from the venue.
    pub async fn reset_balances(&self) {
        self.snapshot.write().await.balances = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    fn index() -> MarketIndex {
        let raw = [
            json!({"id": "BTCUSDT", "symbol": "BTC/USDT", "base": "BTC", "quote": "USDT", "bid": 29990, "ask": 30010}),
            json!({"id": "ETHUSDC", "symbol": "ETH/USDC", "base": "ETH", "quote": "USDC", "avg": 2000}),
        ];
        let markets = raw
            .iter()
            .filter_map(|m| tradegate_brokers_crypto::unified::parse_market(m, None))
            .collect();
        MarketIndex::build(markets, &coins())
    }

    fn coins() -> Vec<String> {
        vec!["USDT".to_string(), "USDC".to_string()]
    }

    #[test]
    fn test_stablecoins_price_at_one() {
        let index = index();
        for coin in coins() {
            assert_eq!(usd_price(&index, &coin, &coins(), "{currency}/{stablecoin}"), Some(Decimal::ONE));
        }
    }

    #[test]
    fn test_price_from_mid_then_avg() {
        let index = index();
        let template = "{currency}/{stablecoin}";
        assert_eq!(usd_price(&index, "BTC", &coins(), template), Some(dec!(30000)));
        assert_eq!(usd_price(&index, "ETH", &coins(), template), Some(dec!(2000)));
        assert_eq!(usd_price(&index, "DOGE", &coins(), template), None);
        assert_eq!(usd_price(&index, "BTC", &coins(), "{currency}-{stablecoin}"), None);
    }

    #[test]
    fn test_aggregate_drops_summaries_and_empties() {
        let raw = json!({
            "info": {"raw": true},
            "free": {"BTC": 1}, "used": {"BTC": 0}, "total": {"BTC": 1},
            "BTC": {"free": 0.75, "used": 0.25, "total": 1},
            "DOGE": {"free": 0, "used": 0, "total": 0},
            "XYZ": {"free": "3", "used": null, "total": null}
        });
        let balances = aggregate(&raw, |c| (c == "BTC").then_some(dec!(30000)));
        assert_eq!(balances.len(), 2);
        assert_eq!(balances[0].currency, "BTC");
        assert_eq!(balances[0].usd.free, dec!(22500));
        assert_eq!(balances[1].currency, "XYZ");
        assert_eq!(balances[1].total, dec!(3));
        assert!(!balances[1].is_priced());

        assert!(aggregate(&json!([1, 2]), |_| None).is_empty());
    }

    #[tokio::test]
    async fn test_total_balance_usd() {
        let h = spot_harness();
        assert_eq!(h.normalizer.total_balance_usd().await, dec!(30100));
        let usd = h.normalizer.balance_usd().await;
        assert_eq!(usd.free, dec!(15100));
        assert_eq!(usd.used, dec!(15000));
        assert_eq!(h.normalizer.free_balance_usd().await, dec!(15100));
        assert_eq!(h.venue.calls("fetch_balance"), 1);
    }

    #[tokio::test]
    async fn test_reset_balances_refetches() {
        let h = spot_harness();
        assert_eq!(h.normalizer.balances().await.len(), 2);
        h.normalizer.reset_balances().await;
        h.normalizer.balance_usd().await;
        assert_eq!(h.venue.calls("fetch_balance"), 2);
        assert_eq!(h.normalizer.usd_price("USDT").await, Some(Decimal::ONE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_outlives_cache_time() {
        let h = spot_harness();
        assert_eq!(h.normalizer.total_balance_usd().await, dec!(30100));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(h.normalizer.total_balance_usd().await, dec!(30100));
        assert_eq!(h.venue.calls("fetch_balance"), 1);

        h.normalizer.set_cache_time("balances", 0);
        assert_eq!(h.normalizer.total_balance_usd().await, dec!(30100));
        assert_eq!(h.venue.calls("fetch_balance"), 1);

        h.normalizer.reset_balances().await;
        h.normalizer.total_balance_usd().await;
        assert_eq!(h.venue.calls("fetch_balance"), 2);
    }
}
