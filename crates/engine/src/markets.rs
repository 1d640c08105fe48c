use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tradegate_core::*;

use crate::error::NormalizerError;
use crate::normalizer::{filter_objects, Normalizer};

/// A venue's market catalog, indexed by native id and canonical symbol,
/// with every market valued in USD.
#[derive(Debug, Clone, Default)]
pub struct MarketIndex {
    markets: Vec<Market>,
    by_id: HashMap<String, usize>,
    by_symbol: HashMap<String, usize>,
    symbols: Vec<String>,
}

impl MarketIndex {
    pub fn build(markets: Vec<Market>, stablecoins: &[String]) -> Self {
        let mut index = Self {
            markets,
            ..Default::default()
        };
        for (i, market) in index.markets.iter().enumerate() {
            index.by_id.insert(market.id.clone(), i);
            index.by_symbol.insert(market.symbol.clone(), i);
        }
        index.symbols = index.by_symbol.keys().cloned().collect();
        index.symbols.sort();
        index.update_usd_prices(stablecoins);
        index
    }

    /// Value every market in USD.
    ///
    /// Markets quoted in a stablecoin are worth their average price. Others
    /// look for `BASE/<stablecoin>` and `QUOTE/<stablecoin>` markets, taking
    /// the first stablecoin that matches for each side. When only the quote
    /// side resolves, the base is priced through this market's own average.
    fn update_usd_prices(&mut self, stablecoins: &[String]) {
        let valuations: Vec<Option<UsdValuation>> = self
            .markets
            .iter()
            .map(|market| self.valuation(market, stablecoins))
            .collect();
        for (market, usd) in self.markets.iter_mut().zip(valuations) {
            market.usd = usd;
        }
    }

    fn valuation(&self, market: &Market, stablecoins: &[String]) -> Option<UsdValuation> {
        if stablecoins.contains(&market.quote) {
            return market.avg.map(UsdValuation::Direct);
        }

        let mut pairs = UsdPairs::default();
        let mut base = None;
        let mut quote = None;
        for stablecoin in stablecoins {
            if pairs.base.is_none() {
                let pair = format!("{}/{}", market.base, stablecoin);
                if let Some(found) = self.by_symbol(&pair) {
                    base = found.avg;
                    pairs.base = Some(pair);
                }
            }
            if pairs.quote.is_none() {
                let pair = format!("{}/{}", market.quote, stablecoin);
                if let Some(found) = self.by_symbol(&pair) {
                    quote = found.avg;
                    pairs.quote = Some(pair);
                }
            }
        }
        if base.is_none() {
            if let (Some(quote_usd), Some(avg)) = (quote, market.avg) {
                base = Some(quote_usd * avg);
            }
        }
        Some(UsdValuation::Triangulated { base, quote, pairs })
    }

    pub fn by_id(&self, id: &str) -> Option<&Market> {
        self.by_id.get(id).map(|&i| &self.markets[i])
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<&Market> {
        self.by_symbol.get(symbol).map(|&i| &self.markets[i])
    }

    /// Native id first, then canonical symbol.
    pub fn by_id_or_symbol(&self, key: &str) -> Option<&Market> {
        self.by_id(key).or_else(|| self.by_symbol(key))
    }

    /// Markets in catalog order.
    pub fn markets(&self) -> &[Market] {
        &self.markets
    }

    /// Every symbol, sorted.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}

impl Normalizer {
    /// The current market index, rebuilt when missing or older than the refresh interval.
    ///
    /// A failed rebuild keeps serving the previous index if there is one.
    pub(crate) async fn ensure_markets(&self) -> Result<Arc<MarketIndex>, NormalizerError> {
        let current = self.snapshot.read().await.markets.clone();
        if let Some((index, loaded)) = &current {
            if loaded.elapsed() < self.market_refresh {
                return Ok(index.clone());
            }
        }

        match self.build_index().await {
            Ok(index) => {
                let index = Arc::new(index);
                self.snapshot.write().await.markets = Some((index.clone(), Instant::now()));
                Ok(index)
            }
            Err(err) => match current {
                Some((index, _)) => {
                    warn!(stub = %self.binding.stub(), error = %err, "Market refresh failed, keeping stale index");
                    Ok(index)
                }
                None => Err(err),
            },
        }
    }

    async fn build_index(&self) -> Result<MarketIndex, NormalizerError> {
        let raw = self.through("fetch_markets", Vec::new()).await?;
        let tickers = match self.through("fetch_tickers", Vec::new()).await {
            Ok(Value::Object(tickers)) => tickers,
            Ok(_) => Map::new(),
            Err(err) => {
                debug!(stub = %self.binding.stub(), error = %err, "No tickers, pricing from market data");
                Map::new()
            }
        };

        let entries = match raw {
            Value::Array(entries) => entries,
            Value::Object(entries) => entries.into_iter().map(|(_, v)| v).collect(),
            _ => Vec::new(),
        };
        let markets: Vec<Market> = entries
            .iter()
            .filter_map(|entry| {
                let ticker = entry
                    .get("symbol")
                    .and_then(Value::as_str)
                    .and_then(|symbol| tickers.get(symbol));
                self.venue.parse_market(entry, ticker)
            })
            .collect();

        let index = MarketIndex::build(markets, &self.stablecoins);
        info!(
            stub = %self.binding.stub(),
            venue = %self.venue.id(),
            markets = index.len(),
            "Market index rebuilt"
        );
        Ok(index)
    }

    /// Drop the market index so the next call rebuilds it.
    pub async fn reset_markets(&self) {
        self.snapshot.write().await.markets = None;
    }

    pub(crate) async fn select_markets(&self, filter: &Value) -> Result<Selection<Market>, NormalizerError> {
        let index = self.ensure_markets().await?;
        Ok(Selection::from_matches(filter_objects(index.markets().to_vec(), filter)))
    }

    pub(crate) async fn fetch_ticker(&self, key: &str) -> Result<Option<Ticker>, NormalizerError> {
        let symbol = self
            .ensure_markets()
            .await?
            .by_id_or_symbol(key)
            .map(|m| m.symbol.clone())
            .unwrap_or_else(|| key.to_string());
        let raw = self.through("fetch_ticker", vec![Value::String(symbol)]).await?;
        Ok(self.venue.parse_ticker(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn market(symbol: &str, avg: Decimal) -> Market {
        let (base, quote) = symbol.split_once('/').unwrap();
        Market {
            id: symbol.replace('/', ""),
            symbol: symbol.to_string(),
            base: base.to_string(),
            quote: quote.to_string(),
            kind: MarketKind::Spot,
            contract_size: None,
            bid: None,
            ask: None,
            avg: Some(avg),
            usd: None,
        }
    }

    fn coins(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stablecoin_quoted_usd_is_avg() {
        let index = MarketIndex::build(
            vec![market("BTC/USDT", dec!(30000)), market("SOL/USDC", dec!(21.5))],
            &coins(&["USDT", "USDC"]),
        );
        for m in index.markets() {
            assert_eq!(m.usd, Some(UsdValuation::Direct(m.avg.unwrap())));
        }
    }

    #[test]
    fn test_triangulates_through_quote() {
        let index = MarketIndex::build(
            vec![market("BTC/USDT", dec!(30000)), market("ETH/BTC", dec!(0.07))],
            &coins(&["USDT"]),
        );
        let eth = index.by_symbol("ETH/BTC").unwrap();
        assert_eq!(
            eth.usd,
            Some(UsdValuation::Triangulated {
                base: Some(dec!(2100)),
                quote: Some(dec!(30000)),
                pairs: UsdPairs {
                    base: None,
                    quote: Some("BTC/USDT".into()),
                },
            })
        );
    }

    #[test]
    fn test_first_stablecoin_wins() {
        let index = MarketIndex::build(
            vec![
                market("BTC/USDT", dec!(30000)),
                market("BTC/USDC", dec!(30100)),
                market("ETH/USDC", dec!(2000)),
                market("ETH/BTC", dec!(0.07)),
            ],
            &coins(&["USDT", "USDC"]),
        );
        match &index.by_symbol("ETH/BTC").unwrap().usd {
            Some(UsdValuation::Triangulated { base, quote, pairs }) => {
                assert_eq!(*quote, Some(dec!(30000)));
                assert_eq!(pairs.quote.as_deref(), Some("BTC/USDT"));
                assert_eq!(*base, Some(dec!(2000)));
                assert_eq!(pairs.base.as_deref(), Some("ETH/USDC"));
            }
            other => panic!("expected triangulation, got {:?}", other),
        }
    }

    #[test]
    fn test_unpriceable_market() {
        let index = MarketIndex::build(vec![market("XMR/LTC", dec!(2))], &coins(&["USDT"]));
        assert_eq!(
            index.by_symbol("XMR/LTC").unwrap().usd,
            Some(UsdValuation::Triangulated {
                base: None,
                quote: None,
                pairs: UsdPairs::default(),
            })
        );
    }

    #[test]
    fn test_lookup_prefers_id() {
        let mut odd = market("ETH/USDT", dec!(2000));
        odd.id = "BTC/USDT".into();
        let index = MarketIndex::build(vec![market("BTC/USDT", dec!(30000)), odd], &coins(&["USDT"]));
        assert_eq!(index.by_id_or_symbol("BTC/USDT").unwrap().symbol, "ETH/USDT");
        assert_eq!(index.by_id_or_symbol("BTCUSDT").unwrap().symbol, "BTC/USDT");
        assert!(index.by_id_or_symbol("DOGE/USDT").is_none());
        assert_eq!(index.symbols(), ["BTC/USDT", "ETH/USDT"]);
    }

    #[tokio::test]
    async fn test_index_built_from_venue() {
        let h = spot_harness();
        let btc = h.normalizer.market_by_id("BTCUSDT").await.unwrap();
        assert_eq!(btc.avg, Some(dec!(30000)));
        assert_eq!(h.normalizer.symbols().await, vec!["BTC/USDT", "ETH/BTC", "ETH/USDT"]);
        assert!(h.normalizer.market_by_symbol("DOGE/USDT").await.is_none());

        let eth = h.normalizer.market_by_id_or_symbol("ETH/BTC").await.unwrap();
        assert!(matches!(eth.usd, Some(UsdValuation::Triangulated { .. })));
        assert_eq!(h.venue.calls("fetch_markets"), 1);
    }

    #[tokio::test]
    async fn test_market_filter() {
        let h = spot_harness();
        match h.normalizer.market(json!({"quote": "BTC"})).await {
            Selection::One(m) => assert_eq!(m.symbol, "ETH/BTC"),
            other => panic!("expected one market, got {:?}", other),
        }
        assert_eq!(h.normalizer.market(json!({"quote": "USDT"})).await.into_vec().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_refreshes_when_stale() {
        let h = spot_harness();
        h.normalizer.symbols().await;
        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        h.normalizer.markets().await;
        assert_eq!(h.venue.calls("fetch_markets"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_index_survives_failed_refresh() {
        let h = spot_harness();
        assert_eq!(h.normalizer.markets().await.len(), 3);
        h.venue.fail("fetch_markets", "NetworkError", "down");
        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        assert_eq!(h.normalizer.markets().await.len(), 3);
        assert!(h.venue.calls("fetch_markets") >= 2);
    }
}
