use serde_json::Value;
use tradegate_core::*;

use crate::error::NormalizerError;
use crate::normalizer::{filter_objects, Normalizer};
use crate::registry::NormalizerMethod;

impl Normalizer {
    /// Open positions. Venues without a positions call have none.
    pub(crate) async fn list_positions(&self) -> Result<Vec<Position>, NormalizerError> {
        let Some(request) = self.venue.positions_request() else {
            return Ok(Vec::new());
        };
        let raw = self.through(&request.method, request.params).await?;
        let index = self.ensure_markets().await?;
        let Value::Array(entries) = raw else {
            return Ok(Vec::new());
        };
        Ok(entries
            .iter()
            .filter_map(|entry| {
                let market = entry
                    .get("symbol")
                    .and_then(Value::as_str)
                    .and_then(|key| index.by_id_or_symbol(key));
                self.venue.parse_position(entry, market)
            })
            .collect())
    }

    pub(crate) async fn select_positions(&self, filter: &Value) -> Result<Selection<Position>, NormalizerError> {
        let positions: Vec<Position> = self.nested(NormalizerMethod::Positions, Vec::new()).await?;
        Ok(Selection::from_matches(filter_objects(positions, filter)))
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use tradegate_core::*;

    #[tokio::test]
    async fn test_spot_venue_has_no_positions() {
        let h = spot_harness();
        assert!(h.normalizer.positions().await.is_empty());
        assert_eq!(h.venue.calls("fetch_positions"), 0);
    }

    #[tokio::test]
    async fn test_positions_sized_by_contract() {
        let h = derivatives_harness();
        let positions = h.normalizer.positions().await;
        assert_eq!(positions.len(), 2);
        let btc = positions.iter().find(|p| p.symbol == "BTC/USD:BTC").unwrap();
        assert_eq!(btc.size, dec!(100));
        assert_eq!(btc.direction, PositionDirection::Long);
    }

    #[tokio::test]
    async fn test_position_filter_unwraps_single_match() {
        let h = derivatives_harness();
        match h.normalizer.position(json!({"direction": "short"})).await {
            Selection::One(position) => assert_eq!(position.symbol, "ETH/USD:ETH"),
            other => panic!("expected one position, got {:?}", other),
        }
        match h.normalizer.position(json!({})).await {
            Selection::Many(all) => assert_eq!(all.len(), 2),
            other => panic!("expected every position, got {:?}", other),
        }
    }
}
