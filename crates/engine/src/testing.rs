//! Fixtures shared by the engine's unit tests.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tradegate_brokers_common::{SimulatedConnectorFactory, SimulatedVenue, VenueFixture};
use tradegate_brokers_crypto::CryptoVenues;
use tradegate_core::*;
use tradegate_data::{MemoryAccountStore, MemoryCache, MemorySettingsStore};

use crate::binding::AccountBinding;
use crate::context::{NormalizerConfig, NormalizerContext};
use crate::metrics::StatsAggregator;
use crate::normalizer::Normalizer;
use crate::pool::NormalizerPool;

pub use tradegate_brokers_crypto::{DerivativesVenue, SpotVenue};

pub struct Harness {
    pub normalizer: Normalizer,
    pub venue: Arc<SimulatedVenue>,
    pub stats: Arc<StatsAggregator>,
}

fn account(venue: &str) -> Account {
    Account {
        tenant: TenantId::GLOBAL,
        stub: "b1".into(),
        venue: venue.into(),
        shortname: "main".into(),
        testnet: true,
        credentials: Credentials::default(),
    }
}

fn context(venue: Arc<SimulatedVenue>, account: Account, stats: Arc<StatsAggregator>) -> NormalizerContext {
    let accounts = MemoryAccountStore::new();
    accounts.insert(account);
    NormalizerContext {
        cache: Arc::new(MemoryCache::new()),
        stats,
        settings: Arc::new(MemorySettingsStore::new()),
        accounts: Arc::new(accounts),
        connectors: Arc::new(SimulatedConnectorFactory::new().with_venue(venue)),
        venues: Arc::new(CryptoVenues::new()),
        config: NormalizerConfig::default(),
    }
}

impl Harness {
    pub fn new(fixture: VenueFixture, profile: Arc<dyn VenueProfile>, latency: Option<Duration>) -> Self {
        let mut simulated = SimulatedVenue::new(profile.id(), fixture);
        if let Some(latency) = latency {
            simulated = simulated.with_latency(latency);
        }
        let venue = Arc::new(simulated);
        let stats = Arc::new(StatsAggregator::new());
        let account = account(profile.id());
        let ctx = context(venue.clone(), account.clone(), stats.clone());
        let binding = AccountBinding::new(account, ctx.connectors.clone());
        Self {
            normalizer: Normalizer::new(binding, profile, &ctx),
            venue,
            stats,
        }
    }
}

/// A pool over a simulated binance venue with account `b1`.
pub fn pool_with(fixture: VenueFixture) -> (NormalizerPool, Arc<SimulatedVenue>) {
    let venue = Arc::new(SimulatedVenue::new("binance", fixture));
    let ctx = context(venue.clone(), account("binance"), Arc::new(StatsAggregator::new()));
    (NormalizerPool::new(ctx), venue)
}

fn fixture(value: Value) -> VenueFixture {
    serde_json::from_value(value).unwrap()
}

/// Three spot markets, a BTC and USDT balance, three open orders and one filled.
pub fn spot_fixture() -> VenueFixture {
    fixture(json!({
        "markets": [
            {"id": "BTCUSDT", "symbol": "BTC/USDT", "base": "BTC", "quote": "USDT"},
            {"id": "ETHUSDT", "symbol": "ETH/USDT", "base": "ETH", "quote": "USDT"},
            {"id": "ETHBTC", "symbol": "ETH/BTC", "base": "ETH", "quote": "BTC"}
        ],
        "tickers": {
            "BTC/USDT": {"symbol": "BTC/USDT", "bid": 29990, "ask": 30010, "timestamp": 1700000000000i64},
            "ETH/USDT": {"symbol": "ETH/USDT", "bid": 1999, "ask": 2001},
            "ETH/BTC": {"symbol": "ETH/BTC", "bid": 0.0699, "ask": 0.0701}
        },
        "balance": {
            "info": {},
            "BTC": {"free": 0.5, "used": 0.5, "total": 1},
            "USDT": {"free": 100, "used": 0, "total": 100},
            "ETH": {"free": 0, "used": 0, "total": 0}
        },
        "orders": [
            {"id": "1001", "symbol": "BTC/USDT", "type": "limit", "side": "buy", "amount": 0.5,
             "price": 29000, "status": "open", "timestamp": 1700000001000i64},
            {"id": "1002", "symbol": "BTC/USDT", "type": "stop", "side": "sell", "amount": 0.5,
             "triggerPrice": 28000, "status": "open", "timestamp": 1700000002000i64},
            {"id": "1003", "symbol": "ETH/USDT", "type": "stop", "side": "sell", "amount": 1,
             "triggerPrice": 1800, "status": "open", "timestamp": 1700000003000i64},
            {"id": "1004", "symbol": "BTC/USDT", "type": "limit", "side": "buy", "amount": 0.1,
             "price": 30000, "filled": 0.1, "status": "closed", "timestamp": 1700000000500i64}
        ]
    }))
}

pub fn spot_harness() -> Harness {
    Harness::new(spot_fixture(), Arc::new(SpotVenue::binance()), None)
}

/// Two inverse perpetuals with a long BTC and a short ETH position.
pub fn derivatives_fixture() -> VenueFixture {
    fixture(json!({
        "markets": [
            {"id": "BTC-PERPETUAL", "symbol": "BTC/USD:BTC", "base": "BTC", "quote": "USD",
             "type": "swap", "contractSize": 10},
            {"id": "ETH-PERPETUAL", "symbol": "ETH/USD:ETH", "base": "ETH", "quote": "USD",
             "type": "swap", "contractSize": 1}
        ],
        "tickers": {
            "BTC/USD:BTC": {"symbol": "BTC/USD:BTC", "bid": 29995, "ask": 30005},
            "ETH/USD:ETH": {"symbol": "ETH/USD:ETH", "bid": 1999.5, "ask": 2000.5}
        },
        "positions": [
            {"symbol": "BTC/USD:BTC", "contracts": 10, "side": "long", "entryPrice": 29000,
             "markPrice": 30000},
            {"symbol": "ETH/USD:ETH", "contracts": 5, "side": "short", "entryPrice": 2100,
             "markPrice": 2000}
        ]
    }))
}

pub fn derivatives_harness() -> Harness {
    Harness::new(derivatives_fixture(), Arc::new(DerivativesVenue::deribit()), None)
}
