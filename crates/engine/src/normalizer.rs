use futures_util::future::{BoxFuture, FutureExt};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;
use tradegate_core::*;

use crate::binding::AccountBinding;
use crate::context::NormalizerContext;
use crate::error::NormalizerError;
use crate::executor::{CacheExecutor, CallScope};
use crate::markets::MarketIndex;
use crate::registry::NormalizerMethod;

/// Derived state of a binding, replaced wholesale on refresh.
#[derive(Default)]
pub(crate) struct Snapshot {
    pub(crate) markets: Option<(Arc<MarketIndex>, Instant)>,
    pub(crate) balances: Option<Arc<Vec<Balance>>>,
}

/// The uniform trading surface for one tenant's account on one venue.
///
/// Every operation goes through [`Normalizer::execute`]: the name is looked
/// up in the normalizer registry and anything unknown is passed straight to
/// the venue connector. Both paths are cached and recorded by the
/// [`CacheExecutor`].
pub struct Normalizer {
    pub(crate) binding: AccountBinding,
    pub(crate) venue: Arc<dyn VenueProfile>,
    pub(crate) executor: CacheExecutor,
    pub(crate) stablecoins: Vec<String>,
    pub(crate) market_refresh: Duration,
    pub(crate) snapshot: RwLock<Snapshot>,
}

impl Normalizer {
    pub fn new(binding: AccountBinding, venue: Arc<dyn VenueProfile>, context: &NormalizerContext) -> Self {
        let scope = CallScope {
            tenant: binding.tenant(),
            stub: binding.stub().to_string(),
            shortname: binding.shortname().to_string(),
        };
        let executor = CacheExecutor::new(
            scope,
            context.cache.clone(),
            context.stats.clone(),
            context.config.cache_ttls(),
            context.config.coalesce_misses,
        );
        Self {
            stablecoins: venue.stablecoins().to_vec(),
            binding,
            venue,
            executor,
            market_refresh: context.config.market_refresh(),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Replace the venue's stablecoin list. Order is pricing priority.
    pub fn with_stablecoins(mut self, stablecoins: Vec<String>) -> Self {
        self.stablecoins = stablecoins;
        self
    }

    pub fn binding(&self) -> &AccountBinding {
        &self.binding
    }

    pub fn venue(&self) -> &dyn VenueProfile {
        self.venue.as_ref()
    }

    pub fn stablecoins(&self) -> &[String] {
        &self.stablecoins
    }

    pub fn executor(&self) -> &CacheExecutor {
        &self.executor
    }

    pub fn set_cache_time(&self, method: &str, secs: u64) {
        self.executor.set_cache_time(method, secs);
    }

    pub fn order_sizing(&self) -> OrderSizing {
        self.venue.order_sizing()
    }

    pub fn custom_params(&self, options: &OrderOptions) -> Value {
        self.venue.custom_params(options)
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    pub async fn execute(&self, method: &str, params: Value) -> Outcome {
        self.execute_with(method, params, false).await
    }

    /// Dispatch `method` by name. `no_cache` skips the cache read for this call.
    ///
    /// Markets are loaded first. A failed load is logged and dispatch goes on;
    /// operations that need the index report the failure themselves.
    pub async fn execute_with(&self, method: &str, params: Value, no_cache: bool) -> Outcome {
        let params = normalize_params(params);
        if let Err(err) = self.ensure_markets().await {
            warn!(stub = %self.binding.stub(), method, error = %err, "Markets unavailable");
        }
        match NormalizerMethod::from_name(method) {
            Some(op) => self.normalizer(op, params, no_cache).await,
            None => self.pass_through(method, params, no_cache).await,
        }
    }

    pub(crate) async fn normalizer(&self, op: NormalizerMethod, params: Vec<Value>, no_cache: bool) -> Outcome {
        let args = params.as_slice();
        self.executor
            .run(CallKind::Normalizer, op.name(), args, no_cache, move || self.invoke(op, args))
            .await
    }

    pub(crate) async fn pass_through(&self, method: &str, params: Vec<Value>, no_cache: bool) -> Outcome {
        let binding = &self.binding;
        let args = params.as_slice();
        self.executor
            .run(CallKind::PassThrough, method, args, no_cache, move || binding.call(method, args))
            .await
    }

    /// Pass-through call whose error envelope becomes an `Err`.
    pub(crate) async fn through(&self, method: &str, params: Vec<Value>) -> Result<Value, NormalizerError> {
        self.pass_through(method, params, false)
            .await
            .into_result()
            .map_err(NormalizerError::Failed)
    }

    /// Dispatched normalizer call from inside another normalizer operation.
    pub(crate) async fn nested<T: DeserializeOwned>(
        &self,
        op: NormalizerMethod,
        params: Vec<Value>,
    ) -> Result<T, NormalizerError> {
        let value = self
            .normalizer(op, params, false)
            .await
            .into_result()
            .map_err(NormalizerError::Failed)?;
        Ok(serde_json::from_value(value)?)
    }

    fn invoke<'a>(&'a self, op: NormalizerMethod, params: &'a [Value]) -> BoxFuture<'a, Result<Value, NormalizerError>> {
        async move {
            let value = match op {
                NormalizerMethod::Positions => to_json(self.list_positions().await?)?,
                NormalizerMethod::Position => to_json(self.select_positions(first(params)).await?)?,
                NormalizerMethod::Markets => to_json(self.ensure_markets().await?.markets())?,
                NormalizerMethod::Market => to_json(self.select_markets(first(params)).await?)?,
                NormalizerMethod::Ticker => {
                    let symbol: String = arg(op, params)?;
                    to_json(self.fetch_ticker(&symbol).await?)?
                }
                NormalizerMethod::Symbols => to_json(self.ensure_markets().await?.symbols())?,
                NormalizerMethod::Balances => to_json(&*self.load_balances().await?)?,
                NormalizerMethod::BalanceUsd => to_json(self.sum_balances().await?)?,
                NormalizerMethod::FreeBalanceUsd => to_json(self.sum_balances().await?.free)?,
                NormalizerMethod::TotalBalanceUsd => to_json(self.sum_balances().await?.total)?,
                NormalizerMethod::Orders => {
                    let filter: Option<OrderFilter> = arg(op, params)?;
                    to_json(self.list_orders(filter.unwrap_or_else(OrderFilter::all)).await?)?
                }
                NormalizerMethod::Cancel => to_json(self.cancel_orders(arg(op, params)?).await?)?,
                NormalizerMethod::CancelAll => to_json(self.cancel_matching(arg(op, params)?).await?)?,
                NormalizerMethod::GetMarketById => {
                    let key: String = arg(op, params)?;
                    to_json(self.ensure_markets().await?.by_id(&key))?
                }
                NormalizerMethod::GetMarketBySymbol => {
                    let key: String = arg(op, params)?;
                    to_json(self.ensure_markets().await?.by_symbol(&key))?
                }
                NormalizerMethod::GetMarketByIdOrSymbol => {
                    let key: String = arg(op, params)?;
                    to_json(self.ensure_markets().await?.by_id_or_symbol(&key))?
                }
                NormalizerMethod::CreateOrder => to_json(self.place_order(arg(op, params)?).await?)?,
                NormalizerMethod::CustomParams => {
                    let options: Option<OrderOptions> = arg(op, params)?;
                    self.venue.custom_params(&options.unwrap_or_default())
                }
                NormalizerMethod::Leverage => self.apply_leverage(arg(op, params)?).await?,
            };
            Ok(value)
        }
        .boxed()
    }

    // -----------------------------------------------------------------------
    // Typed surface
    // -----------------------------------------------------------------------

    /// Dispatch and decode. Failures are logged and yield the empty value.
    async fn query<T: DeserializeOwned + Default>(&self, op: NormalizerMethod, params: Value) -> T {
        match self.execute(op.name(), params).await {
            Outcome::Success(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                warn!(stub = %self.binding.stub(), method = %op, error = %err, "Unexpected result shape");
                T::default()
            }),
            Outcome::Error(err) => {
                warn!(stub = %self.binding.stub(), method = %op, error = %err, "Call failed");
                T::default()
            }
        }
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.query(NormalizerMethod::Positions, Value::Null).await
    }

    /// Positions whose fields equal every field of `filter`.
    pub async fn position(&self, filter: Value) -> Selection<Position> {
        self.query(NormalizerMethod::Position, json!([filter])).await
    }

    pub async fn markets(&self) -> Vec<Market> {
        self.query(NormalizerMethod::Markets, Value::Null).await
    }

    /// Markets whose fields equal every field of `filter`.
    pub async fn market(&self, filter: Value) -> Selection<Market> {
        self.query(NormalizerMethod::Market, json!([filter])).await
    }

    pub async fn ticker(&self, symbol: &str) -> Option<Ticker> {
        self.query(NormalizerMethod::Ticker, json!([symbol])).await
    }

    pub async fn symbols(&self) -> Vec<String> {
        self.query(NormalizerMethod::Symbols, Value::Null).await
    }

    pub async fn balances(&self) -> Vec<Balance> {
        self.query(NormalizerMethod::Balances, Value::Null).await
    }

    pub async fn balance_usd(&self) -> BalanceUsd {
        self.query(NormalizerMethod::BalanceUsd, Value::Null).await
    }

    pub async fn free_balance_usd(&self) -> Decimal {
        self.query(NormalizerMethod::FreeBalanceUsd, Value::Null).await
    }

    pub async fn total_balance_usd(&self) -> Decimal {
        self.query(NormalizerMethod::TotalBalanceUsd, Value::Null).await
    }

    /// Orders matching `filter`; every order when `None`.
    pub async fn orders(&self, filter: Option<OrderFilter>) -> Vec<Order> {
        let params = filter.map_or(Value::Null, |f| json!([f]));
        self.query(NormalizerMethod::Orders, params).await
    }

    pub async fn cancel(&self, filter: OrderFilter) -> Vec<Order> {
        self.query(NormalizerMethod::Cancel, json!([filter])).await
    }

    pub async fn cancel_all(&self, filter: OrderFilter) -> Vec<Order> {
        self.query(NormalizerMethod::CancelAll, json!([filter])).await
    }

    pub async fn market_by_id(&self, id: &str) -> Option<Market> {
        self.query(NormalizerMethod::GetMarketById, json!([id])).await
    }

    pub async fn market_by_symbol(&self, symbol: &str) -> Option<Market> {
        self.query(NormalizerMethod::GetMarketBySymbol, json!([symbol])).await
    }

    pub async fn market_by_id_or_symbol(&self, key: &str) -> Option<Market> {
        self.query(NormalizerMethod::GetMarketByIdOrSymbol, json!([key])).await
    }

    pub async fn create_order(&self, params: CreateOrderParams) -> OrderResult {
        let outcome = self
            .execute(NormalizerMethod::CreateOrder.name(), json!([params]))
            .await;
        let error = match outcome {
            Outcome::Success(value) => match serde_json::from_value(value) {
                Ok(result) => return result,
                Err(err) => ErrorData::new("InvalidOrder", err.to_string()),
            },
            Outcome::Error(err) => err,
        };
        OrderResult::Error {
            params,
            error: OrderError {
                kind: error.name,
                message: error.message,
            },
        }
    }

    /// Change leverage. Venues without leverage answer `LeverageUnsupported`.
    pub async fn leverage(&self, params: LeverageParams) -> Outcome {
        self.execute(NormalizerMethod::Leverage.name(), json!([params])).await
    }
}

/// Normalize call parameters to a positional list.
///
/// Null, `{}`, `[]` and `""` mean no parameters. An array is used as is and
/// any other value becomes the single parameter.
pub fn normalize_params(params: Value) -> Vec<Value> {
    match params {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::String(s) if s.is_empty() => Vec::new(),
        other => vec![other],
    }
}

/// Keep the items whose serialized fields equal every field of `filter`.
/// A missing or empty filter keeps everything.
pub fn filter_objects<T: Serialize>(items: Vec<T>, filter: &Value) -> Vec<T> {
    let Some(filter) = filter.as_object().filter(|f| !f.is_empty()) else {
        return items;
    };
    items
        .into_iter()
        .filter(|item| match serde_json::to_value(item) {
            Ok(value) => filter.iter().all(|(key, want)| value.get(key) == Some(want)),
            Err(_) => false,
        })
        .collect()
}

fn first(params: &[Value]) -> &Value {
    params.first().unwrap_or(&Value::Null)
}

fn arg<T: DeserializeOwned>(op: NormalizerMethod, params: &[Value]) -> Result<T, NormalizerError> {
    serde_json::from_value(first(params).clone()).map_err(|err| NormalizerError::invalid_params(op.name(), err))
}

fn to_json<T: Serialize>(value: T) -> Result<Value, NormalizerError> {
    Ok(serde_json::to_value(value)?)
}
