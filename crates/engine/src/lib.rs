//! Per-account trading surface over heterogeneous venues.
//!
//! A [`Normalizer`] binds one tenant's stub to a venue connector and serves
//! canonical markets, balances, orders, and positions on top of it. Every
//! call is dispatched by name through a TTL cache ([`CacheExecutor`]).

pub mod balances;
pub mod binding;
pub mod context;
pub mod error;
pub mod executor;
pub mod markets;
pub mod metrics;
pub mod normalizer;
pub mod orders;
pub mod pool;
pub mod positions;
pub mod registry;

#[cfg(test)]
mod testing;

pub use binding::AccountBinding;
pub use context::{NormalizerConfig, NormalizerContext, DEFAULT_CACHE_TTLS};
pub use error::{BindingError, NormalizerError};
pub use executor::{CacheExecutor, CallScope};
pub use markets::MarketIndex;
pub use metrics::{MethodSummary, StatsAggregator};
pub use normalizer::Normalizer;
pub use pool::NormalizerPool;
pub use registry::NormalizerMethod;
