//! Crypto exchange venue profiles.
//!
//! Each profile adapts one venue family's native payloads to the canonical
//! market, order, and position types.

pub mod derivatives;
pub mod spot;
pub mod unified;

use std::collections::BTreeMap;
use std::sync::Arc;
use tradegate_core::{VenueCatalog, VenueProfile};

pub use derivatives::{DerivativesVenue, ParamStyle};
pub use spot::SpotVenue;

/// Catalog of the venue profiles known to this crate.
pub struct CryptoVenues {
    profiles: BTreeMap<String, Arc<dyn VenueProfile>>,
}

impl CryptoVenues {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
        }
    }

    /// Every built-in profile.
    pub fn new() -> Self {
        let mut venues = Self::empty();
        venues.register(Arc::new(SpotVenue::binance()));
        venues.register(Arc::new(SpotVenue::coinbase()));
        venues.register(Arc::new(DerivativesVenue::deribit()));
        venues.register(Arc::new(DerivativesVenue::bybit()));
        venues
    }

    pub fn register(&mut self, profile: Arc<dyn VenueProfile>) {
        self.profiles.insert(profile.id().to_string(), profile);
    }
}

impl Default for CryptoVenues {
    fn default() -> Self {
        Self::new()
    }
}

impl VenueCatalog for CryptoVenues {
    fn profile(&self, venue: &str) -> Option<Arc<dyn VenueProfile>> {
        self.profiles.get(venue).cloned()
    }

    fn venues(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }
}
