use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tradegate_brokers_common::{SimulatedConnectorFactory, SimulatedVenue, VenueFixture};
use tradegate_core::Account;
use tradegate_engine::NormalizerConfig;

/// Contents of `tradegate.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub normalizer: NormalizerConfig,
    pub accounts: Vec<Account>,
    /// Fixture file per venue id, relative to the config file.
    pub venues: BTreeMap<String, PathBuf>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: AppConfig =
            toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// One simulated venue per configured fixture.
    pub fn connectors(&self) -> Result<SimulatedConnectorFactory> {
        let mut factory = SimulatedConnectorFactory::new();
        for (venue, file) in &self.venues {
            let path = self.base_dir.join(file);
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read fixture {}", path.display()))?;
            let fixture: VenueFixture = serde_json::from_str(&text)
                .with_context(|| format!("Invalid fixture {}", path.display()))?;
            tracing::debug!(venue = %venue, markets = fixture.markets.len(), "Loaded venue fixture");
            factory.insert(std::sync::Arc::new(SimulatedVenue::new(venue.clone(), fixture)));
        }
        Ok(factory)
    }
}
