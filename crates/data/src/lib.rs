pub mod accounts;
pub mod cache;
pub mod db;
pub mod settings;

pub use accounts::MemoryAccountStore;
pub use cache::MemoryCache;
pub use db::PostgresSettingsStore;
pub use settings::MemorySettingsStore;
