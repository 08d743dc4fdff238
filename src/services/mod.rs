// Service exports
pub mod appwrite;
pub mod cache;
pub mod fixtures;
pub mod oracle;
pub mod postgres;

pub use appwrite::{AppwriteClient, AppwriteError};
pub use cache::{CacheKey, CacheStats, CacheStore, CachedValue, StageKey};
pub use fixtures::{FixtureCatalog, FixtureError, FixtureProfileSource};
pub use oracle::AzureOpenAiOracle;
pub use postgres::{PostgresCatalog, PostgresError};
