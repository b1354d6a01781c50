//! Exchange-rate feed ingestion into a wide, per-currency table, plus the
//! latest-rates and one-currency-series read views served over HTTP.

pub mod config;
pub mod currency;
pub mod error;
pub mod feed;
pub mod http;
pub mod ingest;
pub mod memory_store;
pub mod pg_store;
pub mod rate_line;
pub mod schema;
pub mod store;
pub mod views;

pub use config::{Config, StorageConfig};
pub use currency::CurrencyCode;
pub use error::{DecodeError, RatesError, Result, StorageError};
pub use feed::{FeedRecord, FeedSource, HttpFeedSource};
pub use ingest::{IngestGate, IngestReport, IngestionCoordinator};
pub use memory_store::MemoryRateStore;
pub use pg_store::PgRateStore;
pub use rate_line::{RatePair, decode_rate_line};
pub use schema::SchemaRegistry;
pub use store::{RateStore, StoredRow};
pub use views::{LatestRates, LatestRatesView, Rate, SeriesView, SortOrder};
