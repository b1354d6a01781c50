//! Storage seam for the wide rate table.
//!
//! One row per publication date holds the raw feed text plus one nullable
//! decimal column per currency code ever seen. Implementations must make
//! `insert_row` a conditional write and `add_column` safe to issue
//! redundantly from concurrent callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::currency::CurrencyCode;
use crate::error::StorageError;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// A stored row as needed by the read side: key plus audit text.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub published: DateTime<Utc>,
    pub raw_rates: String,
}

#[async_trait]
pub trait RateStore: Send + Sync {
    /// Creates the table if it is missing.
    async fn ensure_table(&self) -> StorageResult<()>;

    async fn find_row(&self, published: DateTime<Utc>) -> StorageResult<Option<StoredRow>>;

    /// Put-if-absent insert. Returns `false` when a row with this key was
    /// already present, in which case nothing is written.
    async fn insert_row(&self, published: DateTime<Utc>, raw_rates: &str) -> StorageResult<bool>;

    async fn has_column(&self, code: &CurrencyCode) -> StorageResult<bool>;

    /// Adds a nullable decimal column. Succeeds if the column already exists.
    async fn add_column(&self, code: &CurrencyCode) -> StorageResult<()>;

    /// Every currency column currently in the catalog.
    async fn columns(&self) -> StorageResult<Vec<CurrencyCode>>;

    async fn read_value(
        &self,
        published: DateTime<Utc>,
        code: &CurrencyCode,
    ) -> StorageResult<Option<Decimal>>;

    async fn write_value(
        &self,
        published: DateTime<Utc>,
        code: &CurrencyCode,
        value: Decimal,
    ) -> StorageResult<()>;

    async fn latest_row(&self) -> StorageResult<Option<StoredRow>>;

    /// `(pub_date, value)` for every stored row, unordered.
    async fn column_values(
        &self,
        code: &CurrencyCode,
    ) -> StorageResult<Vec<(DateTime<Utc>, Option<Decimal>)>>;

    /// Releases engine resources. Called once at shutdown.
    async fn close(&self) {}
}
