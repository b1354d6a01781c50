use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::currency::CurrencyCode;
use crate::error::StorageError;
use crate::store::{RateStore, StorageResult, StoredRow};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<DateTime<Utc>, Row>,
    columns: BTreeSet<CurrencyCode>,
}

#[derive(Debug)]
struct Row {
    raw_rates: String,
    values: HashMap<CurrencyCode, Decimal>,
}

/// Process-local wide table. Behaves like the Postgres engine, including
/// rejecting writes to columns that were never added.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    table: RwLock<Table>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn row_count(&self) -> usize {
        self.table.read().await.rows.len()
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn ensure_table(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn find_row(&self, published: DateTime<Utc>) -> StorageResult<Option<StoredRow>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&published).map(|row| StoredRow {
            published,
            raw_rates: row.raw_rates.clone(),
        }))
    }

    async fn insert_row(&self, published: DateTime<Utc>, raw_rates: &str) -> StorageResult<bool> {
        let mut table = self.table.write().await;
        if table.rows.contains_key(&published) {
            return Ok(false);
        }

        table.rows.insert(
            published,
            Row {
                raw_rates: raw_rates.to_string(),
                values: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn has_column(&self, code: &CurrencyCode) -> StorageResult<bool> {
        Ok(self.table.read().await.columns.contains(code))
    }

    async fn add_column(&self, code: &CurrencyCode) -> StorageResult<()> {
        self.table.write().await.columns.insert(code.clone());
        Ok(())
    }

    async fn columns(&self) -> StorageResult<Vec<CurrencyCode>> {
        Ok(self.table.read().await.columns.iter().cloned().collect())
    }

    async fn read_value(
        &self,
        published: DateTime<Utc>,
        code: &CurrencyCode,
    ) -> StorageResult<Option<Decimal>> {
        let table = self.table.read().await;
        if !table.columns.contains(code) {
            return Err(StorageError::MissingColumn(code.to_string()));
        }
        let row = table
            .rows
            .get(&published)
            .ok_or(StorageError::MissingRow(published))?;

        Ok(row.values.get(code).copied())
    }

    async fn write_value(
        &self,
        published: DateTime<Utc>,
        code: &CurrencyCode,
        value: Decimal,
    ) -> StorageResult<()> {
        let mut table = self.table.write().await;
        if !table.columns.contains(code) {
            return Err(StorageError::MissingColumn(code.to_string()));
        }
        let row = table
            .rows
            .get_mut(&published)
            .ok_or(StorageError::MissingRow(published))?;

        row.values.insert(code.clone(), value);
        Ok(())
    }

    async fn latest_row(&self) -> StorageResult<Option<StoredRow>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .iter()
            .next_back()
            .map(|(published, row)| StoredRow {
                published: *published,
                raw_rates: row.raw_rates.clone(),
            }))
    }

    async fn column_values(
        &self,
        code: &CurrencyCode,
    ) -> StorageResult<Vec<(DateTime<Utc>, Option<Decimal>)>> {
        let table = self.table.read().await;
        if !table.columns.contains(code) {
            return Err(StorageError::MissingColumn(code.to_string()));
        }

        Ok(table
            .rows
            .iter()
            .map(|(published, row)| (*published, row.values.get(code).copied()))
            .collect())
    }
}
