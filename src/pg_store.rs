//! PostgreSQL engine for the wide rate table.
//!
//! Currency columns are added with `ADD COLUMN IF NOT EXISTS`, and the catalog
//! is read back from `information_schema.columns`. Column names only ever come
//! from [`CurrencyCode`], so interpolating them into statements is safe.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::currency::CurrencyCode;
use crate::error::{RatesError, Result, StorageError};
use crate::store::{RateStore, StorageResult, StoredRow};

pub struct PgRateStore {
    pool: PgPool,
    table: String,
    timeout: Duration,
}

impl PgRateStore {
    pub async fn connect(
        url: &str,
        table: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect(url)
            .await
            .map_err(StorageError::from)?;
        info!("Database connection pool established");

        Self::with_pool(pool, table, timeout)
    }

    pub fn with_pool(pool: PgPool, table: &str, timeout: Duration) -> Result<Self> {
        if !is_valid_table_name(table) {
            return Err(RatesError::config(format!("invalid table name {table:?}")));
        }

        Ok(Self {
            pool,
            table: table.to_string(),
            timeout,
        })
    }

    async fn bounded<T, F>(&self, fut: F) -> StorageResult<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(StorageError::from),
            Err(_) => Err(StorageError::Timeout(self.timeout)),
        }
    }
}

/// Unquoted Postgres identifier: `[a-z_][a-z0-9_]*`.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b'a'..=b'z' | b'_'))
        && bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

fn stored_row(row: PgRow) -> std::result::Result<StoredRow, sqlx::Error> {
    Ok(StoredRow {
        published: row.try_get("pub_date")?,
        raw_rates: row.try_get("rates")?,
    })
}

#[async_trait]
impl RateStore for PgRateStore {
    async fn ensure_table(&self) -> StorageResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (pub_date TIMESTAMPTZ PRIMARY KEY, rates TEXT NOT NULL)",
            self.table
        );
        self.bounded(sqlx::query(&sql).execute(&self.pool)).await?;
        Ok(())
    }

    async fn find_row(&self, published: DateTime<Utc>) -> StorageResult<Option<StoredRow>> {
        let sql = format!(
            "SELECT pub_date, rates FROM {} WHERE pub_date = $1",
            self.table
        );
        let row = self
            .bounded(sqlx::query(&sql).bind(published).fetch_optional(&self.pool))
            .await?;

        Ok(row.map(stored_row).transpose()?)
    }

    async fn insert_row(&self, published: DateTime<Utc>, raw_rates: &str) -> StorageResult<bool> {
        let sql = format!(
            "INSERT INTO {} (pub_date, rates) VALUES ($1, $2) ON CONFLICT (pub_date) DO NOTHING",
            self.table
        );
        let done = self
            .bounded(
                sqlx::query(&sql)
                    .bind(published)
                    .bind(raw_rates)
                    .execute(&self.pool),
            )
            .await?;

        Ok(done.rows_affected() == 1)
    }

    async fn has_column(&self, code: &CurrencyCode) -> StorageResult<bool> {
        let exists = self
            .bounded(
                sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
                     WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2)",
                )
                .bind(self.table.as_str())
                .bind(code.as_str())
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(exists)
    }

    async fn add_column(&self, code: &CurrencyCode) -> StorageResult<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS \"{}\" NUMERIC",
            self.table, code
        );
        self.bounded(sqlx::query(&sql).execute(&self.pool)).await?;
        Ok(())
    }

    async fn columns(&self) -> StorageResult<Vec<CurrencyCode>> {
        let names = self
            .bounded(
                sqlx::query_scalar::<_, String>(
                    "SELECT column_name::text FROM information_schema.columns \
                     WHERE table_schema = current_schema() AND table_name = $1 \
                     ORDER BY column_name",
                )
                .bind(self.table.as_str())
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(names
            .iter()
            .filter_map(|name| CurrencyCode::parse(name).ok())
            .collect())
    }

    async fn read_value(
        &self,
        published: DateTime<Utc>,
        code: &CurrencyCode,
    ) -> StorageResult<Option<Decimal>> {
        let sql = format!("SELECT \"{}\" FROM {} WHERE pub_date = $1", code, self.table);
        let row = self
            .bounded(sqlx::query(&sql).bind(published).fetch_optional(&self.pool))
            .await?
            .ok_or(StorageError::MissingRow(published))?;

        Ok(row.try_get::<Option<Decimal>, _>(0)?)
    }

    async fn write_value(
        &self,
        published: DateTime<Utc>,
        code: &CurrencyCode,
        value: Decimal,
    ) -> StorageResult<()> {
        let sql = format!(
            "UPDATE {} SET \"{}\" = $1 WHERE pub_date = $2",
            self.table, code
        );
        let done = self
            .bounded(
                sqlx::query(&sql)
                    .bind(value)
                    .bind(published)
                    .execute(&self.pool),
            )
            .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::MissingRow(published));
        }

        Ok(())
    }

    async fn latest_row(&self) -> StorageResult<Option<StoredRow>> {
        let sql = format!(
            "SELECT pub_date, rates FROM {} ORDER BY pub_date DESC LIMIT 1",
            self.table
        );
        let row = self
            .bounded(sqlx::query(&sql).fetch_optional(&self.pool))
            .await?;

        Ok(row.map(stored_row).transpose()?)
    }

    async fn column_values(
        &self,
        code: &CurrencyCode,
    ) -> StorageResult<Vec<(DateTime<Utc>, Option<Decimal>)>> {
        let sql = format!("SELECT pub_date, \"{}\" FROM {}", code, self.table);
        let rows = self
            .bounded(sqlx::query(&sql).fetch_all(&self.pool))
            .await?;

        rows.into_iter()
            .map(|row| -> StorageResult<(DateTime<Utc>, Option<Decimal>)> {
                Ok((row.try_get(0)?, row.try_get(1)?))
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
