//! Read-side reshaping of the wide table.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::currency::CurrencyCode;
use crate::error::{RatesError, Result};
use crate::rate_line::decode_rate_line;
use crate::schema::SchemaRegistry;
use crate::store::RateStore;

/// The most recent publication, as received.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LatestRates {
    pub date: DateTime<Utc>,
    pub rates: BTreeMap<CurrencyCode, Decimal>,
}

/// One point of a currency's history.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Rate {
    pub date: DateTime<Utc>,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(RatesError::invalid_request(format!("sort {other} not found"))),
        }
    }
}

pub struct LatestRatesView {
    store: Arc<dyn RateStore>,
}

impl LatestRatesView {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self { store }
    }

    /// Rates of the newest stored row, re-decoded from its raw feed text so
    /// the answer does not depend on which columns exist.
    pub async fn latest(&self) -> Result<LatestRates> {
        let row = self
            .store
            .latest_row()
            .await?
            .ok_or_else(|| RatesError::not_found("no rates stored"))?;

        let rates = decode_rate_line(&row.raw_rates)?
            .into_iter()
            .map(|pair| (pair.code, pair.value))
            .collect();

        Ok(LatestRates {
            date: row.published,
            rates,
        })
    }
}

pub struct SeriesView {
    store: Arc<dyn RateStore>,
    registry: SchemaRegistry,
}

impl SeriesView {
    pub fn new(store: Arc<dyn RateStore>, registry: SchemaRegistry) -> Self {
        Self { store, registry }
    }

    /// Full history of one currency ordered by date. Rows without a value for
    /// the currency are left out.
    pub async fn series(&self, code: &CurrencyCode, order: SortOrder) -> Result<Vec<Rate>> {
        if !self.registry.has_column(code).await? {
            return Err(RatesError::not_found(format!("column {code} not exists")));
        }

        let mut rates: Vec<Rate> = self
            .store
            .column_values(code)
            .await?
            .into_iter()
            .filter_map(|(date, rate)| rate.map(|rate| Rate { date, rate }))
            .collect();

        match order {
            SortOrder::Asc => rates.sort_by(|a, b| a.date.cmp(&b.date)),
            SortOrder::Desc => rates.sort_by(|a, b| b.date.cmp(&a.date)),
        }
        Ok(rates)
    }
}
