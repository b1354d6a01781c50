//! Ingestion of feed records into the wide rate table.
//!
//! Each record is keyed by its publication time. A record whose row already
//! exists is skipped (or, with [`IngestGate::Column`], has its null cells
//! filled from the stored text). A new record gets its row inserted first and
//! then one column write per currency, adding columns on first sighting.
//!
//! There is no transaction around a record: a failure part way through leaves
//! the row with whatever columns were written before it, and aborts the run.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use uuid::Uuid;

use crate::currency::CurrencyCode;
use crate::error::{RatesError, Result};
use crate::feed::{FeedRecord, FeedSource, parse_feed};
use crate::rate_line::{RatePair, decode_rate_line};
use crate::schema::SchemaRegistry;
use crate::store::RateStore;

/// What an already-stored publication date means for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestGate {
    /// Existing row: skip the record entirely.
    #[default]
    Row,
    /// Existing row: fill any of its currency cells that are still null.
    Column,
}

impl FromStr for IngestGate {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "row" => Ok(Self::Row),
            "column" => Ok(Self::Column),
            other => Err(RatesError::config(format!(
                "unknown ingest gate {other:?}, expected row or column"
            ))),
        }
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub records: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub repaired: usize,
    pub columns_added: Vec<CurrencyCode>,
}

impl IngestReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            records: 0,
            inserted: 0,
            skipped: 0,
            repaired: 0,
            columns_added: Vec::new(),
        }
    }
}

pub struct IngestionCoordinator {
    store: Arc<dyn RateStore>,
    registry: SchemaRegistry,
    feed: Arc<dyn FeedSource>,
    gate: IngestGate,
}

impl IngestionCoordinator {
    pub fn new(
        store: Arc<dyn RateStore>,
        registry: SchemaRegistry,
        feed: Arc<dyn FeedSource>,
        gate: IngestGate,
    ) -> Self {
        Self {
            store,
            registry,
            feed,
            gate,
        }
    }

    /// Fetches the feed and ingests every record in it.
    pub async fn run(&self) -> Result<IngestReport> {
        let run_id = Uuid::new_v4();
        info!("[{run_id}] Fetching rate feed");

        let body = self.feed.fetch().await.inspect_err(|e| {
            error!("[{run_id}] Feed fetch failed: {e}");
        })?;
        let records = parse_feed(&body).inspect_err(|e| {
            error!("[{run_id}] Feed parse failed: {e}");
        })?;

        self.ingest_records(run_id, &records).await
    }

    pub async fn ingest_records(
        &self,
        run_id: Uuid,
        records: &[FeedRecord],
    ) -> Result<IngestReport> {
        let mut report = IngestReport::new(run_id);

        for record in records {
            if let Err(e) = self.ingest_record(record, &mut report).await {
                error!(
                    "[{run_id}] Aborting ingestion at {}: {e}",
                    record.published
                );
                return Err(e);
            }
            report.records += 1;
        }

        info!(
            "[{run_id}] Ingestion finished: {} records, {} inserted, {} skipped, {} repaired, {} new columns",
            report.records,
            report.inserted,
            report.skipped,
            report.repaired,
            report.columns_added.len()
        );
        Ok(report)
    }

    async fn ingest_record(&self, record: &FeedRecord, report: &mut IngestReport) -> Result<()> {
        let published = record.published.with_timezone(&Utc);

        if let Some(existing) = self.store.find_row(published).await? {
            return match self.gate {
                IngestGate::Row => {
                    debug!("[{}] {published} already stored, skipping", report.run_id);
                    report.skipped += 1;
                    Ok(())
                }
                IngestGate::Column => {
                    let pairs = decode_rate_line(&existing.raw_rates)?;
                    let filled = self.fill_missing(published, &pairs, report).await?;
                    if filled > 0 {
                        info!(
                            "[{}] {published}: filled {filled} missing rates",
                            report.run_id
                        );
                        report.repaired += 1;
                    } else {
                        report.skipped += 1;
                    }
                    Ok(())
                }
            };
        }

        // Decode before inserting so a malformed line never leaves an empty row behind.
        let pairs = decode_rate_line(&record.raw_text)?;

        if !self.store.insert_row(published, &record.raw_text).await? {
            debug!(
                "[{}] {published} inserted concurrently, skipping",
                report.run_id
            );
            report.skipped += 1;
            return Ok(());
        }
        info!(
            "[{}] Stored row {published} with {} rates",
            report.run_id,
            pairs.len()
        );

        for pair in &pairs {
            self.write_pair(published, pair, report).await?;
        }
        report.inserted += 1;
        Ok(())
    }

    async fn write_pair(
        &self,
        published: DateTime<Utc>,
        pair: &RatePair,
        report: &mut IngestReport,
    ) -> Result<()> {
        if self.registry.ensure_column(&pair.code).await? {
            report.columns_added.push(pair.code.clone());
        }
        self.store
            .write_value(published, &pair.code, pair.value)
            .await?;
        Ok(())
    }

    async fn fill_missing(
        &self,
        published: DateTime<Utc>,
        pairs: &[RatePair],
        report: &mut IngestReport,
    ) -> Result<usize> {
        let mut filled = 0;
        for pair in pairs {
            let present = self.registry.has_column(&pair.code).await?
                && self
                    .store
                    .read_value(published, &pair.code)
                    .await?
                    .is_some();
            if !present {
                self.write_pair(published, pair, report).await?;
                filled += 1;
            }
        }
        Ok(filled)
    }
}
