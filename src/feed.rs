//! RSS rate feed: fetching the document and splitting it into records.
//!
//! The feed is an RSS 2.0 document whose `channel/item` entries carry the
//! publication time in `pubDate` and a space-delimited `CODE value` list in
//! `description`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{RatesError, Result};

/// Fixed `pubDate` layout, e.g. `Mon, 16 Oct 2023 03:00:00 +0300`.
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Debug, Deserialize)]
struct Rss {
    #[serde(rename = "channel", default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    description: String,
    #[serde(rename = "pubDate")]
    pub_date: String,
}

/// One feed entry, with its description passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedRecord {
    pub published: DateTime<FixedOffset>,
    pub raw_text: String,
}

/// Parses a feed document into records, in document order.
///
/// A single bad `pubDate` fails the whole document: it means the upstream
/// format changed and nothing from it should be stored.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<FeedRecord>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| RatesError::format(format!("feed is not valid UTF-8: {e}")))?;
    let rss: Rss = quick_xml::de::from_str(text).map_err(|e| RatesError::format(e.to_string()))?;

    let channel = rss
        .channels
        .into_iter()
        .next()
        .ok_or_else(|| RatesError::format("feed has no channel"))?;

    channel
        .items
        .into_iter()
        .map(|item| {
            let published = parse_pub_date(&item.pub_date)?;
            Ok(FeedRecord {
                published,
                raw_text: item.description,
            })
        })
        .collect()
}

pub fn parse_pub_date(value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value.trim(), PUB_DATE_FORMAT).map_err(|source| {
        RatesError::Timestamp {
            value: value.to_string(),
            source,
        }
    })
}

/// Where feed documents come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<u8>>;
}

/// Downloads the feed with a single HTTP GET.
pub struct HttpFeedSource {
    client: Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RatesError::config(format!("can't build feed client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| RatesError::transport(format!("GET {}: {e}", self.url)))?;
        if !resp.status().is_success() {
            return Err(RatesError::transport(format!(
                "can't download the feed: {}",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| RatesError::transport(format!("read body: {e}")))?;

        Ok(body.to_vec())
    }
}
