//! Error types shared by the ingestion pipeline and the read views.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Top-level error for every operation in the crate.
#[derive(Error, Debug)]
pub enum RatesError {
    /// Feed unreachable, timed out, or answered with a non-success status.
    #[error("failed to get feed: {0}")]
    Transport(String),

    /// Feed body is not the expected RSS structure.
    #[error("malformed feed: {0}")]
    Format(String),

    /// A record's pubDate is not in the fixed feed date format.
    #[error("invalid publication date {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("malformed rate line: {0}")]
    Decode(#[from] DecodeError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing or incorrect auth header")]
    Unauthorized,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl RatesError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Failures turning a raw rate line into currency/value pairs.
#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("token {token:?} has no value to pair with")]
    DanglingToken { token: String },

    #[error("{token:?} is not a three-letter currency code")]
    InvalidCode { token: String },

    #[error("value {value:?} for {code} is not a decimal number")]
    InvalidValue { code: String, value: String },
}

/// Failures reported by a storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    #[error("no row stored for {0}")]
    MissingRow(DateTime<Utc>),

    #[error("column {0} does not exist")]
    MissingColumn(String),
}

pub type Result<T> = std::result::Result<T, RatesError>;
