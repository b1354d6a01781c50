use std::sync::Arc;

use log::info;

use crate::currency::CurrencyCode;
use crate::error::Result;
use crate::store::RateStore;

/// Which currency codes have a backing column in the wide table.
///
/// Adding a column is check-then-put-if-absent against the engine catalog;
/// columns are never dropped.
#[derive(Clone)]
pub struct SchemaRegistry {
    store: Arc<dyn RateStore>,
}

impl SchemaRegistry {
    pub fn new(store: Arc<dyn RateStore>) -> Self {
        Self { store }
    }

    pub async fn has_column(&self, code: &CurrencyCode) -> Result<bool> {
        Ok(self.store.has_column(code).await?)
    }

    /// Makes sure `code` has a column. Returns `true` if this call found it
    /// missing and added it.
    pub async fn ensure_column(&self, code: &CurrencyCode) -> Result<bool> {
        if self.store.has_column(code).await? {
            return Ok(false);
        }

        self.store.add_column(code).await?;
        info!("Added column {} to rate table", code);
        Ok(true)
    }

    pub async fn columns(&self) -> Result<Vec<CurrencyCode>> {
        Ok(self.store.columns().await?)
    }
}
