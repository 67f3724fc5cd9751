use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::price_status::PriceStatus;
use crate::domain::quote::{Quote, QuoteId};
use crate::domain::settings::PriceSettings;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Backend(String),
    #[error("could not encode or decode a stored record: {0}")]
    Codec(String),
}

/// Partial quote update. Only the set fields are written; the store
/// guarantees the write is atomic for the single record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuotePatch {
    pub price_status: Option<PriceStatus>,
    pub unit_price: Option<Decimal>,
    pub price_updated_at: Option<DateTime<Utc>>,
}

impl QuotePatch {
    pub fn status(status: PriceStatus) -> Self {
        Self { price_status: Some(status), ..Self::default() }
    }

    pub fn apply_to(&self, quote: &mut Quote) {
        if let Some(status) = &self.price_status {
            quote.price_status = Some(status.clone());
        }
        if let Some(unit_price) = self.unit_price {
            quote.unit_price = Some(unit_price);
        }
        if let Some(price_updated_at) = self.price_updated_at {
            quote.price_updated_at = Some(price_updated_at);
            quote.updated_at = price_updated_at;
        }
    }
}

/// Persistence collaborator for quotes and the settings document. Single
/// record writes are atomic; nothing here offers multi-record transactions,
/// so batch callers treat partial failure as a normal outcome.
#[async_trait]
pub trait PricingStore: Send + Sync {
    async fn get_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError>;
    async fn list_quotes(&self) -> Result<Vec<Quote>, StoreError>;
    async fn put_quote(&self, quote: Quote) -> Result<Quote, StoreError>;
    /// Returns false when the quote does not exist.
    async fn patch_quote(&self, id: &QuoteId, patch: QuotePatch) -> Result<bool, StoreError>;
    async fn get_price_settings(&self) -> Result<Option<PriceSettings>, StoreError>;
    async fn save_price_settings(&self, settings: PriceSettings) -> Result<(), StoreError>;
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    quotes: RwLock<HashMap<String, Quote>>,
    settings: RwLock<Option<PriceSettings>>,
}

#[async_trait]
impl PricingStore for MemoryStore {
    async fn get_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        let quotes = self.quotes.read().await;
        Ok(quotes.get(&id.0).cloned())
    }

    async fn list_quotes(&self) -> Result<Vec<Quote>, StoreError> {
        let quotes = self.quotes.read().await;
        let mut all: Vec<Quote> = quotes.values().cloned().collect();
        all.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(all)
    }

    async fn put_quote(&self, quote: Quote) -> Result<Quote, StoreError> {
        let mut quotes = self.quotes.write().await;
        quotes.insert(quote.id.0.clone(), quote.clone());
        Ok(quote)
    }

    async fn patch_quote(&self, id: &QuoteId, patch: QuotePatch) -> Result<bool, StoreError> {
        let mut quotes = self.quotes.write().await;
        match quotes.get_mut(&id.0) {
            Some(quote) => {
                patch.apply_to(quote);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_price_settings(&self) -> Result<Option<PriceSettings>, StoreError> {
        let settings = self.settings.read().await;
        Ok(settings.clone())
    }

    async fn save_price_settings(&self, settings: PriceSettings) -> Result<(), StoreError> {
        let mut slot = self.settings.write().await;
        *slot = Some(settings);
        Ok(())
    }
}
