use async_trait::async_trait;
use chrono::Utc;

use repricer_core::domain::quote::{Quote, QuoteId};
use repricer_core::domain::settings::PriceSettings;
use repricer_core::store::{PricingStore, QuotePatch, StoreError};

use crate::DbPool;

/// SQLite-backed store. Records are JSON documents; every write touches a
/// single row, which is all the atomicity the pricing core asks for.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn decode_quote(body: &str) -> Result<Quote, StoreError> {
        serde_json::from_str(body).map_err(|error| StoreError::Codec(error.to_string()))
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
        serde_json::to_string(value).map_err(|error| StoreError::Codec(error.to_string()))
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

#[async_trait]
impl PricingStore for SqliteStore {
    async fn get_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM quote WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|(body,)| Self::decode_quote(&body)).transpose()
    }

    async fn list_quotes(&self) -> Result<Vec<Quote>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT body FROM quote ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(|(body,)| Self::decode_quote(body)).collect()
    }

    async fn put_quote(&self, quote: Quote) -> Result<Quote, StoreError> {
        let body = Self::encode(&quote)?;
        sqlx::query(
            "INSERT INTO quote (id, body, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT (id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
        )
        .bind(&quote.id.0)
        .bind(body)
        .bind(quote.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(quote)
    }

    async fn patch_quote(&self, id: &QuoteId, patch: QuotePatch) -> Result<bool, StoreError> {
        let Some(mut quote) = self.get_quote(id).await? else {
            return Ok(false);
        };
        patch.apply_to(&mut quote);
        let body = Self::encode(&quote)?;
        let result = sqlx::query("UPDATE quote SET body = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(&id.0)
            .bind(body)
            .bind(quote.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_price_settings(&self) -> Result<Option<PriceSettings>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM price_settings WHERE slot = 1")
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        row.map(|(body,)| {
            serde_json::from_str(&body).map_err(|error| StoreError::Codec(error.to_string()))
        })
        .transpose()
    }

    async fn save_price_settings(&self, settings: PriceSettings) -> Result<(), StoreError> {
        let body = Self::encode(&settings)?;
        sqlx::query(
            "INSERT INTO price_settings (slot, body, version, updated_at) \
             VALUES (1, ?1, ?2, ?3) \
             ON CONFLICT (slot) DO UPDATE SET body = excluded.body, \
             version = excluded.version, updated_at = excluded.updated_at",
        )
        .bind(body)
        .bind(settings.version)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
