//! Deterministic demo fixtures for local development and smoke runs.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use repricer_core::domain::quote::{FieldValue, LegacyFlags, Quote};
use repricer_core::domain::settings::{ParameterDef, PriceSettings};
use repricer_core::store::{PricingStore, StoreError};

pub const SEED_SETTINGS_VERSION: i64 = 1;
pub const SEED_QUOTE_IDS: &[&str] = &["quote-sheet-001", "quote-sheet-002", "quote-legacy-001"];

#[derive(Clone, Debug, Serialize)]
pub struct SeedSummary {
    pub settings_version: i64,
    pub quotes: usize,
    pub legacy_quotes: usize,
}

pub fn seed_settings() -> PriceSettings {
    PriceSettings {
        formula: "ROUND(qty * (unit_cost + material + thickness * cut_rate) * margin, 2)"
            .to_string(),
        parameters: vec![
            ParameterDef::form("qty", "Quantity", "qty"),
            ParameterDef::fixed("unit_cost", "Unit cost", "45"),
            ParameterDef::form_with_lookup(
                "material",
                "Material surcharge",
                "material",
                BTreeMap::from([
                    ("Alüminyum".to_string(), 10.0),
                    ("Paslanmaz".to_string(), 15.0),
                    ("Siyah Sac".to_string(), 6.0),
                ]),
            ),
            ParameterDef::form("thickness", "Thickness", "thickness"),
            ParameterDef::fixed("cut_rate", "Cutting rate", "2.4"),
            ParameterDef::fixed("margin", "Margin multiplier", "1.25"),
        ],
        version: SEED_SETTINGS_VERSION,
        version_id: Some(format!("ps-{SEED_SETTINGS_VERSION}")),
        last_updated: Utc::now(),
    }
}

fn seed_quotes() -> Vec<Quote> {
    let version_id = Some(format!("ps-{SEED_SETTINGS_VERSION}"));

    let mut sheet = Quote::new("quote-sheet-001", SEED_SETTINGS_VERSION, version_id.clone());
    sheet.reference = Some("Acme laser-cut panels".to_string());
    sheet.qty = Some(50.0);
    sheet.thickness = Some(3.0);
    sheet.custom_fields.insert("material".to_string(), FieldValue::from("Paslanmaz"));

    let mut mixed = Quote::new("quote-sheet-002", SEED_SETTINGS_VERSION, version_id);
    mixed.reference = Some("Globex mixed-material batch".to_string());
    mixed.qty = Some(120.0);
    mixed.thickness = Some(1.5);
    mixed.length = Some(100.0);
    mixed.width = Some(40.0);
    mixed.custom_fields.insert(
        "material".to_string(),
        FieldValue::List(vec![FieldValue::from("Alüminyum"), FieldValue::from("Siyah Sac")]),
    );

    // One quote still on the old flag scheme, so migration has work to do.
    let mut legacy = Quote::new("quote-legacy-001", 0, None);
    legacy.reference = Some("Initech pre-migration order".to_string());
    legacy.qty = Some(10.0);
    legacy.unit_price = Some(Decimal::new(74_900, 2));
    legacy.price_status = None;
    legacy.legacy = Some(LegacyFlags {
        needs_price_update: Some(true),
        pending_calculated_price: Some(Decimal::new(81_200, 2)),
        price_update_reasons: vec!["price settings updated".to_string()],
        form_structure_changed: None,
    });

    vec![sheet, mixed, legacy]
}

/// Seeds the store. Re-running overwrites the same records, so the dataset
/// stays deterministic.
pub async fn seed_demo_data(store: &dyn PricingStore) -> Result<SeedSummary, StoreError> {
    store.save_price_settings(seed_settings()).await?;
    let quotes = seed_quotes();
    let mut legacy_quotes = 0usize;
    for quote in &quotes {
        if quote.legacy.is_some() {
            legacy_quotes += 1;
        }
        store.put_quote(quote.clone()).await?;
    }
    Ok(SeedSummary {
        settings_version: SEED_SETTINGS_VERSION,
        quotes: quotes.len(),
        legacy_quotes,
    })
}

#[cfg(test)]
mod tests {
    use repricer_core::store::{MemoryStore, PricingStore};

    use super::{seed_demo_data, SEED_QUOTE_IDS};

    #[tokio::test]
    async fn seeding_is_deterministic_and_re_runnable() {
        let store = MemoryStore::default();

        let first = seed_demo_data(&store).await.expect("first seed");
        let second = seed_demo_data(&store).await.expect("second seed");

        assert_eq!(first.quotes, SEED_QUOTE_IDS.len());
        assert_eq!(second.quotes, first.quotes);
        assert_eq!(first.legacy_quotes, 1);
        assert_eq!(store.list_quotes().await.expect("list").len(), SEED_QUOTE_IDS.len());
    }
}
