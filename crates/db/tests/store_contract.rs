use chrono::Utc;
use rust_decimal::Decimal;

use repricer_core::domain::price_status::PriceState;
use repricer_core::domain::quote::{FieldValue, Quote, QuoteId};
use repricer_core::store::{PricingStore, QuotePatch};
use repricer_db::{connect, migrations, SqliteStore};

async fn sqlite_store() -> SqliteStore {
    let pool = connect("sqlite::memory:").await.expect("connect in-memory sqlite");
    migrations::run_pending(&pool).await.expect("apply migrations");
    SqliteStore::new(pool)
}

fn quote_fixture(id: &str) -> Quote {
    let mut quote = Quote::new(id, 1, Some("ps-1".to_string()));
    quote.qty = Some(50.0);
    quote.custom_fields.insert("material".to_string(), FieldValue::from("Paslanmaz"));
    quote
}

#[tokio::test]
async fn quote_documents_round_trip_through_sqlite() {
    let store = sqlite_store().await;
    let quote = quote_fixture("Q-1");

    store.put_quote(quote.clone()).await.expect("put");
    let found = store.get_quote(&quote.id).await.expect("get");

    assert_eq!(found, Some(quote));
}

#[tokio::test]
async fn put_is_an_upsert() {
    let store = sqlite_store().await;
    let mut quote = quote_fixture("Q-1");
    store.put_quote(quote.clone()).await.expect("first put");

    quote.qty = Some(75.0);
    store.put_quote(quote.clone()).await.expect("second put");

    let stored = store.get_quote(&quote.id).await.expect("get").expect("exists");
    assert_eq!(stored.qty, Some(75.0));
    assert_eq!(store.list_quotes().await.expect("list").len(), 1);
}

#[tokio::test]
async fn list_returns_quotes_ordered_by_id() {
    let store = sqlite_store().await;
    store.put_quote(quote_fixture("Q-2")).await.expect("put");
    store.put_quote(quote_fixture("Q-1")).await.expect("put");

    let ids: Vec<String> =
        store.list_quotes().await.expect("list").into_iter().map(|quote| quote.id.0).collect();
    assert_eq!(ids, vec!["Q-1".to_string(), "Q-2".to_string()]);
}

#[tokio::test]
async fn patch_updates_status_and_price_in_place() {
    let store = sqlite_store().await;
    let quote = quote_fixture("Q-1");
    store.put_quote(quote.clone()).await.expect("put");

    let mut status = quote.price_status.clone().expect("status");
    status.mark_outdated("settings changed");
    let now = Utc::now();
    let patched = store
        .patch_quote(
            &quote.id,
            QuotePatch {
                price_status: Some(status),
                unit_price: Some(Decimal::new(281_250, 2)),
                price_updated_at: Some(now),
            },
        )
        .await
        .expect("patch");
    assert!(patched);

    let stored = store.get_quote(&quote.id).await.expect("get").expect("exists");
    assert_eq!(stored.price_status.expect("status").state, PriceState::Outdated);
    assert_eq!(stored.unit_price, Some(Decimal::new(281_250, 2)));
    assert_eq!(stored.qty, Some(50.0), "unrelated fields survive the patch");
}

#[tokio::test]
async fn patch_on_a_missing_quote_reports_false() {
    let store = sqlite_store().await;
    let patched = store
        .patch_quote(&QuoteId("ghost".to_string()), QuotePatch::default())
        .await
        .expect("patch");
    assert!(!patched);
}

#[tokio::test]
async fn settings_slot_upserts_and_round_trips() {
    let store = sqlite_store().await;
    assert!(store.get_price_settings().await.expect("empty").is_none());

    let settings = repricer_db::fixtures::seed_settings();
    store.save_price_settings(settings.clone()).await.expect("save v1");
    assert_eq!(store.get_price_settings().await.expect("get"), Some(settings.clone()));

    let mut next = settings;
    next.version = 2;
    next.version_id = Some("ps-2".to_string());
    store.save_price_settings(next.clone()).await.expect("save v2");

    let stored = store.get_price_settings().await.expect("get").expect("exists");
    assert_eq!(stored.version, 2, "the slot holds exactly one document");
}

#[tokio::test]
async fn seeded_dataset_loads_through_sqlite() {
    let store = sqlite_store().await;
    let summary = repricer_db::seed_demo_data(&store).await.expect("seed");

    assert_eq!(summary.quotes, 3);
    let legacy = store
        .get_quote(&QuoteId("quote-legacy-001".to_string()))
        .await
        .expect("get")
        .expect("exists");
    assert!(legacy.price_status.is_none());
    assert!(repricer_core::needs_migration(&legacy));
}
