use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::price_status::{
    one_cent, CalculationBreakdown, CalculationExtras, DifferenceSummary, PriceState, PriceStatus,
};
use crate::domain::quote::{Quote, QuoteId};
use crate::domain::settings::PriceSettings;
use crate::formula;
use crate::pricing::binder;
use crate::store::{PricingStore, QuotePatch, StoreError};

#[derive(Debug, Error)]
pub enum PriceUpdateError {
    #[error("quote not found: {0}")]
    QuoteNotFound(QuoteId),
    #[error("nothing to apply for quote {0}")]
    NothingToApply(QuoteId),
    #[error("price settings are not available")]
    SettingsUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The settings snapshot the manager currently considers active.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveSettings {
    pub version: i64,
    pub version_id: Option<String>,
}

impl ActiveSettings {
    fn of(settings: &PriceSettings) -> Self {
        Self { version: settings.version, version_id: settings.version_id.clone() }
    }

    fn matches_status(&self, status: &PriceStatus) -> bool {
        status.settings_version == self.version
            && (self.version_id.is_none() || status.settings_version_id == self.version_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalculationOutcome {
    pub quote_id: QuoteId,
    pub state: PriceState,
    /// Calculated price, or the last-known price when the calculation failed.
    pub price: Option<Decimal>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<CalculationBreakdown>,
}

impl CalculationOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub quote_id: QuoteId,
    pub applied_price: Decimal,
    pub applied_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvalidationSweep {
    pub previous_version: i64,
    pub new_version: i64,
    pub scanned: usize,
    pub invalidated: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftOutcome {
    /// No prior calculation to compare against.
    NoBaseline,
    Unchanged,
    PriceDrift { summary: DifferenceSummary },
    ContentDrift { summary: DifferenceSummary },
    CheckFailed { message: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchItem<T> {
    pub quote_id: QuoteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchReport<T> {
    pub items: Vec<BatchItem<T>>,
    pub succeeded: usize,
    pub failed: usize,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self { items: Vec::new(), succeeded: 0, failed: 0 }
    }
}

impl<T> BatchReport<T> {
    fn push_ok(&mut self, quote_id: QuoteId, outcome: T) {
        self.succeeded += 1;
        self.items.push(BatchItem { quote_id, outcome: Some(outcome), error: None });
    }

    fn push_err(&mut self, quote_id: QuoteId, error: impl Into<String>) {
        self.failed += 1;
        self.items.push(BatchItem { quote_id, outcome: None, error: Some(error.into()) });
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub without_status: usize,
    pub pending_apply: usize,
    pub counts: std::collections::BTreeMap<String, usize>,
}

/// Orchestrates lazy invalidation, on-demand recalculation, and explicit
/// application of confirmed prices. One instance per process; the active
/// settings snapshot is the only shared mutable state and lives behind a
/// lock rather than a process-wide global.
pub struct PriceUpdateManager {
    store: Arc<dyn PricingStore>,
    audit: Arc<dyn AuditSink>,
    active: RwLock<ActiveSettings>,
}

impl PriceUpdateManager {
    pub fn new(store: Arc<dyn PricingStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit, active: RwLock::new(ActiveSettings::default()) }
    }

    /// Builds a manager seeded with whatever settings version the store
    /// currently holds.
    pub async fn load(
        store: Arc<dyn PricingStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, PriceUpdateError> {
        let active = match store.get_price_settings().await? {
            Some(settings) => ActiveSettings::of(&settings),
            None => ActiveSettings::default(),
        };
        Ok(Self { store, audit, active: RwLock::new(active) })
    }

    pub async fn active_settings(&self) -> ActiveSettings {
        self.active.read().await.clone()
    }

    /// The status a freshly created quote should embed.
    pub async fn initial_status(&self) -> PriceStatus {
        let active = self.active.read().await;
        PriceStatus::initial(active.version, active.version_id.clone())
    }

    /// Settings-change entry point. Swaps the active snapshot, then sweeps
    /// every quote still pinned to the previous version into `Outdated`.
    /// Nothing is recomputed here; recalculation stays lazy.
    pub async fn on_price_settings_change(
        &self,
        new_settings: &PriceSettings,
    ) -> Result<InvalidationSweep, PriceUpdateError> {
        if let Err(error) = formula::parse(&new_settings.formula) {
            // The settings document is already durably saved by the caller,
            // so staleness tracking must proceed; calculations will surface
            // the formula error per quote.
            warn!(
                event_name = "pricing.settings_formula_invalid",
                version = new_settings.version,
                error = %error,
                "active settings carry a formula that does not parse"
            );
        }

        let previous = {
            let mut active = self.active.write().await;
            let previous = active.clone();
            *active = ActiveSettings::of(new_settings);
            previous
        };

        let quotes = self.store.list_quotes().await?;
        let scanned = quotes.len();
        let mut invalidated = 0usize;

        for quote in quotes {
            let Some(mut status) = quote.price_status else { continue };
            if !previous.matches_status(&status) {
                continue;
            }
            status.mark_outdated(format!(
                "price settings changed from version {} to {}",
                previous.version, new_settings.version
            ));
            if self.store.patch_quote(&quote.id, QuotePatch::status(status)).await? {
                invalidated += 1;
            }
        }

        let sweep = InvalidationSweep {
            previous_version: previous.version,
            new_version: new_settings.version,
            scanned,
            invalidated,
        };
        info!(
            event_name = "pricing.invalidation_sweep_completed",
            previous_version = sweep.previous_version,
            new_version = sweep.new_version,
            scanned = sweep.scanned,
            invalidated = sweep.invalidated,
            "settings change swept quotes to outdated"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                "pricing.settings_changed",
                AuditCategory::Settings,
                "price-update-manager",
                AuditOutcome::Success,
            )
            .with_metadata("previous_version", sweep.previous_version.to_string())
            .with_metadata("new_version", sweep.new_version.to_string())
            .with_metadata("invalidated", sweep.invalidated.to_string()),
        );

        Ok(sweep)
    }

    /// Computes (or returns the cached) price for one quote. Per-quote
    /// computation failures land in the quote's status as `Error` and come
    /// back inside the outcome; `Err` is reserved for missing quotes and
    /// storage faults.
    pub async fn calculate_quote_price(
        &self,
        id: &QuoteId,
        force: bool,
    ) -> Result<CalculationOutcome, PriceUpdateError> {
        let quote = self
            .store
            .get_quote(id)
            .await?
            .ok_or_else(|| PriceUpdateError::QuoteNotFound(id.clone()))?;
        let active = self.active.read().await.clone();

        let mut status = match quote.price_status.clone() {
            Some(status) => {
                if !force && !status.needs_update(active.version, active.version_id.as_deref()) {
                    return Ok(CalculationOutcome {
                        quote_id: id.clone(),
                        state: status.state,
                        price: status.calculated_price,
                        cached: true,
                        error: None,
                        breakdown: status.calculation_details,
                    });
                }
                status
            }
            None => PriceStatus::initial(active.version, active.version_id.clone()),
        };

        let previous_price = status.calculated_price;
        let previous_version = status.settings_version;

        status.mark_calculating();
        self.store.patch_quote(id, QuotePatch::status(status.clone())).await?;

        let Some(settings) = self.store.get_price_settings().await? else {
            return self
                .fail_calculation(&quote, status, "price settings are not available")
                .await;
        };

        let bindings = binder::bind(&settings.parameters, &quote);
        let bound: HashMap<String, f64> =
            bindings.iter().map(|binding| (binding.id.clone(), binding.value)).collect();

        let raw = match formula::evaluate(&settings.formula, &bound) {
            Ok(raw) => raw,
            Err(error) => {
                return self.fail_calculation(&quote, status, error.to_string()).await;
            }
        };
        let Some(price) = to_price(raw) else {
            return self
                .fail_calculation(&quote, status, "result is outside the monetary range")
                .await;
        };

        let breakdown = CalculationBreakdown {
            formula: settings.formula.clone(),
            bindings,
            raw_result: raw,
            price,
        };
        let difference_summary = previous_price.map(|previous| {
            DifferenceSummary::between(
                Some(previous),
                price,
                previous_version,
                settings.version,
            )
        });
        let extras = CalculationExtras {
            settings_version_id: settings.version_id.clone(),
            form_version_id: status.form_version_id.clone(),
            difference_summary,
        };
        status.update_calculation(price, settings.version, breakdown.clone(), extras);
        self.store.patch_quote(id, QuotePatch::status(status.clone())).await?;

        info!(
            event_name = "pricing.calculation_completed",
            quote_id = %id,
            settings_version = settings.version,
            price = %price,
            "quote price calculated"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                "pricing.calculation_completed",
                AuditCategory::Calculation,
                "price-update-manager",
                AuditOutcome::Success,
            )
            .with_metadata("settings_version", settings.version.to_string())
            .with_metadata("price", price.to_string()),
        );

        Ok(CalculationOutcome {
            quote_id: id.clone(),
            state: status.state,
            price: Some(price),
            cached: false,
            error: None,
            breakdown: Some(breakdown),
        })
    }

    async fn fail_calculation(
        &self,
        quote: &Quote,
        mut status: PriceStatus,
        message: impl Into<String>,
    ) -> Result<CalculationOutcome, PriceUpdateError> {
        let message = message.into();
        status.mark_error(message.clone());
        self.store.patch_quote(&quote.id, QuotePatch::status(status.clone())).await?;

        warn!(
            event_name = "pricing.calculation_failed",
            quote_id = %quote.id,
            error = %message,
            "quote price calculation failed"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(quote.id.clone()),
                "pricing.calculation_failed",
                AuditCategory::Calculation,
                "price-update-manager",
                AuditOutcome::Failed,
            )
            .with_metadata("error", message.clone()),
        );

        // Fall back to the last price anyone saw for this quote.
        let fallback = status.calculated_price.or(status.applied_price).or(quote.unit_price);
        Ok(CalculationOutcome {
            quote_id: quote.id.clone(),
            state: status.state,
            price: fallback,
            cached: false,
            error: Some(message),
            breakdown: None,
        })
    }

    /// Commits the calculated price into the quote's displayed price. The
    /// operator confirmation step: refuses when nothing is pending.
    pub async fn apply_quote_price(&self, id: &QuoteId) -> Result<ApplyOutcome, PriceUpdateError> {
        let quote = self
            .store
            .get_quote(id)
            .await?
            .ok_or_else(|| PriceUpdateError::QuoteNotFound(id.clone()))?;
        let Some(mut status) = quote.price_status else {
            return Err(PriceUpdateError::NothingToApply(id.clone()));
        };
        if !status.has_pending_update() {
            return Err(PriceUpdateError::NothingToApply(id.clone()));
        }
        let Some(price) = status.apply_price() else {
            return Err(PriceUpdateError::NothingToApply(id.clone()));
        };

        let applied_at = status.last_applied.unwrap_or_else(Utc::now);
        self.store
            .patch_quote(
                id,
                QuotePatch {
                    price_status: Some(status),
                    unit_price: Some(price),
                    price_updated_at: Some(applied_at),
                },
            )
            .await?;

        info!(
            event_name = "pricing.price_applied",
            quote_id = %id,
            price = %price,
            "calculated price applied to quote"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(id.clone()),
                "pricing.price_applied",
                AuditCategory::Apply,
                "price-update-manager",
                AuditOutcome::Success,
            )
            .with_metadata("price", price.to_string()),
        );

        Ok(ApplyOutcome { quote_id: id.clone(), applied_price: price, applied_at })
    }

    /// Recomputes without committing a new `Current` state, flagging the
    /// quote when the outcome drifted from the stored calculation.
    pub async fn check_quote_drift(&self, id: &QuoteId) -> Result<DriftOutcome, PriceUpdateError> {
        let quote = self
            .store
            .get_quote(id)
            .await?
            .ok_or_else(|| PriceUpdateError::QuoteNotFound(id.clone()))?;
        let Some(mut status) = quote.price_status.clone() else {
            return Ok(DriftOutcome::NoBaseline);
        };
        let Some(previous_price) = status.calculated_price else {
            return Ok(DriftOutcome::NoBaseline);
        };
        let Some(settings) = self.store.get_price_settings().await? else {
            return Err(PriceUpdateError::SettingsUnavailable);
        };

        let bindings = binder::bind(&settings.parameters, &quote);
        let bound: HashMap<String, f64> =
            bindings.iter().map(|binding| (binding.id.clone(), binding.value)).collect();
        let price = match formula::evaluate(&settings.formula, &bound).map(to_price) {
            Ok(Some(price)) => price,
            Ok(None) => {
                return Ok(DriftOutcome::CheckFailed {
                    message: "result is outside the monetary range".to_string(),
                })
            }
            Err(error) => return Ok(DriftOutcome::CheckFailed { message: error.to_string() }),
        };

        let summary = DifferenceSummary::between(
            Some(previous_price),
            price,
            status.settings_version,
            settings.version,
        );
        let version_changed = status.settings_version != settings.version
            || (settings.version_id.is_some()
                && status.settings_version_id != settings.version_id);

        if (price - previous_price).abs() > one_cent() {
            status.mark_price_drift(summary.clone());
            self.store.patch_quote(id, QuotePatch::status(status)).await?;
            return Ok(DriftOutcome::PriceDrift { summary });
        }
        if version_changed {
            status.mark_content_drift(summary.clone());
            self.store.patch_quote(id, QuotePatch::status(status)).await?;
            return Ok(DriftOutcome::ContentDrift { summary });
        }
        Ok(DriftOutcome::Unchanged)
    }

    /// Sequential batch calculation with per-item isolation.
    pub async fn batch_calculate_quotes(
        &self,
        ids: &[QuoteId],
        force: bool,
    ) -> BatchReport<CalculationOutcome> {
        let mut report = BatchReport::default();
        for id in ids {
            match self.calculate_quote_price(id, force).await {
                Ok(outcome) if outcome.succeeded() => report.push_ok(id.clone(), outcome),
                Ok(outcome) => {
                    let message =
                        outcome.error.clone().unwrap_or_else(|| "calculation failed".to_string());
                    report.push_err(id.clone(), message);
                }
                Err(error) => report.push_err(id.clone(), error.to_string()),
            }
        }
        report
    }

    /// Sequential batch apply with per-item isolation. A quote with nothing
    /// pending is a per-item failure, never a batch abort.
    pub async fn batch_apply_prices(&self, ids: &[QuoteId]) -> BatchReport<ApplyOutcome> {
        let mut report = BatchReport::default();
        for id in ids {
            match self.apply_quote_price(id).await {
                Ok(outcome) => report.push_ok(id.clone(), outcome),
                Err(error) => report.push_err(id.clone(), error.to_string()),
            }
        }
        report
    }

    /// Read-only per-state counts for operator dashboards.
    pub async fn get_status_summary(&self) -> Result<StatusSummary, PriceUpdateError> {
        let quotes = self.store.list_quotes().await?;
        let mut summary = StatusSummary { total: quotes.len(), ..StatusSummary::default() };
        for quote in &quotes {
            match &quote.price_status {
                Some(status) => {
                    *summary.counts.entry(status.state.as_str().to_string()).or_insert(0) += 1;
                    if status.has_pending_update() {
                        summary.pending_apply += 1;
                    }
                }
                None => summary.without_status += 1,
            }
        }
        Ok(summary)
    }
}

/// Converts the evaluator's f64 into a monetary Decimal, taming float noise
/// without disturbing prices rounded by the formula itself.
fn to_price(raw: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(raw).map(|price| price.round_dp(6).normalize())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::audit::InMemoryAuditSink;
    use crate::domain::price_status::PriceState;
    use crate::domain::quote::{FieldValue, Quote, QuoteId};
    use crate::domain::settings::{ParameterDef, PriceSettings};
    use crate::store::{MemoryStore, PricingStore};

    use super::{DriftOutcome, PriceUpdateError, PriceUpdateManager};

    fn settings_v(version: i64) -> PriceSettings {
        PriceSettings {
            formula: "ROUND(qty*unit_cost*margin,2)".to_string(),
            parameters: vec![
                ParameterDef::form("qty", "Quantity", "qty"),
                ParameterDef::fixed("unit_cost", "Unit cost", "45"),
                ParameterDef::fixed("margin", "Margin", "1.25"),
            ],
            version,
            version_id: Some(format!("ps-{version}")),
            last_updated: Utc::now(),
        }
    }

    async fn manager_with(
        settings: PriceSettings,
        quotes: Vec<Quote>,
    ) -> (PriceUpdateManager, Arc<MemoryStore>, InMemoryAuditSink) {
        let store = Arc::new(MemoryStore::default());
        store.save_price_settings(settings).await.expect("save settings");
        for quote in quotes {
            store.put_quote(quote).await.expect("put quote");
        }
        let sink = InMemoryAuditSink::default();
        let manager = PriceUpdateManager::load(store.clone(), Arc::new(sink.clone()))
            .await
            .expect("load manager");
        (manager, store, sink)
    }

    fn quote_with_qty(id: &str, version: i64, qty: f64) -> Quote {
        let mut quote = Quote::new(id, version, Some(format!("ps-{version}")));
        quote.qty = Some(qty);
        quote
    }

    #[tokio::test]
    async fn calculation_produces_the_expected_scenario_price() {
        let (manager, _, _) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;

        let outcome = manager
            .calculate_quote_price(&QuoteId("Q-1".to_string()), false)
            .await
            .expect("calculate");

        assert!(!outcome.cached);
        assert_eq!(outcome.state, PriceState::Current);
        assert_eq!(outcome.price, Some(Decimal::new(28_125, 1))); // 2812.5
        let breakdown = outcome.breakdown.expect("breakdown");
        assert_eq!(breakdown.bindings.len(), 3);
    }

    #[tokio::test]
    async fn second_calculation_is_cached_and_leaves_last_calculated_untouched() {
        let (manager, store, _) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        let id = QuoteId("Q-1".to_string());

        manager.calculate_quote_price(&id, false).await.expect("first");
        let first_stamp = store
            .get_quote(&id)
            .await
            .expect("get")
            .and_then(|quote| quote.price_status)
            .and_then(|status| status.last_calculated)
            .expect("stamp");

        let second = manager.calculate_quote_price(&id, false).await.expect("second");
        assert!(second.cached);
        assert_eq!(second.price, Some(Decimal::new(28_125, 1)));

        let second_stamp = store
            .get_quote(&id)
            .await
            .expect("get")
            .and_then(|quote| quote.price_status)
            .and_then(|status| status.last_calculated)
            .expect("stamp");
        assert_eq!(second_stamp, first_stamp);
    }

    #[tokio::test]
    async fn force_recalculates_even_when_current() {
        let (manager, _, _) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        let id = QuoteId("Q-1".to_string());

        manager.calculate_quote_price(&id, false).await.expect("first");
        let forced = manager.calculate_quote_price(&id, true).await.expect("forced");
        assert!(!forced.cached);
    }

    #[tokio::test]
    async fn settings_change_sweeps_only_quotes_on_the_previous_version() {
        let stale = quote_with_qty("Q-old", 3, 10.0);
        let other = quote_with_qty("Q-other", 2, 10.0);
        let (manager, store, _) = manager_with(settings_v(3), vec![stale, other]).await;

        // Both quotes need a current state first so the sweep has something
        // to invalidate.
        manager
            .calculate_quote_price(&QuoteId("Q-old".to_string()), false)
            .await
            .expect("calculate");

        let mut next = settings_v(4);
        next.formula = "qty * unit_cost".to_string();
        store.save_price_settings(next.clone()).await.expect("save");
        let sweep = manager.on_price_settings_change(&next).await.expect("sweep");

        assert_eq!(sweep.previous_version, 3);
        assert_eq!(sweep.new_version, 4);
        assert_eq!(sweep.scanned, 2);
        assert_eq!(sweep.invalidated, 1, "only the version-3 quote flips");

        let swept = store
            .get_quote(&QuoteId("Q-old".to_string()))
            .await
            .expect("get")
            .and_then(|quote| quote.price_status)
            .expect("status");
        assert_eq!(swept.state, PriceState::Outdated);

        let untouched = store
            .get_quote(&QuoteId("Q-other".to_string()))
            .await
            .expect("get")
            .and_then(|quote| quote.price_status)
            .expect("status");
        assert_ne!(untouched.state, PriceState::Outdated);
    }

    #[tokio::test]
    async fn outdated_quote_recalculates_to_current_at_the_new_version() {
        let (manager, store, _) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        let id = QuoteId("Q-1".to_string());
        manager.calculate_quote_price(&id, false).await.expect("calculate at v3");

        let next = settings_v(4);
        store.save_price_settings(next.clone()).await.expect("save");
        manager.on_price_settings_change(&next).await.expect("sweep");

        let outcome = manager.calculate_quote_price(&id, false).await.expect("recalculate");
        assert!(!outcome.cached, "outdated quote must recompute");
        assert_eq!(outcome.state, PriceState::Current);

        let status = store
            .get_quote(&id)
            .await
            .expect("get")
            .and_then(|quote| quote.price_status)
            .expect("status");
        assert_eq!(status.settings_version, 4);
        assert_eq!(status.settings_version_id.as_deref(), Some("ps-4"));
        let summary = status.difference_summary.expect("difference summary");
        assert_eq!(summary.previous_version, 3);
        assert_eq!(summary.new_version, 4);
    }

    #[tokio::test]
    async fn formula_failure_lands_in_error_with_a_fallback_price() {
        let mut bad = settings_v(5);
        bad.formula = "qty * missing_param".to_string();
        let mut quote = quote_with_qty("Q-1", 5, 50.0);
        quote.unit_price = Some(Decimal::new(99_000, 2));
        let (manager, store, _) = manager_with(bad, vec![quote]).await;
        let id = QuoteId("Q-1".to_string());

        let outcome = manager.calculate_quote_price(&id, false).await.expect("calculate");

        assert_eq!(outcome.state, PriceState::Error);
        assert!(outcome.error.as_deref().unwrap_or_default().contains("missing_param"));
        assert_eq!(outcome.price, Some(Decimal::new(99_000, 2)), "falls back to last known");

        let status = store
            .get_quote(&id)
            .await
            .expect("get")
            .and_then(|quote| quote.price_status)
            .expect("status");
        assert_eq!(status.state, PriceState::Error);
        assert!(status.error_message.is_some());
    }

    #[tokio::test]
    async fn apply_commits_the_calculated_price_and_then_refuses_a_second_time() {
        let (manager, store, _) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        let id = QuoteId("Q-1".to_string());
        manager.calculate_quote_price(&id, false).await.expect("calculate");

        let applied = manager.apply_quote_price(&id).await.expect("apply");
        assert_eq!(applied.applied_price, Decimal::new(28_125, 1));

        let quote = store.get_quote(&id).await.expect("get").expect("exists");
        assert_eq!(quote.unit_price, Some(Decimal::new(28_125, 1)));
        let status = quote.price_status.expect("status");
        assert_eq!(status.applied_price, status.calculated_price);
        assert!(!status.has_pending_update());

        let error = manager.apply_quote_price(&id).await.expect_err("nothing left to apply");
        assert!(matches!(error, PriceUpdateError::NothingToApply(_)));
        assert!(error.to_string().contains("nothing to apply"));
    }

    #[tokio::test]
    async fn apply_on_a_quote_without_a_calculation_is_rejected() {
        let (manager, _, _) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        // Unknown state: has_pending_update is true but there is no price.
        let error = manager
            .apply_quote_price(&QuoteId("Q-1".to_string()))
            .await
            .expect_err("no calculated price");
        assert!(matches!(error, PriceUpdateError::NothingToApply(_)));
    }

    #[tokio::test]
    async fn batch_calculate_isolates_per_item_failures() {
        let (manager, _, _) = manager_with(
            settings_v(3),
            vec![quote_with_qty("Q-1", 3, 50.0), quote_with_qty("Q-2", 3, 10.0)],
        )
        .await;

        let report = manager
            .batch_calculate_quotes(
                &[
                    QuoteId("Q-1".to_string()),
                    QuoteId("Q-missing".to_string()),
                    QuoteId("Q-2".to_string()),
                ],
                false,
            )
            .await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.items.len(), 3);
        assert!(report.items[1].error.as_deref().unwrap_or_default().contains("not found"));
        assert!(report.items[2].outcome.is_some(), "failure must not block later items");
    }

    #[tokio::test]
    async fn batch_apply_counts_nothing_to_apply_as_item_failures() {
        let (manager, _, _) = manager_with(
            settings_v(3),
            vec![quote_with_qty("Q-1", 3, 50.0), quote_with_qty("Q-2", 3, 10.0)],
        )
        .await;
        manager
            .calculate_quote_price(&QuoteId("Q-1".to_string()), false)
            .await
            .expect("calculate");

        let report = manager
            .batch_apply_prices(&[QuoteId("Q-1".to_string()), QuoteId("Q-2".to_string())])
            .await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn status_summary_counts_states_and_pending_applies() {
        let (manager, store, _) = manager_with(
            settings_v(3),
            vec![quote_with_qty("Q-1", 3, 50.0), quote_with_qty("Q-2", 3, 10.0)],
        )
        .await;
        let mut bare = Quote::new("Q-3", 3, None);
        bare.price_status = None;
        store.put_quote(bare).await.expect("put");

        manager
            .calculate_quote_price(&QuoteId("Q-1".to_string()), false)
            .await
            .expect("calculate");

        let summary = manager.get_status_summary().await.expect("summary");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.without_status, 1);
        assert_eq!(summary.counts.get("current"), Some(&1));
        assert_eq!(summary.counts.get("unknown"), Some(&1));
        assert_eq!(summary.pending_apply, 2, "calculated-but-unapplied and unknown both pend");
    }

    #[tokio::test]
    async fn drift_check_flags_a_changed_price_after_inputs_change() {
        let (manager, store, _) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        let id = QuoteId("Q-1".to_string());
        manager.calculate_quote_price(&id, false).await.expect("calculate");

        let mut quote = store.get_quote(&id).await.expect("get").expect("exists");
        quote.qty = Some(60.0);
        store.put_quote(quote).await.expect("put");

        let drift = manager.check_quote_drift(&id).await.expect("check");
        let DriftOutcome::PriceDrift { summary } = drift else {
            panic!("expected price drift, got {drift:?}");
        };
        assert_eq!(summary.previous_price, Some(Decimal::new(28_125, 1)));
        assert_eq!(summary.new_price, Decimal::new(33_750, 1));

        let status = store
            .get_quote(&id)
            .await
            .expect("get")
            .and_then(|quote| quote.price_status)
            .expect("status");
        assert_eq!(status.state, PriceState::PriceDrift);
    }

    #[tokio::test]
    async fn drift_check_reports_content_drift_when_only_the_version_moved() {
        // A formula that ignores the changed parameter keeps the price
        // identical across versions.
        let mut fixed_price = settings_v(3);
        fixed_price.formula = "100".to_string();
        let (manager, store, _) =
            manager_with(fixed_price, vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        let id = QuoteId("Q-1".to_string());
        manager.calculate_quote_price(&id, false).await.expect("calculate");

        let mut next = settings_v(4);
        next.formula = "100".to_string();
        store.save_price_settings(next.clone()).await.expect("save");
        manager.on_price_settings_change(&next).await.expect("sweep");

        let drift = manager.check_quote_drift(&id).await.expect("check");
        assert!(matches!(drift, DriftOutcome::ContentDrift { .. }), "got {drift:?}");

        let status = store
            .get_quote(&id)
            .await
            .expect("get")
            .and_then(|quote| quote.price_status)
            .expect("status");
        assert_eq!(status.state, PriceState::ContentDrift);
    }

    #[tokio::test]
    async fn drift_check_without_a_baseline_is_a_no_op() {
        let (manager, _, _) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        let drift = manager
            .check_quote_drift(&QuoteId("Q-1".to_string()))
            .await
            .expect("check");
        assert_eq!(drift, DriftOutcome::NoBaseline);
    }

    #[tokio::test]
    async fn initial_status_is_pinned_to_the_active_version() {
        let (manager, _, _) = manager_with(settings_v(7), Vec::new()).await;
        let status = manager.initial_status().await;
        assert_eq!(status.settings_version, 7);
        assert_eq!(status.settings_version_id.as_deref(), Some("ps-7"));
        assert_eq!(status.state, PriceState::Unknown);
    }

    #[tokio::test]
    async fn audit_trail_covers_sweep_calculation_and_apply() {
        let (manager, store, sink) =
            manager_with(settings_v(3), vec![quote_with_qty("Q-1", 3, 50.0)]).await;
        let id = QuoteId("Q-1".to_string());

        manager.calculate_quote_price(&id, false).await.expect("calculate");
        manager.apply_quote_price(&id).await.expect("apply");
        let next = settings_v(4);
        store.save_price_settings(next.clone()).await.expect("save");
        manager.on_price_settings_change(&next).await.expect("sweep");

        let types: Vec<String> =
            sink.events().into_iter().map(|event| event.event_type).collect();
        assert!(types.contains(&"pricing.calculation_completed".to_string()));
        assert!(types.contains(&"pricing.price_applied".to_string()));
        assert!(types.contains(&"pricing.settings_changed".to_string()));
    }

    #[tokio::test]
    async fn lookup_table_quote_binds_and_prices_material_lists() {
        let settings = PriceSettings {
            formula: "material + thickness".to_string(),
            parameters: vec![
                ParameterDef::form_with_lookup(
                    "material",
                    "Material",
                    "material",
                    BTreeMap::from([
                        ("Alüminyum".to_string(), 10.0),
                        ("Paslanmaz".to_string(), 15.0),
                    ]),
                ),
                ParameterDef::form("thickness", "Thickness", "thickness"),
            ],
            version: 1,
            version_id: None,
            last_updated: Utc::now(),
        };
        let mut quote = Quote::new("Q-1", 1, None);
        quote.thickness = Some(2.0);
        quote.custom_fields.insert(
            "material".to_string(),
            FieldValue::List(vec![FieldValue::from("Alüminyum"), FieldValue::from("Paslanmaz")]),
        );
        let (manager, _, _) = manager_with(settings, vec![quote]).await;

        let outcome = manager
            .calculate_quote_price(&QuoteId("Q-1".to_string()), false)
            .await
            .expect("calculate");
        assert_eq!(outcome.price, Some(Decimal::new(27, 0)));
    }
}
