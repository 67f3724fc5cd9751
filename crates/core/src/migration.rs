//! One-shot conversion of quotes from the earlier boolean-flag staleness
//! scheme into the structured price status. Runs as a batch job over the
//! persisted records; there is deliberately no on-the-fly compatibility shim.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::price_status::{PriceState, PriceStatus};
use crate::domain::quote::{LegacyBackup, LegacyFlags, Quote, QuoteId};
use crate::store::{PricingStore, StoreError};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("validation found {0} defect(s); cleanup refused")]
    ValidationFailed(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationFailure {
    pub quote_id: QuoteId,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub total: usize,
    pub migrated: usize,
    pub skipped: usize,
    pub errors: Vec<MigrationFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectKind {
    MissingPriceStatus,
    LingeringLegacyFlags,
    BackupMissingStamp,
    AppliedWithoutCalculated,
    CurrentAtSentinelVersion,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationDefect {
    pub quote_id: QuoteId,
    pub kind: DefectKind,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub valid: bool,
    pub defects: Vec<MigrationDefect>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub cleaned: usize,
    pub skipped: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub restored: usize,
    pub skipped: usize,
}

/// True when the quote still carries the old flag scheme and has not been
/// given a price status yet. Quotes already migrated report false, which is
/// what makes the sweep safe to re-run.
pub fn needs_migration(quote: &Quote) -> bool {
    quote.price_status.is_none()
        && quote.legacy.as_ref().map(|flags| !flags.is_empty()).unwrap_or(false)
}

/// In-place conversion of one quote. Returns false when the quote did not
/// need migrating. The live flags move into `legacy_backup`, stamped for
/// audit and rollback.
pub fn migrate_quote(quote: &mut Quote) -> bool {
    if !needs_migration(quote) {
        return false;
    }
    let flags = quote.legacy.take().unwrap_or_default();
    quote.price_status = Some(status_from_flags(&flags));
    quote.legacy_backup =
        Some(LegacyBackup { flags, migrated: true, migration_date: Utc::now() });
    quote.updated_at = Utc::now();
    true
}

/// Maps the legacy flags onto the structured status. The settings version is
/// left at the 0 sentinel; the first recalculation pins the real version.
fn status_from_flags(flags: &LegacyFlags) -> PriceStatus {
    let mut status = PriceStatus::initial(0, None);
    status.calculated_price = flags.pending_calculated_price;

    let needs_update = flags.needs_price_update.unwrap_or(false);
    let form_changed = flags.form_structure_changed.unwrap_or(false);
    if needs_update || form_changed {
        let mut reasons = flags.price_update_reasons.clone();
        if form_changed {
            reasons.push("form structure changed".to_string());
        }
        if reasons.is_empty() {
            reasons.push("legacy needs-price-update flag was set".to_string());
        }
        status.mark_outdated(reasons.join("; "));
    }
    status
}

pub struct LegacyQuoteMigrator {
    store: Arc<dyn PricingStore>,
    audit: Arc<dyn AuditSink>,
}

impl LegacyQuoteMigrator {
    pub fn new(store: Arc<dyn PricingStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Converts every quote that still needs it. Each quote is handled in
    /// isolation: a failed write is recorded and the sweep continues.
    pub async fn migrate_all_quotes(&self) -> Result<MigrationReport, MigrationError> {
        let started_at = Utc::now();
        let quotes = self.store.list_quotes().await?;
        let total = quotes.len();
        let mut migrated = 0usize;
        let mut skipped = 0usize;
        let mut errors = Vec::new();

        for mut quote in quotes {
            if !migrate_quote(&mut quote) {
                skipped += 1;
                continue;
            }
            let id = quote.id.clone();
            match self.store.put_quote(quote).await {
                Ok(_) => migrated += 1,
                Err(error) => {
                    warn!(
                        event_name = "migration.quote_failed",
                        quote_id = %id,
                        error = %error,
                        "legacy migration failed for one quote"
                    );
                    errors.push(MigrationFailure { quote_id: id, message: error.to_string() });
                }
            }
        }

        let report = MigrationReport {
            total,
            migrated,
            skipped,
            errors,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            event_name = "migration.sweep_completed",
            total = report.total,
            migrated = report.migrated,
            skipped = report.skipped,
            errors = report.errors.len(),
            "legacy migration sweep finished"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                "migration.sweep_completed",
                AuditCategory::Migration,
                "legacy-quote-migrator",
                if report.errors.is_empty() { AuditOutcome::Success } else { AuditOutcome::Failed },
            )
            .with_metadata("total", report.total.to_string())
            .with_metadata("migrated", report.migrated.to_string())
            .with_metadata("skipped", report.skipped.to_string())
            .with_metadata("errors", report.errors.len().to_string()),
        );
        Ok(report)
    }

    /// Read-only structural check across all quotes. Mutates nothing.
    pub async fn validate_migration(&self) -> Result<ValidationReport, MigrationError> {
        let quotes = self.store.list_quotes().await?;
        let checked = quotes.len();
        let mut defects = Vec::new();

        for quote in &quotes {
            let live_flags =
                quote.legacy.as_ref().map(|flags| !flags.is_empty()).unwrap_or(false);

            if live_flags {
                if quote.price_status.is_some() {
                    defects.push(MigrationDefect {
                        quote_id: quote.id.clone(),
                        kind: DefectKind::LingeringLegacyFlags,
                        detail: "live legacy flags coexist with a price status".to_string(),
                    });
                } else {
                    defects.push(MigrationDefect {
                        quote_id: quote.id.clone(),
                        kind: DefectKind::MissingPriceStatus,
                        detail: "quote still carries legacy flags and no price status".to_string(),
                    });
                }
            }

            if let Some(backup) = &quote.legacy_backup {
                if !backup.migrated {
                    defects.push(MigrationDefect {
                        quote_id: quote.id.clone(),
                        kind: DefectKind::BackupMissingStamp,
                        detail: "legacy backup exists without its migrated stamp".to_string(),
                    });
                }
                if quote.price_status.is_none() {
                    defects.push(MigrationDefect {
                        quote_id: quote.id.clone(),
                        kind: DefectKind::MissingPriceStatus,
                        detail: "migrated backup exists but the price status is gone".to_string(),
                    });
                }
            }

            if let Some(status) = &quote.price_status {
                if status.applied_price.is_some() && status.calculated_price.is_none() {
                    defects.push(MigrationDefect {
                        quote_id: quote.id.clone(),
                        kind: DefectKind::AppliedWithoutCalculated,
                        detail: "applied price present without a calculated price".to_string(),
                    });
                }
                if status.state == PriceState::Current && status.settings_version == 0 {
                    defects.push(MigrationDefect {
                        quote_id: quote.id.clone(),
                        kind: DefectKind::CurrentAtSentinelVersion,
                        detail: "status claims current at the migration sentinel version"
                            .to_string(),
                    });
                }
            }
        }

        Ok(ValidationReport { checked, valid: defects.is_empty(), defects })
    }

    /// Strips the preserved `legacy_backup` fields, but only once validation
    /// passes. Migration and cleanup stay two distinct phases.
    pub async fn cleanup_legacy_flags(&self) -> Result<CleanupReport, MigrationError> {
        let validation = self.validate_migration().await?;
        if !validation.valid {
            return Err(MigrationError::ValidationFailed(validation.defects.len()));
        }

        let quotes = self.store.list_quotes().await?;
        let mut cleaned = 0usize;
        let mut skipped = 0usize;
        for mut quote in quotes {
            if quote.legacy_backup.is_none() {
                skipped += 1;
                continue;
            }
            quote.legacy_backup = None;
            quote.updated_at = Utc::now();
            self.store.put_quote(quote).await?;
            cleaned += 1;
        }

        self.audit.emit(
            AuditEvent::new(
                None,
                "migration.cleanup_completed",
                AuditCategory::Migration,
                "legacy-quote-migrator",
                AuditOutcome::Success,
            )
            .with_metadata("cleaned", cleaned.to_string()),
        );
        Ok(CleanupReport { cleaned, skipped })
    }

    /// Emergency path: reconstructs the legacy flags from the backup and
    /// removes the new-architecture fields.
    pub async fn rollback_migration(&self) -> Result<RollbackReport, MigrationError> {
        let quotes = self.store.list_quotes().await?;
        let mut restored = 0usize;
        let mut skipped = 0usize;
        for mut quote in quotes {
            let Some(backup) = quote.legacy_backup.take() else {
                skipped += 1;
                continue;
            };
            quote.legacy = Some(backup.flags);
            quote.price_status = None;
            quote.updated_at = Utc::now();
            self.store.put_quote(quote).await?;
            restored += 1;
        }

        warn!(
            event_name = "migration.rolled_back",
            restored,
            "legacy migration rolled back from backups"
        );
        self.audit.emit(
            AuditEvent::new(
                None,
                "migration.rolled_back",
                AuditCategory::Migration,
                "legacy-quote-migrator",
                AuditOutcome::Success,
            )
            .with_metadata("restored", restored.to_string()),
        );
        Ok(RollbackReport { restored, skipped })
    }
}
