use std::sync::Arc;

use repricer_core::audit::NullAuditSink;
use repricer_core::migration::{LegacyQuoteMigrator, MigrationError};

use crate::commands::{to_data, with_context, CommandResult, Failure};

pub fn run_migrate() -> CommandResult {
    with_context("legacy-migrate", |context| {
        Box::pin(async move {
            let migrator =
                LegacyQuoteMigrator::new(context.store.clone(), Arc::new(NullAuditSink));
            let report = migrator
                .migrate_all_quotes()
                .await
                .map_err(|error| Failure::Operation(error.to_string()))?;
            let message = format!(
                "migrated {} quote(s), skipped {}, {} error(s)",
                report.migrated,
                report.skipped,
                report.errors.len()
            );
            let data = to_data(&report)?;
            Ok(CommandResult::success_with_data("legacy-migrate", message, Some(data)))
        })
    })
}

pub fn run_validate() -> CommandResult {
    with_context("legacy-validate", |context| {
        Box::pin(async move {
            let migrator =
                LegacyQuoteMigrator::new(context.store.clone(), Arc::new(NullAuditSink));
            let report = migrator
                .validate_migration()
                .await
                .map_err(|error| Failure::Operation(error.to_string()))?;
            let data = to_data(&report)?;
            if report.valid {
                Ok(CommandResult::success_with_data(
                    "legacy-validate",
                    format!("checked {} quote(s), no defects", report.checked),
                    Some(data),
                ))
            } else {
                // Structural defects are the command's finding, not a crash.
                Ok(CommandResult::failure(
                    "legacy-validate",
                    "validation",
                    format!("found {} defect(s) across {} quote(s)", report.defects.len(), report.checked),
                    5,
                ))
            }
        })
    })
}

pub fn run_cleanup() -> CommandResult {
    with_context("legacy-cleanup", |context| {
        Box::pin(async move {
            let migrator =
                LegacyQuoteMigrator::new(context.store.clone(), Arc::new(NullAuditSink));
            match migrator.cleanup_legacy_flags().await {
                Ok(report) => {
                    let data = to_data(&report)?;
                    Ok(CommandResult::success_with_data(
                        "legacy-cleanup",
                        format!("stripped backups from {} quote(s)", report.cleaned),
                        Some(data),
                    ))
                }
                Err(MigrationError::ValidationFailed(defects)) => Ok(CommandResult::failure(
                    "legacy-cleanup",
                    "validation",
                    format!("cleanup refused: validation found {defects} defect(s)"),
                    5,
                )),
                Err(error) => Err(Failure::Operation(error.to_string())),
            }
        })
    })
}

pub fn run_rollback() -> CommandResult {
    with_context("legacy-rollback", |context| {
        Box::pin(async move {
            let migrator =
                LegacyQuoteMigrator::new(context.store.clone(), Arc::new(NullAuditSink));
            let report = migrator
                .rollback_migration()
                .await
                .map_err(|error| Failure::Operation(error.to_string()))?;
            let data = to_data(&report)?;
            Ok(CommandResult::success_with_data(
                "legacy-rollback",
                format!("restored legacy flags on {} quote(s)", report.restored),
                Some(data),
            ))
        })
    })
}
