pub mod audit;
pub mod config;
pub mod domain;
pub mod formula;
pub mod migration;
pub mod pricing;
pub mod store;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::price_status::{
    BoundParameter, CalculationBreakdown, CalculationExtras, DifferenceSummary, PriceState,
    PriceStatus,
};
pub use domain::quote::{FieldValue, LegacyBackup, LegacyFlags, Quote, QuoteId};
pub use domain::settings::{ParameterDef, ParameterSource, PriceSettings};
pub use formula::FormulaError;
pub use migration::{
    needs_migration, CleanupReport, LegacyQuoteMigrator, MigrationError, MigrationReport,
    RollbackReport, ValidationReport,
};
pub use pricing::{
    ApplyOutcome, BatchReport, CalculationOutcome, DriftOutcome, InvalidationSweep,
    PriceUpdateError, PriceUpdateManager, StatusSummary,
};
pub use store::{MemoryStore, PricingStore, QuotePatch, StoreError};
