pub mod binder;
pub mod manager;

pub use manager::{
    ActiveSettings, ApplyOutcome, BatchItem, BatchReport, CalculationOutcome, DriftOutcome,
    InvalidationSweep, PriceUpdateError, PriceUpdateManager, StatusSummary,
};
