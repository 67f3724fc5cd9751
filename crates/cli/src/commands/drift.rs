use repricer_core::domain::quote::QuoteId;
use repricer_core::pricing::{DriftOutcome, PriceUpdateError};

use crate::commands::{to_data, with_context, CommandResult, Failure};

pub fn run(quote_id: &str) -> CommandResult {
    let id = QuoteId(quote_id.to_string());
    with_context("drift", move |context| {
        Box::pin(async move {
            let outcome = match context.manager.check_quote_drift(&id).await {
                Ok(outcome) => outcome,
                Err(PriceUpdateError::QuoteNotFound(id)) => {
                    return Err(Failure::Operation(format!("quote not found: {id}")));
                }
                Err(error) => return Err(Failure::Operation(error.to_string())),
            };

            let message = match &outcome {
                DriftOutcome::NoBaseline => "no prior calculation to compare against",
                DriftOutcome::Unchanged => "recalculation matches the stored price",
                DriftOutcome::PriceDrift { .. } => "price drift detected",
                DriftOutcome::ContentDrift { .. } => "content drift detected",
                DriftOutcome::CheckFailed { .. } => "drift check could not recompute",
            };
            let data = to_data(&outcome)?;
            Ok(CommandResult::success_with_data("drift", message, Some(data)))
        })
    })
}
