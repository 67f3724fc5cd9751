use repricer_core::domain::quote::QuoteId;
use repricer_core::pricing::PriceUpdateError;

use crate::commands::{to_data, with_context, CommandResult, Failure};

pub fn run(quote_id: &str, force: bool) -> CommandResult {
    let id = QuoteId(quote_id.to_string());
    with_context("calculate", move |context| {
        Box::pin(async move {
            let outcome = match context.manager.calculate_quote_price(&id, force).await {
                Ok(outcome) => outcome,
                Err(PriceUpdateError::QuoteNotFound(id)) => {
                    return Err(Failure::Operation(format!("quote not found: {id}")));
                }
                Err(error) => return Err(Failure::Operation(error.to_string())),
            };

            if let Some(error) = &outcome.error {
                return Ok(CommandResult::failure(
                    "calculate",
                    "calculation",
                    format!("calculation failed: {error}"),
                    5,
                ));
            }
            let message =
                if outcome.cached { "returned cached price" } else { "price calculated" };
            let data = to_data(&outcome)?;
            Ok(CommandResult::success_with_data("calculate", message, Some(data)))
        })
    })
}
