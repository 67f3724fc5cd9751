use repricer_core::domain::quote::QuoteId;
use repricer_core::pricing::PriceUpdateError;

use crate::commands::{to_data, with_context, CommandResult, Failure};

pub fn run(quote_id: &str) -> CommandResult {
    let id = QuoteId(quote_id.to_string());
    with_context("apply", move |context| {
        Box::pin(async move {
            match context.manager.apply_quote_price(&id).await {
                Ok(outcome) => {
                    let data = to_data(&outcome)?;
                    Ok(CommandResult::success_with_data(
                        "apply",
                        format!("applied price {}", outcome.applied_price),
                        Some(data),
                    ))
                }
                Err(PriceUpdateError::NothingToApply(id)) => Ok(CommandResult::failure(
                    "apply",
                    "nothing_to_apply",
                    format!("nothing to apply for quote {id}"),
                    5,
                )),
                Err(error) => Err(Failure::Operation(error.to_string())),
            }
        })
    })
}
