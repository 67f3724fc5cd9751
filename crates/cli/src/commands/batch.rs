use repricer_core::domain::quote::QuoteId;
use repricer_core::store::PricingStore;

use crate::commands::{to_data, with_context, CommandContext, CommandResult, Failure};

async fn resolve_ids(
    context: &CommandContext,
    ids: &[String],
    all: bool,
) -> Result<Vec<QuoteId>, Failure> {
    if all {
        let quotes = context
            .store
            .list_quotes()
            .await
            .map_err(|error| Failure::Db(error.to_string()))?;
        return Ok(quotes.into_iter().map(|quote| quote.id).collect());
    }
    if ids.is_empty() {
        return Err(Failure::Operation(
            "no quote ids given; pass ids or use --all".to_string(),
        ));
    }
    Ok(ids.iter().map(|id| QuoteId(id.clone())).collect())
}

pub fn run_calculate(ids: Vec<String>, all: bool, force: bool) -> CommandResult {
    with_context("batch-calculate", move |context| {
        Box::pin(async move {
            let ids = resolve_ids(&context, &ids, all).await?;
            let report = context.manager.batch_calculate_quotes(&ids, force).await;
            let message = format!(
                "calculated {} of {} quote(s), {} failed",
                report.succeeded,
                report.items.len(),
                report.failed
            );
            let data = to_data(&report)?;
            Ok(CommandResult::success_with_data("batch-calculate", message, Some(data)))
        })
    })
}

pub fn run_apply(ids: Vec<String>, all: bool) -> CommandResult {
    with_context("batch-apply", move |context| {
        Box::pin(async move {
            let ids = resolve_ids(&context, &ids, all).await?;
            let report = context.manager.batch_apply_prices(&ids).await;
            let message = format!(
                "applied {} of {} quote(s), {} failed",
                report.succeeded,
                report.items.len(),
                report.failed
            );
            let data = to_data(&report)?;
            Ok(CommandResult::success_with_data("batch-apply", message, Some(data)))
        })
    })
}
