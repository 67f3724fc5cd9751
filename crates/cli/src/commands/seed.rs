use repricer_db::seed_demo_data;

use crate::commands::{to_data, with_context, CommandResult, Failure};

pub fn run() -> CommandResult {
    with_context("seed", |context| {
        Box::pin(async move {
            let summary = seed_demo_data(context.store.as_ref())
                .await
                .map_err(|error| Failure::Db(error.to_string()))?;
            let message = format!(
                "seeded {} quote(s) at settings version {}",
                summary.quotes, summary.settings_version
            );
            let data = to_data(&summary)?;
            Ok(CommandResult::success_with_data("seed", message, Some(data)))
        })
    })
}
