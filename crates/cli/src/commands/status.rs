use crate::commands::{to_data, with_context, CommandResult, Failure};

pub fn run() -> CommandResult {
    with_context("status", |context| {
        Box::pin(async move {
            let summary = context
                .manager
                .get_status_summary()
                .await
                .map_err(|error| Failure::Operation(error.to_string()))?;
            let active = context.manager.active_settings().await;

            let data = serde_json::json!({
                "active_settings": to_data(&active)?,
                "summary": to_data(&summary)?,
            });
            let message = format!(
                "{} quote(s), {} pending operator action",
                summary.total, summary.pending_apply
            );
            Ok(CommandResult::success_with_data("status", message, Some(data)))
        })
    })
}
