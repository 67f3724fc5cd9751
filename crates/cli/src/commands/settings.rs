use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;

use repricer_core::domain::settings::{ParameterDef, PriceSettings};
use repricer_core::formula;
use repricer_core::store::PricingStore;

use crate::commands::{to_data, with_context, CommandResult, Failure};

/// Operator-authored settings document: formula and parameters only. The
/// version fields are assigned here, never hand-edited.
#[derive(Debug, Deserialize)]
struct SettingsInput {
    formula: String,
    parameters: Vec<ParameterDef>,
}

pub fn run_show() -> CommandResult {
    with_context("settings", |context| {
        Box::pin(async move {
            let settings = context
                .store
                .get_price_settings()
                .await
                .map_err(|error| Failure::Db(error.to_string()))?;
            match settings {
                Some(settings) => {
                    let message = format!("active settings version {}", settings.version);
                    let data = to_data(&settings)?;
                    Ok(CommandResult::success_with_data("settings", message, Some(data)))
                }
                None => Ok(CommandResult::success("settings", "no price settings saved yet")),
            }
        })
    })
}

/// Saves a new settings version and immediately runs the invalidation sweep,
/// so no quote can be read as current against the new version before the
/// sweep covered it.
pub fn run_update(file: PathBuf) -> CommandResult {
    let raw = match std::fs::read_to_string(&file) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "settings-update",
                "input",
                format!("could not read {}: {error}", file.display()),
                2,
            )
        }
    };
    let input: SettingsInput = match serde_json::from_str(&raw) {
        Ok(input) => input,
        Err(error) => {
            return CommandResult::failure(
                "settings-update",
                "input",
                format!("could not parse {}: {error}", file.display()),
                2,
            )
        }
    };
    if let Err(error) = formula::parse(&input.formula) {
        return CommandResult::failure(
            "settings-update",
            "formula",
            format!("formula does not parse: {error}"),
            2,
        );
    }

    with_context("settings-update", move |context| {
        Box::pin(async move {
            let current = context
                .store
                .get_price_settings()
                .await
                .map_err(|error| Failure::Db(error.to_string()))?;
            let version = current.map(|settings| settings.version).unwrap_or(0) + 1;

            let settings = PriceSettings {
                formula: input.formula,
                parameters: input.parameters,
                version,
                version_id: Some(format!("ps-{version}")),
                last_updated: Utc::now(),
            };
            context
                .store
                .save_price_settings(settings.clone())
                .await
                .map_err(|error| Failure::Db(error.to_string()))?;

            let sweep = context
                .manager
                .on_price_settings_change(&settings)
                .await
                .map_err(|error| Failure::Operation(error.to_string()))?;

            let message = format!(
                "saved settings version {} and marked {} quote(s) outdated",
                version, sweep.invalidated
            );
            let data = to_data(&sweep)?;
            Ok(CommandResult::success_with_data("settings-update", message, Some(data)))
        })
    })
}
