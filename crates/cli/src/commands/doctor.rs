use serde::Serialize;

use repricer_core::config::{AppConfig, LoadOptions};
use repricer_core::formula;
use repricer_core::store::PricingStore;
use repricer_db::{connect_with_settings, migrations, SqliteStore};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    ok: bool,
    detail: String,
}

fn check(name: &str, result: Result<String, String>) -> CheckResult {
    match result {
        Ok(detail) => CheckResult { name: name.to_string(), ok: true, detail },
        Err(detail) => CheckResult { name: name.to_string(), ok: false, detail },
    }
}

/// Readiness checks: configuration, database connectivity and schema, and
/// the stored settings document (including whether its formula parses).
pub fn run() -> CommandResult {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(check("config", Ok(format!("database.url = {}", config.database.url))));
            config
        }
        Err(error) => {
            checks.push(check("config", Err(error.to_string())));
            return finish(checks);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(check("runtime", Err(error.to_string())));
            return finish(checks);
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => {
                checks.push(check("db_connectivity", Ok("connected".to_string())));
                pool
            }
            Err(error) => {
                checks.push(check("db_connectivity", Err(error.to_string())));
                return;
            }
        };

        match migrations::run_pending(&pool).await {
            Ok(()) => checks.push(check("db_schema", Ok("migrations applied".to_string()))),
            Err(error) => {
                checks.push(check("db_schema", Err(error.to_string())));
                return;
            }
        }

        let store = SqliteStore::new(pool);
        match store.get_price_settings().await {
            Ok(Some(settings)) => {
                checks.push(check(
                    "price_settings",
                    Ok(format!("version {} active", settings.version)),
                ));
                match formula::parse(&settings.formula) {
                    Ok(_) => checks.push(check("formula", Ok("parses".to_string()))),
                    Err(error) => checks.push(check("formula", Err(error.to_string()))),
                }
            }
            Ok(None) => checks.push(check(
                "price_settings",
                Err("no settings document saved yet".to_string()),
            )),
            Err(error) => checks.push(check("price_settings", Err(error.to_string()))),
        }
    });

    finish(checks)
}

fn finish(checks: Vec<CheckResult>) -> CommandResult {
    let failed = checks.iter().filter(|check| !check.ok).count();
    let data = serde_json::to_value(&checks).unwrap_or_default();
    if failed == 0 {
        CommandResult::success_with_data("doctor", "all checks passed", Some(data))
    } else {
        let result = CommandResult::failure(
            "doctor",
            "readiness",
            format!("{failed} of {} check(s) failed", checks.len()),
            5,
        );
        // Failure payloads carry no data; print the checks alongside.
        CommandResult {
            exit_code: result.exit_code,
            output: format!(
                "{}\n{}",
                result.output,
                serde_json::to_string_pretty(&data).unwrap_or_default()
            ),
        }
    }
}
