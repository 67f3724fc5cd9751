pub mod apply;
pub mod batch;
pub mod calculate;
pub mod doctor;
pub mod drift;
pub mod legacy;
pub mod migrate;
pub mod seed;
pub mod settings;
pub mod status;

use std::sync::Arc;

use serde::Serialize;

use repricer_core::audit::NullAuditSink;
use repricer_core::config::{AppConfig, LoadOptions};
use repricer_core::pricing::PriceUpdateManager;
use repricer_db::{connect_with_settings, migrations, SqliteStore};

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string_pretty(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Everything a pricing command needs once the store is open.
pub(crate) struct CommandContext {
    pub store: Arc<SqliteStore>,
    pub manager: PriceUpdateManager,
}

pub(crate) enum Failure {
    Config(String),
    Runtime(String),
    Db(String),
    Operation(String),
}

impl Failure {
    fn into_result(self, command: &str) -> CommandResult {
        match self {
            Self::Config(message) => {
                CommandResult::failure(command, "config_validation", message, 2)
            }
            Self::Runtime(message) => CommandResult::failure(command, "runtime_init", message, 3),
            Self::Db(message) => CommandResult::failure(command, "db_connectivity", message, 4),
            Self::Operation(message) => CommandResult::failure(command, "operation", message, 5),
        }
    }
}

/// Shared command scaffolding: load config, stand up a current-thread
/// runtime, open the store (applying pending schema migrations), build the
/// manager seeded from the stored settings, then run the body.
pub(crate) fn with_context<F>(command: &str, body: F) -> CommandResult
where
    F: FnOnce(
        CommandContext,
    )
        -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<CommandResult, Failure>>>>,
{
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return Failure::Config(format!("configuration issue: {error}")).into_result(command)
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return Failure::Runtime(format!("failed to initialize async runtime: {error}"))
                .into_result(command)
        }
    };

    let result = runtime.block_on(async {
        let context = open_context(&config).await?;
        body(context).await
    });

    match result {
        Ok(result) => result,
        Err(failure) => failure.into_result(command),
    }
}

async fn open_context(config: &AppConfig) -> Result<CommandContext, Failure> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| Failure::Db(error.to_string()))?;

    migrations::run_pending(&pool).await.map_err(|error| Failure::Db(error.to_string()))?;

    let store = Arc::new(SqliteStore::new(pool));
    let manager = PriceUpdateManager::load(store.clone(), Arc::new(NullAuditSink))
        .await
        .map_err(|error| Failure::Db(error.to_string()))?;

    Ok(CommandContext { store, manager })
}

pub(crate) fn to_data<T: Serialize>(value: &T) -> Result<serde_json::Value, Failure> {
    serde_json::to_value(value).map_err(|error| Failure::Operation(error.to_string()))
}
