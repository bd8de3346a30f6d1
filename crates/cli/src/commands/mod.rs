pub mod clear;
pub mod config;
pub mod doctor;
pub mod inspect;
pub mod journey;
pub mod migrate;

use policyplanner_core::config::{AppConfig, LoadOptions};
use policyplanner_core::domain::product::ProductKind;
use policyplanner_db::{connect_with_settings, migrations, SqliteStorage};
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_SESSION_ID: &str = "planner-cli";

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
    report: Option<Value>,
}

/// Failure raised inside a command body: class, message, exit code.
pub(crate) type Failure = (&'static str, String, u8);

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message, None)
    }

    pub fn report(command: &str, message: impl Into<String>, report: Value) -> Self {
        Self::ok(command, message, Some(report))
    }

    fn ok(command: &str, message: impl Into<String>, report: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            report,
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
            report: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn from_failure(command: &str, (error_class, message, exit_code): Failure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(options: LoadOptions) -> Result<AppConfig, Failure> {
    AppConfig::load(options)
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2))
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, Failure> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| ("runtime_init", format!("failed to initialize async runtime: {error}"), 3))
}

pub(crate) fn parse_product(raw: &str) -> Result<ProductKind, Failure> {
    ProductKind::parse(raw).ok_or_else(|| {
        ("invalid_product", format!("unknown product `{raw}` (supertopup|pa|gmc|hospicash)"), 2)
    })
}

/// Connects, applies pending migrations, and binds the store to `session_id`.
pub(crate) async fn open_storage(
    config: &AppConfig,
    session_id: &str,
) -> Result<SqliteStorage, Failure> {
    let pool = connect_with_settings(
        &config.storage.url,
        config.storage.max_connections,
        config.storage.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(SqliteStorage::new(pool, session_id))
}
