use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use policyplanner_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run(options: LoadOptions) -> String {
    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let lead_store_api_key = match &config.lead_store.api_key {
        Some(key) => redact_secret(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    let fields = [
        field("storage.url", config.storage.url.clone(), &["PLANNER_STORAGE_URL"]),
        field(
            "storage.max_connections",
            config.storage.max_connections.to_string(),
            &["PLANNER_STORAGE_MAX_CONNECTIONS"],
        ),
        field(
            "storage.timeout_secs",
            config.storage.timeout_secs.to_string(),
            &["PLANNER_STORAGE_TIMEOUT_SECS"],
        ),
        field("otp.base_url", config.otp.base_url.clone(), &["PLANNER_OTP_BASE_URL"]),
        field("otp.timeout_secs", config.otp.timeout_secs.to_string(), &["PLANNER_OTP_TIMEOUT_SECS"]),
        field(
            "otp.resend_cooldown_secs",
            config.otp.resend_cooldown_secs.to_string(),
            &["PLANNER_OTP_RESEND_COOLDOWN_SECS"],
        ),
        field(
            "lead_store.enabled",
            config.lead_store.enabled.to_string(),
            &["PLANNER_LEAD_STORE_ENABLED"],
        ),
        field(
            "lead_store.base_url",
            config.lead_store.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["PLANNER_LEAD_STORE_BASE_URL"],
        ),
        field(
            "lead_store.collection",
            config.lead_store.collection.clone(),
            &["PLANNER_LEAD_STORE_COLLECTION"],
        ),
        field(
            "lead_store.proposal_collection",
            config.lead_store.proposal_collection.clone(),
            &["PLANNER_LEAD_STORE_PROPOSAL_COLLECTION"],
        ),
        field("lead_store.api_key", lead_store_api_key, &["PLANNER_LEAD_STORE_API_KEY"]),
        field(
            "lead_store.timeout_secs",
            config.lead_store.timeout_secs.to_string(),
            &["PLANNER_LEAD_STORE_TIMEOUT_SECS"],
        ),
        field("quotes.base_url", config.quotes.base_url.clone(), &["PLANNER_QUOTES_BASE_URL"]),
        field(
            "quotes.timeout_secs",
            config.quotes.timeout_secs.to_string(),
            &["PLANNER_QUOTES_TIMEOUT_SECS"],
        ),
        field(
            "enquiry.max_dependents",
            config.enquiry.max_dependents.to_string(),
            &["PLANNER_ENQUIRY_MAX_DEPENDENTS"],
        ),
        field(
            "enquiry.trust_restored_mobile",
            config.enquiry.trust_restored_mobile.to_string(),
            &["PLANNER_ENQUIRY_TRUST_RESTORED_MOBILE"],
        ),
        field(
            "enquiry.landing_url",
            config.enquiry.landing_url.clone(),
            &["PLANNER_ENQUIRY_LANDING_URL"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["PLANNER_LOGGING_LEVEL", "PLANNER_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["PLANNER_LOGGING_FORMAT", "PLANNER_LOG_FORMAT"],
        ),
    ];

    let mut lines =
        vec!["effective config (source precedence: overrides > env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }
    lines.join("\n")
}

fn field(
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
) -> (&'static str, String, &'static [&'static str]) {
    (key, value, env_keys)
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from(DEFAULT_CONFIG_FILE);
    if root.exists() {
        return Some(root);
    }

    let nested = Path::new("config").join(DEFAULT_CONFIG_FILE);
    nested.exists().then_some(nested)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let visible: String = trimmed.chars().take(3).collect();
    if trimmed.chars().count() > 8 {
        format!("{visible}***")
    } else {
        "<redacted>".to_string()
    }
}
