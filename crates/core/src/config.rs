use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::member::DEFAULT_MAX_DEPENDENTS;
use crate::domain::product::{EnquiryPolicy, DEFAULT_LANDING_URL};
use crate::domain::verification::DEFAULT_RESEND_COOLDOWN_SECS;

pub const DEFAULT_CONFIG_FILE: &str = "policyplanner.toml";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:1202";
pub const DEFAULT_LEAD_COLLECTION: &str = "AUX_enquiry_leads";
pub const DEFAULT_PROPOSAL_COLLECTION: &str = "AUX_leads";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub otp: OtpConfig,
    pub lead_store: LeadStoreConfig,
    pub quotes: QuotesConfig,
    pub enquiry: EnquiryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct OtpConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub resend_cooldown_secs: u32,
}

#[derive(Clone, Debug)]
pub struct LeadStoreConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub collection: String,
    /// Collection that proposal hand-offs are copied into.
    pub proposal_collection: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct QuotesConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnquiryConfig {
    pub max_dependents: u8,
    pub trust_restored_mobile: bool,
    pub landing_url: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub storage_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub otp_base_url: Option<String>,
    pub quotes_base_url: Option<String>,
    pub lead_store_enabled: Option<bool>,
    pub lead_store_base_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                url: "sqlite://policyplanner.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            otp: OtpConfig {
                base_url: DEFAULT_API_BASE_URL.to_string(),
                timeout_secs: 15,
                resend_cooldown_secs: DEFAULT_RESEND_COOLDOWN_SECS,
            },
            lead_store: LeadStoreConfig {
                enabled: false,
                base_url: None,
                collection: DEFAULT_LEAD_COLLECTION.to_string(),
                proposal_collection: DEFAULT_PROPOSAL_COLLECTION.to_string(),
                api_key: None,
                timeout_secs: 15,
            },
            quotes: QuotesConfig { base_url: DEFAULT_API_BASE_URL.to_string(), timeout_secs: 30 },
            enquiry: EnquiryConfig {
                max_dependents: DEFAULT_MAX_DEPENDENTS,
                trust_restored_mobile: true,
                landing_url: DEFAULT_LANDING_URL.to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Business policy handed to the product schemas.
    pub fn enquiry_policy(&self) -> EnquiryPolicy {
        EnquiryPolicy {
            max_dependents: self.enquiry.max_dependents,
            trust_restored_mobile: self.enquiry.trust_restored_mobile,
            landing_url: self.enquiry.landing_url.clone(),
            resend_cooldown_secs: self.otp.resend_cooldown_secs,
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(storage) = patch.storage {
            if let Some(url) = storage.url {
                self.storage.url = url;
            }
            if let Some(max_connections) = storage.max_connections {
                self.storage.max_connections = max_connections;
            }
            if let Some(timeout_secs) = storage.timeout_secs {
                self.storage.timeout_secs = timeout_secs;
            }
        }

        if let Some(otp) = patch.otp {
            if let Some(base_url) = otp.base_url {
                self.otp.base_url = base_url;
            }
            if let Some(timeout_secs) = otp.timeout_secs {
                self.otp.timeout_secs = timeout_secs;
            }
            if let Some(resend_cooldown_secs) = otp.resend_cooldown_secs {
                self.otp.resend_cooldown_secs = resend_cooldown_secs;
            }
        }

        if let Some(lead_store) = patch.lead_store {
            if let Some(enabled) = lead_store.enabled {
                self.lead_store.enabled = enabled;
            }
            if let Some(base_url) = lead_store.base_url {
                self.lead_store.base_url = Some(base_url);
            }
            if let Some(collection) = lead_store.collection {
                self.lead_store.collection = collection;
            }
            if let Some(collection) = lead_store.proposal_collection {
                self.lead_store.proposal_collection = collection;
            }
            if let Some(api_key) = lead_store.api_key {
                self.lead_store.api_key = Some(api_key.into());
            }
            if let Some(timeout_secs) = lead_store.timeout_secs {
                self.lead_store.timeout_secs = timeout_secs;
            }
        }

        if let Some(quotes) = patch.quotes {
            if let Some(base_url) = quotes.base_url {
                self.quotes.base_url = base_url;
            }
            if let Some(timeout_secs) = quotes.timeout_secs {
                self.quotes.timeout_secs = timeout_secs;
            }
        }

        if let Some(enquiry) = patch.enquiry {
            if let Some(max_dependents) = enquiry.max_dependents {
                self.enquiry.max_dependents = max_dependents;
            }
            if let Some(trust_restored_mobile) = enquiry.trust_restored_mobile {
                self.enquiry.trust_restored_mobile = trust_restored_mobile;
            }
            if let Some(landing_url) = enquiry.landing_url {
                self.enquiry.landing_url = landing_url;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PLANNER_STORAGE_URL") {
            self.storage.url = value;
        }
        if let Some(value) = read_env("PLANNER_STORAGE_MAX_CONNECTIONS") {
            self.storage.max_connections = parse_value("PLANNER_STORAGE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PLANNER_STORAGE_TIMEOUT_SECS") {
            self.storage.timeout_secs = parse_value("PLANNER_STORAGE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PLANNER_OTP_BASE_URL") {
            self.otp.base_url = value;
        }
        if let Some(value) = read_env("PLANNER_OTP_TIMEOUT_SECS") {
            self.otp.timeout_secs = parse_value("PLANNER_OTP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PLANNER_OTP_RESEND_COOLDOWN_SECS") {
            self.otp.resend_cooldown_secs =
                parse_value("PLANNER_OTP_RESEND_COOLDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("PLANNER_LEAD_STORE_ENABLED") {
            self.lead_store.enabled = parse_value("PLANNER_LEAD_STORE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("PLANNER_LEAD_STORE_BASE_URL") {
            self.lead_store.base_url = Some(value);
        }
        if let Some(value) = read_env("PLANNER_LEAD_STORE_COLLECTION") {
            self.lead_store.collection = value;
        }
        if let Some(value) = read_env("PLANNER_LEAD_STORE_PROPOSAL_COLLECTION") {
            self.lead_store.proposal_collection = value;
        }
        if let Some(value) = read_env("PLANNER_LEAD_STORE_API_KEY") {
            self.lead_store.api_key = Some(value.into());
        }
        if let Some(value) = read_env("PLANNER_LEAD_STORE_TIMEOUT_SECS") {
            self.lead_store.timeout_secs = parse_value("PLANNER_LEAD_STORE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PLANNER_QUOTES_BASE_URL") {
            self.quotes.base_url = value;
        }
        if let Some(value) = read_env("PLANNER_QUOTES_TIMEOUT_SECS") {
            self.quotes.timeout_secs = parse_value("PLANNER_QUOTES_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PLANNER_ENQUIRY_MAX_DEPENDENTS") {
            self.enquiry.max_dependents = parse_value("PLANNER_ENQUIRY_MAX_DEPENDENTS", &value)?;
        }
        if let Some(value) = read_env("PLANNER_ENQUIRY_TRUST_RESTORED_MOBILE") {
            self.enquiry.trust_restored_mobile =
                parse_value("PLANNER_ENQUIRY_TRUST_RESTORED_MOBILE", &value)?;
        }
        if let Some(value) = read_env("PLANNER_ENQUIRY_LANDING_URL") {
            self.enquiry.landing_url = value;
        }

        let log_level =
            read_env("PLANNER_LOGGING_LEVEL").or_else(|| read_env("PLANNER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PLANNER_LOGGING_FORMAT").or_else(|| read_env("PLANNER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(storage_url) = overrides.storage_url {
            self.storage.url = storage_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(otp_base_url) = overrides.otp_base_url {
            self.otp.base_url = otp_base_url;
        }
        if let Some(quotes_base_url) = overrides.quotes_base_url {
            self.quotes.base_url = quotes_base_url;
        }
        if let Some(enabled) = overrides.lead_store_enabled {
            self.lead_store.enabled = enabled;
        }
        if let Some(base_url) = overrides.lead_store_base_url {
            self.lead_store.base_url = Some(base_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_storage(&self.storage)?;
        validate_otp(&self.otp)?;
        validate_lead_store(&self.lead_store)?;
        validate_quotes(&self.quotes)?;
        validate_enquiry(&self.enquiry)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), Path::new("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{field} must start with http:// or https://")))
    }
}

fn validate_timeout(field: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{field} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    let url = storage.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "storage.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if storage.max_connections == 0 {
        return Err(ConfigError::Validation(
            "storage.max_connections must be greater than zero".to_string(),
        ));
    }

    validate_timeout("storage.timeout_secs", storage.timeout_secs)
}

fn validate_otp(otp: &OtpConfig) -> Result<(), ConfigError> {
    validate_http_url("otp.base_url", &otp.base_url)?;
    validate_timeout("otp.timeout_secs", otp.timeout_secs)?;
    if otp.resend_cooldown_secs == 0 || otp.resend_cooldown_secs > 600 {
        return Err(ConfigError::Validation(
            "otp.resend_cooldown_secs must be in range 1..=600".to_string(),
        ));
    }
    Ok(())
}

fn validate_lead_store(lead_store: &LeadStoreConfig) -> Result<(), ConfigError> {
    if lead_store.enabled {
        let Some(base_url) = lead_store.base_url.as_deref().filter(|url| !url.trim().is_empty())
        else {
            return Err(ConfigError::Validation(
                "lead_store.enabled is true but lead_store.base_url is not set".to_string(),
            ));
        };
        validate_http_url("lead_store.base_url", base_url)?;
    }

    if lead_store.collection.trim().is_empty() {
        return Err(ConfigError::Validation("lead_store.collection must not be empty".to_string()));
    }
    if lead_store.proposal_collection.trim().is_empty() {
        return Err(ConfigError::Validation(
            "lead_store.proposal_collection must not be empty".to_string(),
        ));
    }

    let blank_key =
        lead_store.api_key.as_ref().is_some_and(|key| key.expose_secret().trim().is_empty());
    if blank_key {
        return Err(ConfigError::Validation(
            "lead_store.api_key is set but empty; remove it or provide a key".to_string(),
        ));
    }

    validate_timeout("lead_store.timeout_secs", lead_store.timeout_secs)
}

fn validate_quotes(quotes: &QuotesConfig) -> Result<(), ConfigError> {
    validate_http_url("quotes.base_url", &quotes.base_url)?;
    validate_timeout("quotes.timeout_secs", quotes.timeout_secs)
}

fn validate_enquiry(enquiry: &EnquiryConfig) -> Result<(), ConfigError> {
    if !(1..=8).contains(&enquiry.max_dependents) {
        return Err(ConfigError::Validation(
            "enquiry.max_dependents must be in range 1..=8".to_string(),
        ));
    }
    validate_http_url("enquiry.landing_url", &enquiry.landing_url)
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    otp: Option<OtpPatch>,
    lead_store: Option<LeadStorePatch>,
    quotes: Option<QuotesPatch>,
    enquiry: Option<EnquiryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OtpPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    resend_cooldown_secs: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LeadStorePatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    collection: Option<String>,
    proposal_collection: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct QuotesPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnquiryPatch {
    max_dependents: Option<u8>,
    trust_restored_mobile: Option<bool>,
    landing_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
