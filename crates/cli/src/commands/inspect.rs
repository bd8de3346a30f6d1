use policyplanner_core::config::LoadOptions;
use policyplanner_core::domain::product::ProductSchema;
use policyplanner_core::flows::RESTORE_PERMITTED;
use policyplanner_core::ports::{StoragePort, StorageScope};
use serde_json::{json, Value};

use crate::commands::{load_config, open_storage, parse_product, runtime, CommandResult, Failure};

/// Reports the stored enquiry for one product and what a plain (non-reload)
/// mount would do with it.
pub fn run(options: LoadOptions, product: &str, session_id: &str) -> CommandResult {
    match inspect(options, product, session_id) {
        Ok(report) => CommandResult::report("inspect", "stored enquiry state", report),
        Err(failure) => CommandResult::from_failure("inspect", failure),
    }
}

fn inspect(options: LoadOptions, product: &str, session_id: &str) -> Result<Value, Failure> {
    let kind = parse_product(product)?;
    let config = load_config(options)?;
    let schema = ProductSchema::for_kind(kind, &config.enquiry_policy());
    let keys = schema.keys.clone();
    let flag_scope = schema.restore.flag_scope;

    runtime()?.block_on(async {
        let storage = open_storage(&config, session_id).await?;
        let enquiry = read(&storage, StorageScope::Durable, &keys.enquiry).await?;
        let restore_flag = read(&storage, flag_scope, &keys.restore_flag).await?;
        let last_page = read(&storage, StorageScope::Session, &keys.last_page).await?;
        let reload_would_reset = last_page.as_deref() == Some(keys.page_name.as_str());

        let (record, mount_preview) = match (&restore_flag, &enquiry) {
            (flag, raw) if flag.as_deref() != Some(RESTORE_PERMITTED) => {
                (raw.as_deref().map(parse_or_raw), "fresh:no_restore_permission")
            }
            (_, None) => (None, "fresh:no_payload"),
            (_, Some(raw)) => match schema.mapper.decode(raw) {
                Ok(_) => (Some(parse_or_raw(raw)), "restore"),
                Err(_) => (Some(parse_or_raw(raw)), "fresh:corrupt_payload"),
            },
        };
        storage.pool().close().await;

        Ok(json!({
            "product": kind.as_str(),
            "session_id": session_id,
            "keys": keys,
            "restore_flag": { "scope": flag_scope, "value": restore_flag },
            "last_page": last_page,
            "enquiry": record,
            "mount_preview": mount_preview,
            "reload_here_would_reset": reload_would_reset,
        }))
    })
}

async fn read(
    storage: &dyn StoragePort,
    scope: StorageScope,
    key: &str,
) -> Result<Option<String>, Failure> {
    storage.get(scope, key).await.map_err(|error| ("storage_read", error.to_string(), 4u8))
}

fn parse_or_raw(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| json!({ "unparsed": raw }))
}
