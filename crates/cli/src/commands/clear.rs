use policyplanner_core::config::LoadOptions;
use policyplanner_core::domain::product::ProductSchema;
use policyplanner_core::ports::{StoragePort, StorageScope};
use tracing::info;

use crate::commands::{load_config, open_storage, parse_product, runtime, CommandResult, Failure};

pub fn run(options: LoadOptions, product: &str, session_id: &str) -> CommandResult {
    match clear(options, product, session_id) {
        Ok(message) => CommandResult::success("clear", message),
        Err(failure) => CommandResult::from_failure("clear", failure),
    }
}

fn clear(options: LoadOptions, product: &str, session_id: &str) -> Result<String, Failure> {
    let kind = parse_product(product)?;
    let config = load_config(options)?;
    let schema = ProductSchema::for_kind(kind, &config.enquiry_policy());
    let keys = &schema.keys;

    runtime()?.block_on(async {
        let storage = open_storage(&config, session_id).await?;
        let targets = [
            (StorageScope::Durable, keys.enquiry.as_str()),
            (schema.restore.flag_scope, keys.restore_flag.as_str()),
            (StorageScope::Session, keys.last_page.as_str()),
        ];
        for (scope, key) in targets {
            storage
                .remove(scope, key)
                .await
                .map_err(|error| ("storage_write", error.to_string(), 4u8))?;
        }
        storage.pool().close().await;

        info!(
            event_name = "storage.enquiry.cleared",
            product = %kind,
            session_id = %session_id,
            "stored enquiry cleared"
        );
        Ok(format!("cleared stored enquiry for {kind}"))
    })
}
