use policyplanner_core::config::LoadOptions;
use policyplanner_db::{connect_with_settings, migrations};

use crate::commands::{load_config, runtime, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("migrate", failure),
    };
    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(failure) => return CommandResult::from_failure("migrate", failure),
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.storage.url,
            config.storage.max_connections,
            config.storage.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
