use policyplanner_core::config::{AppConfig, LoadOptions};
use policyplanner_db::connect_with_settings;
use policyplanner_gateway::Collaborators;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> String {
    let report = build_report(options);

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(options) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_collaborators(&config));
            checks.push(check_lead_store(&config));
            checks.push(check_storage_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck::skipped("collaborator_clients"));
            checks.push(DoctorCheck::skipped("lead_store"));
            checks.push(DoctorCheck::skipped("storage_connectivity"));
        }
    }

    // A disabled lead store is a valid deployment; only failures count.
    let healthy = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if healthy { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if healthy {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_collaborators(config: &AppConfig) -> DoctorCheck {
    match Collaborators::from_config(config) {
        Ok(_) => DoctorCheck {
            name: "collaborator_clients",
            status: CheckStatus::Pass,
            details: format!(
                "otp at `{}`, quotes at `{}`",
                config.otp.base_url, config.quotes.base_url
            ),
        },
        Err(error) => DoctorCheck {
            name: "collaborator_clients",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_lead_store(config: &AppConfig) -> DoctorCheck {
    match (&config.lead_store.base_url, config.lead_store.enabled) {
        (Some(base_url), true) => DoctorCheck {
            name: "lead_store",
            status: CheckStatus::Pass,
            details: format!(
                "leads go to `{base_url}/{}` ({})",
                config.lead_store.collection,
                if config.lead_store.api_key.is_some() { "authenticated" } else { "anonymous" }
            ),
        },
        _ => DoctorCheck {
            name: "lead_store",
            status: CheckStatus::Skipped,
            details: "lead store disabled; enquiries are only persisted locally".to_string(),
        },
    }
}

fn check_storage_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "storage_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.storage.url,
            config.storage.max_connections,
            config.storage.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to storage: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "storage_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.storage.url),
        },
        Err(error) => {
            DoctorCheck { name: "storage_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
