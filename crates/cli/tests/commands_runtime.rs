use std::fs;
use std::path::Path;

use policyplanner_cli::commands::{clear, config, doctor, inspect, journey, migrate};
use policyplanner_core::config::{ConfigOverrides, LoadOptions};
use serde_json::{json, Value};
use tempfile::TempDir;

fn options_for(dir: &TempDir) -> LoadOptions {
    let database = dir.path().join("planner.db");
    LoadOptions {
        config_path: Some(dir.path().join("absent.toml")),
        require_file: false,
        overrides: ConfigOverrides {
            storage_url: Some(format!("sqlite://{}", database.display())),
            ..ConfigOverrides::default()
        },
    }
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn write_script(dir: &TempDir, name: &str, script: Value) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, script.to_string()).expect("write script");
    path
}

fn personal_accident_script() -> Value {
    json!({
        "product": "pa",
        "actions": [
            { "action": "toggle_member", "member": "spouse" },
            { "action": "next" },
            { "action": "set_age", "member": "you", "value": "42" },
            { "action": "set_field", "name": "firstName", "value": "anita" },
            { "action": "set_field", "name": "lastName", "value": "desai" },
            { "action": "set_field", "name": "dob", "value": "1983-08-21" },
            { "action": "set_field", "name": "mobile", "value": "9876543210" },
            { "action": "set_field", "name": "pincode", "value": "400001" },
            { "action": "set_field", "name": "city", "value": "mumbai" },
            { "action": "next" },
            { "action": "set_gender", "gender": "Female" },
            { "action": "set_field", "name": "occupation", "value": "salaried" },
            { "action": "set_field", "name": "incomeRange", "value": "5-10L" },
            { "action": "set_field", "name": "coverAmount", "value": "2500000" },
            { "action": "set_field", "name": "riskCategory", "value": "1" },
            { "action": "submit" }
        ]
    })
}

fn run_journey(dir: &TempDir, script: &Path, session: &str) -> Value {
    let result = journey::run(options_for(dir), script, session);
    assert_eq!(result.exit_code, 0, "journey should run: {}", result.output);
    parse_payload(&result.output)
}

#[test]
fn migrate_returns_success_against_a_fresh_database() {
    let dir = TempDir::new().expect("tempdir");
    let result = migrate::run(options_for(&dir));
    assert_eq!(result.exit_code, 0, "expected successful migrate run");

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "migrate");
    assert_eq!(payload["status"], "ok");
}

#[test]
fn invalid_configuration_is_a_config_validation_failure() {
    let dir = TempDir::new().expect("tempdir");
    let mut options = options_for(&dir);
    options.overrides.otp_base_url = Some("ftp://otp.example.com".to_string());

    let result = migrate::run(options);
    assert_eq!(result.exit_code, 2);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["error_class"], "config_validation");
}

#[test]
fn config_output_attributes_sources_and_redacts_nothing_it_should_not() {
    let dir = TempDir::new().expect("tempdir");
    let output = config::run(options_for(&dir));
    assert!(output.starts_with("effective config"));
    assert!(output.contains("- enquiry.max_dependents = 4 (source: default)"));
    assert!(output.contains("- lead_store.api_key = <unset>"));
}

#[test]
fn doctor_json_reports_every_check() {
    let dir = TempDir::new().expect("tempdir");
    let payload = parse_payload(&doctor::run(options_for(&dir), true));

    assert_eq!(payload["overall_status"], "pass");
    let names: Vec<&str> = payload["checks"]
        .as_array()
        .expect("checks array")
        .iter()
        .filter_map(|check| check["name"].as_str())
        .collect();
    assert_eq!(
        names,
        vec!["config_validation", "collaborator_clients", "lead_store", "storage_connectivity"]
    );
    assert_eq!(payload["checks"][2]["status"], "skipped");
}

#[test]
fn unknown_product_is_rejected_before_touching_storage() {
    let dir = TempDir::new().expect("tempdir");
    let result = inspect::run(options_for(&dir), "motor", "tab");
    assert_eq!(result.exit_code, 2);
    assert_eq!(parse_payload(&result.output)["error_class"], "invalid_product");
}

#[test]
fn journey_submits_then_inspect_and_clear_see_the_stored_enquiry() {
    let dir = TempDir::new().expect("tempdir");
    let script = write_script(&dir, "pa.json", personal_accident_script());

    let payload = run_journey(&dir, &script, "tab-1");
    let report = &payload["report"];
    assert_eq!(report["mount"]["decision"]["decision"], "fresh");
    assert_eq!(report["failed_actions"], 1, "self-only household rejects a spouse");
    assert_eq!(report["actions"][0]["ok"], false);
    assert_eq!(report["final"]["step"], "contact");
    assert_eq!(report["routes"], json!(["/personal-accident/quotes"]));

    let submitted = &report["actions"][15]["detail"];
    assert_eq!(submitted["record"]["details"]["city"], "MUMBAI");
    assert_eq!(submitted["record"]["details"]["dob"], "1983-08-21");
    assert_eq!(submitted["lead_handoff"], "finished");
    assert!(report["audit"]
        .as_array()
        .expect("audit events")
        .contains(&json!("enquiry.lead.persist_failed")));

    let inspected = parse_payload(&inspect::run(options_for(&dir), "pa", "tab-1").output);
    assert_eq!(inspected["report"]["mount_preview"], "restore");
    assert_eq!(inspected["report"]["reload_here_would_reset"], true);
    assert_eq!(inspected["report"]["enquiry"]["members"][0]["gender"], "Female");

    let other_session = parse_payload(&inspect::run(options_for(&dir), "pa", "tab-2").output);
    assert_eq!(other_session["report"]["mount_preview"], "fresh:no_restore_permission");

    let cleared = clear::run(options_for(&dir), "pa", "tab-1");
    assert_eq!(cleared.exit_code, 0);
    let after = parse_payload(&inspect::run(options_for(&dir), "pa", "tab-1").output);
    assert_eq!(after["report"]["enquiry"], Value::Null);
    assert_eq!(after["report"]["mount_preview"], "fresh:no_restore_permission");
}

#[test]
fn second_journey_in_the_same_session_restores_to_the_contact_step() {
    let dir = TempDir::new().expect("tempdir");
    let first = write_script(&dir, "pa.json", personal_accident_script());
    run_journey(&dir, &first, "tab-1");

    let revisit = write_script(
        &dir,
        "revisit.json",
        json!({ "product": "pa", "actions": [{ "action": "back" }, { "action": "back" }] }),
    );
    let report = run_journey(&dir, &revisit, "tab-1")["report"].clone();
    assert_eq!(report["mount"]["decision"]["decision"], "restored");
    assert_eq!(report["mount"]["step"], "contact");
    assert_eq!(report["actions"][0]["detail"], json!({ "action": "step", "target": "ages" }));

    let reload = write_script(&dir, "reload.json", json!({ "product": "pa", "navigation": "reload" }));
    let report = run_journey(&dir, &reload, "tab-1")["report"].clone();
    assert_eq!(report["mount"]["decision"]["decision"], "refresh_reset");
}

#[test]
fn return_to_reopens_the_ages_step_of_a_restored_enquiry() {
    let dir = TempDir::new().expect("tempdir");
    let first = write_script(&dir, "pa.json", personal_accident_script());
    run_journey(&dir, &first, "tab-1");

    let revisit = write_script(
        &dir,
        "revisit.json",
        json!({
            "product": "pa",
            "navigation": "back_forward",
            "actions": [
                { "action": "return_to", "step": "ages" },
                { "action": "set_age", "member": "you", "value": "43" },
                { "action": "next" },
                { "action": "submit" }
            ]
        }),
    );
    let report = run_journey(&dir, &revisit, "tab-1")["report"].clone();
    assert_eq!(report["mount"]["decision"]["decision"], "restored");
    assert_eq!(report["failed_actions"], 0, "revisit should resubmit: {report}");
    assert_eq!(report["final"]["step"], "contact");

    let record = &report["actions"][3]["detail"]["record"];
    assert_eq!(record["members"][0]["age"], "43");
    assert_eq!(record["details"]["dob"], "1983-08-21");
}

#[test]
fn demo_journeys_are_valid_scripts() {
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/journeys");
    let mut names = Vec::new();
    for entry in fs::read_dir(&demos).expect("demo journeys directory") {
        let path = entry.expect("directory entry").path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let script = journey::read_script(&path)
            .unwrap_or_else(|(class, message, _)| panic!("{class}: {message}"));
        assert!(!script.actions.is_empty(), "{} has no actions", path.display());
        names.push(path.file_name().expect("file name").to_string_lossy().into_owned());
    }
    names.sort();
    assert_eq!(
        names,
        vec!["hospital-cash-revisit.json", "hospital-cash.json", "super-top-up.json"]
    );

    let revisit = journey::read_script(&demos.join("hospital-cash-revisit.json")).expect("parses");
    assert_eq!(revisit.product, "hospicash");
    assert!(matches!(
        revisit.actions.first(),
        Some(journey::JourneyAction::ReturnTo { step: policyplanner_core::flows::WizardStep::Ages })
    ));
}

#[test]
fn proposal_needs_a_submitted_enquiry_first() {
    let dir = TempDir::new().expect("tempdir");
    let script = write_script(
        &dir,
        "proposal.json",
        json!({
            "product": "hc",
            "actions": [{ "action": "submit_proposal", "proposal": { "plan": "Care Cash" } }]
        }),
    );
    let report = run_journey(&dir, &script, "tab-1")["report"].clone();
    assert_eq!(report["failed_actions"], 1);
    assert_eq!(report["actions"][0]["error"], "submit the enquiry before sending a proposal");
}

#[test]
fn malformed_scripts_fail_with_a_parse_error() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ \"product\": \"pa\", \"actions\": [{ \"action\": \"fly\" }] }")
        .expect("write");

    let result = journey::run(options_for(&dir), &path, "tab-1");
    assert_eq!(result.exit_code, 2);
    assert_eq!(parse_payload(&result.output)["error_class"], "script_parse");
}
