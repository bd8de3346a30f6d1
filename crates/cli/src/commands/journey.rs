//! Headless enquiry journeys.
//!
//! A script names a product, how the page was reached, and a list of UI
//! actions. The wizard runs against the configured storage and HTTP
//! collaborators; every action's outcome lands in the JSON report.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use policyplanner_core::audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
use policyplanner_core::config::{AppConfig, LoadOptions};
use policyplanner_core::domain::member::{Gender, MemberId, MemberKey};
use policyplanner_core::domain::product::{ProductKind, ProductSchema};
use policyplanner_core::flows::{record_page_visit, EnquiryWizard, WizardPorts, WizardStep};
use policyplanner_core::ports::memory::StaticNavigation;
use policyplanner_core::ports::{NavigationType, Navigator};
use policyplanner_db::SqliteStorage;
use policyplanner_gateway::Collaborators;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::commands::{load_config, open_storage, parse_product, runtime, CommandResult, Failure};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JourneyScript {
    pub product: String,
    /// `null` models a browser that does not report how the page was reached.
    #[serde(default = "default_navigation")]
    pub navigation: Option<NavigationType>,
    #[serde(default)]
    pub actions: Vec<JourneyAction>,
}

fn default_navigation() -> Option<NavigationType> {
    Some(NavigationType::Navigate)
}

fn accepted_by_default() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum JourneyAction {
    ToggleMember { member: MemberKey },
    IncrementMember { member: MemberKey },
    DecrementMember { member: MemberKey },
    SetAge { member: String, value: String },
    SetField { name: String, value: String },
    TouchField { name: String },
    SetGender { gender: Gender },
    AcceptTerms {
        #[serde(default = "accepted_by_default")]
        accepted: bool,
    },
    SendOtp,
    ResendOtp,
    EnterOtpDigit { index: usize, digit: String },
    ClearOtpDigit { index: usize },
    PasteOtp { code: String },
    SubmitOtp,
    Next,
    Prev,
    Back,
    ReturnTo { step: WizardStep },
    Submit,
    /// Posts the last submitted record to every insurer endpoint.
    FetchQuotes,
    /// Hands a proposal for the chosen plan to the proposal API.
    SubmitProposal {
        #[serde(default)]
        proposal: Map<String, Value>,
    },
    /// Records another page of the product as the last one visited.
    VisitPage { page: String },
    EndSession,
}

#[derive(Debug, Serialize)]
struct ActionReport {
    index: usize,
    action: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Keeps the routes the wizard asked for instead of changing any page.
#[derive(Clone, Default)]
struct RouteLog {
    routes: Arc<Mutex<Vec<String>>>,
}

impl RouteLog {
    fn routes(&self) -> Vec<String> {
        match self.routes.lock() {
            Ok(routes) => routes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Navigator for RouteLog {
    fn navigate(&self, route: &str) {
        info!(event_name = "journey.navigate", route = %route, "wizard navigated");
        match self.routes.lock() {
            Ok(mut routes) => routes.push(route.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(route.to_owned()),
        }
    }
}

/// Logs every audit event and keeps a copy for the report.
#[derive(Clone, Default)]
struct ReportAudit {
    kept: InMemoryAuditSink,
}

impl AuditSink for ReportAudit {
    fn emit(&self, event: AuditEvent) {
        TracingAuditSink.emit(event.clone());
        self.kept.emit(event);
    }
}

pub fn run(options: LoadOptions, script_path: &Path, session_id: &str) -> CommandResult {
    let outcome = read_script(script_path).and_then(|script| {
        let config = load_config(options)?;
        runtime()?.block_on(execute(&config, script, session_id))
    });
    match outcome {
        Ok(report) => {
            let failed = report["failed_actions"].as_u64().unwrap_or_default();
            CommandResult::report(
                "journey",
                format!("journey finished with {failed} failed action(s)"),
                report,
            )
        }
        Err(failure) => CommandResult::from_failure("journey", failure),
    }
}

pub fn read_script(path: &Path) -> Result<JourneyScript, Failure> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))
        .map_err(|error| ("script_read", format!("{error:#}"), 2))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid journey script `{}`", path.display()))
        .map_err(|error| ("script_parse", format!("{error:#}"), 2))
}

pub async fn execute(
    config: &AppConfig,
    script: JourneyScript,
    session_id: &str,
) -> Result<Value, Failure> {
    let kind = parse_product(&script.product)?;
    let storage = open_storage(config, session_id).await?;
    let collaborators = Collaborators::from_config(config)
        .map_err(|error| ("collaborator_init", error.to_string(), 6u8))?;

    let routes = RouteLog::default();
    let audit = ReportAudit::default();
    let schema = ProductSchema::for_kind(kind, &config.enquiry_policy());
    let ports = WizardPorts {
        storage: Arc::new(storage.clone()),
        navigation: Arc::new(StaticNavigation(script.navigation)),
        otp: collaborators.otp.clone(),
        leads: collaborators.leads.clone(),
        navigator: Arc::new(routes.clone()),
        audit: Arc::new(audit.clone()),
    };
    let correlation_id = Uuid::new_v4().to_string();
    let mut wizard = EnquiryWizard::new(schema, ports).with_correlation_id(correlation_id.clone());

    let mount = wizard
        .mount()
        .await
        .map_err(|error| ("mount", error.into_interface(correlation_id.clone()).to_string(), 4u8))?;

    let mut runner = Runner {
        kind,
        config,
        storage: &storage,
        collaborators: &collaborators,
        last_record: None,
    };
    let mut reports = Vec::with_capacity(script.actions.len());
    for (index, action) in script.actions.into_iter().enumerate() {
        let echo = serde_json::to_value(&action).unwrap_or(Value::Null);
        let report = match runner.apply(&mut wizard, action).await {
            Ok(detail) => ActionReport { index, action: echo, ok: true, detail, error: None },
            Err(error) => {
                ActionReport { index, action: echo, ok: false, detail: None, error: Some(error) }
            }
        };
        reports.push(report);
    }

    let failed = reports.iter().filter(|report| !report.ok).count();
    let report = json!({
        "product": kind.as_str(),
        "session_id": session_id,
        "journey_id": wizard.journey_id(),
        "correlation_id": correlation_id,
        "mount": mount,
        "actions": reports,
        "failed_actions": failed,
        "final": wizard.view(),
        "routes": routes.routes(),
        "audit": audit.kept.event_types(),
    });
    storage.pool().close().await;
    Ok(report)
}

struct Runner<'a> {
    kind: ProductKind,
    config: &'a AppConfig,
    storage: &'a SqliteStorage,
    collaborators: &'a Collaborators,
    last_record: Option<Value>,
}

impl Runner<'_> {
    async fn apply(
        &mut self,
        wizard: &mut EnquiryWizard,
        action: JourneyAction,
    ) -> Result<Option<Value>, String> {
        use JourneyAction::*;

        match action {
            ToggleMember { member } => wizard.toggle_member(member).map_err(text)?,
            IncrementMember { member } => wizard.increment_member(member).map_err(text)?,
            DecrementMember { member } => wizard.decrement_member(member).map_err(text)?,
            SetAge { member, value } => wizard.set_age(&MemberId(member), &value).map_err(text)?,
            SetField { name, value } => {
                let changed = wizard.set_field(&name, &value).map_err(text)?;
                return Ok(Some(json!({ "changed": changed, "stored": wizard.form().value(&name) })));
            }
            TouchField { name } => wizard.touch_field(&name).map_err(text)?,
            SetGender { gender } => wizard.set_gender(gender),
            AcceptTerms { accepted } => wizard.set_terms_accepted(accepted),
            SendOtp => wizard.send_otp().await.map_err(text)?,
            ResendOtp => wizard.resend_otp().await.map_err(text)?,
            EnterOtpDigit { index, digit } => {
                let outcome = wizard.enter_otp_digit(index, &digit).await.map_err(text)?;
                return Ok(Some(json!(outcome)));
            }
            ClearOtpDigit { index } => wizard.clear_otp_digit(index).map_err(text)?,
            PasteOtp { code } => {
                let outcome = wizard.paste_otp(&code).await.map_err(text)?;
                return Ok(Some(json!(outcome)));
            }
            SubmitOtp => {
                let outcome = wizard.submit_otp().await.map_err(text)?;
                return Ok(Some(json!(outcome)));
            }
            Next => return wizard.next().map(|step| Some(json!(step))).map_err(text),
            Prev => return Ok(Some(json!(wizard.prev()))),
            Back => return Ok(Some(json!(wizard.back()))),
            ReturnTo { step } => wizard.return_to(step).map_err(text)?,
            Submit => return self.submit(wizard).await.map(Some),
            FetchQuotes => return self.fetch_quotes().await.map(Some),
            SubmitProposal { proposal } => return self.submit_proposal(proposal).await.map(Some),
            VisitPage { page } => {
                record_page_visit(self.storage, &wizard.schema().keys, &page).await.map_err(text)?
            }
            EndSession => {
                let removed = self.storage.end_session().await.map_err(text)?;
                return Ok(Some(json!({ "removed": removed })));
            }
        }
        Ok(None)
    }

    async fn submit(&mut self, wizard: &mut EnquiryWizard) -> Result<Value, String> {
        let outcome = wizard.submit().await.map_err(|error| {
            let interface = error.clone().into_interface(wizard.journey_id());
            format!("{error} ({})", interface.user_message())
        })?;

        // The hand-off never blocks navigation; the process just waits for it before exiting.
        let grace = Duration::from_secs(self.config.lead_store.timeout_secs.saturating_add(1));
        let lead_handoff = match tokio::time::timeout(grace, outcome.lead_task).await {
            Ok(Ok(())) => "finished",
            Ok(Err(_)) => "aborted",
            Err(_) => "timed_out",
        };

        self.last_record = Some(outcome.record.clone());
        Ok(json!({
            "route": outcome.route,
            "record": outcome.record,
            "lead_type": outcome.lead.lead_type,
            "lead_handoff": lead_handoff,
        }))
    }

    async fn fetch_quotes(&self) -> Result<Value, String> {
        let Some(record) = &self.last_record else {
            return Err("submit the enquiry before fetching quotes".to_owned());
        };
        let quotes =
            self.collaborators.quotes.fetch_quotes(self.kind, record).await.map_err(text)?;
        let companies: Vec<&str> = quotes.iter().filter_map(|quote| quote.company()).collect();
        Ok(json!({ "answered": quotes.len(), "companies": companies }))
    }

    async fn submit_proposal(&self, mut proposal: Map<String, Value>) -> Result<Value, String> {
        let Some(record) = &self.last_record else {
            return Err("submit the enquiry before sending a proposal".to_owned());
        };
        proposal.entry("enquiry").or_insert_with(|| record.clone());
        proposal.insert(
            "submittedAt".to_owned(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        let receipt = self
            .collaborators
            .proposals
            .submit(self.kind, &Value::Object(proposal))
            .await
            .map_err(text)?;
        Ok(json!(receipt))
    }
}

fn text(error: impl std::fmt::Display) -> String {
    error.to_string()
}
