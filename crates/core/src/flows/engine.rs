use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::age::{AgeChoice, AgeMap};
use crate::domain::form::ContactForm;
use crate::domain::member::{Gender, MemberError, MemberId, MemberKey, MemberSelection};
use crate::domain::product::{ProductKind, ProductSchema, StorageKeys};
use crate::domain::verification::{
    VerificationError, VerificationGate, VerificationState, VerifyOutcome,
};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::states::{
    BackAction, FreshReason, MountDecision, MountOutcome, StepBlock, SubmitOutcome, WizardStep,
};
use crate::ports::{
    LeadRecord, LeadStore, NavigationContext, Navigator, OtpService, StorageError, StoragePort,
    StorageScope,
};
use crate::records::{EnquirySnapshot, Household};

/// Stored value of the restore-permitted flag.
pub const RESTORE_PERMITTED: &str = "1";

const ACTOR: &str = "enquiry-wizard";

/// Collaborators a wizard talks to.
#[derive(Clone)]
pub struct WizardPorts {
    pub storage: Arc<dyn StoragePort>,
    pub navigation: Arc<dyn NavigationContext>,
    pub otp: Arc<dyn OtpService>,
    pub leads: Arc<dyn LeadStore>,
    pub navigator: Arc<dyn Navigator>,
    pub audit: Arc<dyn AuditSink>,
}

/// Render-ready copy of the wizard state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WizardView {
    pub product: ProductKind,
    pub journey_id: String,
    pub step: WizardStep,
    pub members: Vec<MemberId>,
    pub ages: BTreeMap<MemberId, String>,
    pub values: BTreeMap<String, String>,
    /// Only fields whose error is currently visible.
    pub field_errors: BTreeMap<String, String>,
    pub gender: Gender,
    pub terms_accepted: bool,
    pub verification: VerificationState,
}

/// One product's enquiry wizard: step cursor, household, ages, contact form,
/// mobile verification and the restore policy around them.
pub struct EnquiryWizard {
    schema: ProductSchema,
    ports: WizardPorts,
    audit: AuditContext,
    selection: Option<MemberSelection>,
    ages: AgeMap,
    form: ContactForm,
    gate: VerificationGate,
    gender: Gender,
    terms_accepted: bool,
    step: WizardStep,
}

impl EnquiryWizard {
    pub fn new(schema: ProductSchema, ports: WizardPorts) -> Self {
        let journey_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(journey_id.clone(), schema.kind.as_str(), journey_id, ACTOR);
        let gate = VerificationGate::new(Arc::clone(&ports.otp), schema.resend_cooldown_secs);
        let form = ContactForm::new(schema.fields.clone());
        let selection = schema.household.map(MemberSelection::new);

        let mut wizard = Self {
            step: first_step(&schema),
            schema,
            ports,
            audit,
            selection,
            ages: AgeMap::default(),
            form,
            gate,
            gender: Gender::default(),
            terms_accepted: false,
        };
        wizard.reconcile_ages();
        wizard
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.audit.correlation_id = correlation_id.into();
        self
    }

    pub fn schema(&self) -> &ProductSchema {
        &self.schema
    }

    pub fn journey_id(&self) -> &str {
        &self.audit.journey_id
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn first_step(&self) -> WizardStep {
        first_step(&self.schema)
    }

    pub fn selection(&self) -> Option<&MemberSelection> {
        self.selection.as_ref()
    }

    pub fn member_ids(&self) -> Vec<MemberId> {
        self.selection.as_ref().map(MemberSelection::flatten).unwrap_or_default()
    }

    pub fn ages(&self) -> &AgeMap {
        &self.ages
    }

    pub fn age_options(&self, id: &MemberId) -> Vec<AgeChoice> {
        self.schema.ages.options_for(id)
    }

    pub fn form(&self) -> &ContactForm {
        &self.form
    }

    pub fn gate(&self) -> &VerificationGate {
        &self.gate
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn terms_accepted(&self) -> bool {
        self.terms_accepted
    }

    pub fn mobile(&self) -> &str {
        self.form.value(self.schema.mobile_field).unwrap_or_default()
    }

    pub fn view(&self) -> WizardView {
        let field_errors = self
            .schema
            .fields
            .names()
            .filter_map(|name| self.form.first_error(name).map(|error| (name.to_owned(), error)))
            .collect();
        WizardView {
            product: self.schema.kind,
            journey_id: self.audit.journey_id.clone(),
            step: self.step,
            members: self.member_ids(),
            ages: self.snapshot().ages,
            values: self.form.values(),
            field_errors,
            gender: self.gender,
            terms_accepted: self.terms_accepted,
            verification: self.gate.state(),
        }
    }

    /// Decides between refresh reset, restore and a fresh journey for this page load.
    pub async fn mount(&mut self) -> Result<MountOutcome, ApplicationError> {
        let keys = self.schema.keys.clone();
        let storage = Arc::clone(&self.ports.storage);

        let previous_page = storage.get(StorageScope::Session, &keys.last_page).await?;
        storage.set(StorageScope::Session, &keys.last_page, &keys.page_name).await?;

        let same_page = previous_page.as_deref() == Some(keys.page_name.as_str());
        let decision = if self.ports.navigation.is_reload() && same_page {
            storage.remove(StorageScope::Durable, &keys.enquiry).await?;
            storage.remove(self.schema.restore.flag_scope, &keys.restore_flag).await?;
            self.reset();
            MountDecision::RefreshReset
        } else {
            self.restore_or_start(storage.as_ref(), &keys).await?
        };

        info!(
            event_name = decision.event_name(),
            product = %self.schema.kind,
            journey_id = %self.audit.journey_id,
            previous_page = previous_page.as_deref().unwrap_or(""),
            step = %self.step,
            "enquiry mounted"
        );
        let mut event = self.event(decision.event_name(), AuditCategory::Navigation, AuditOutcome::Success);
        if let Some(previous) = &previous_page {
            event = event.with_metadata("previous_page", previous.clone());
        }
        if let MountDecision::Fresh { reason } = decision {
            event = event.with_metadata("reason", format!("{reason:?}"));
        }
        self.ports.audit.emit(event);

        Ok(MountOutcome { decision, previous_page, step: self.step })
    }

    async fn restore_or_start(
        &mut self,
        storage: &dyn StoragePort,
        keys: &StorageKeys,
    ) -> Result<MountDecision, ApplicationError> {
        let flag_scope = self.schema.restore.flag_scope;
        let permitted =
            storage.get(flag_scope, &keys.restore_flag).await?.as_deref() == Some(RESTORE_PERMITTED);
        if !permitted {
            self.reset();
            return Ok(MountDecision::Fresh { reason: FreshReason::NoRestorePermission });
        }

        let Some(raw) = storage.get(StorageScope::Durable, &keys.enquiry).await? else {
            self.reset();
            return Ok(MountDecision::Fresh { reason: FreshReason::NoPayload });
        };

        let snapshot = match self.schema.mapper.decode(&raw) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(
                    event_name = "enquiry.mount.corrupt_payload",
                    product = %self.schema.kind,
                    journey_id = %self.audit.journey_id,
                    key = %keys.enquiry,
                    error = %error,
                    "stored enquiry unreadable, starting fresh"
                );
                self.reset();
                return Ok(MountDecision::Fresh { reason: FreshReason::CorruptPayload });
            }
        };

        let verified_from_record = self.apply_snapshot(&snapshot);
        if self.schema.restore.consume_flag_on_restore {
            storage.remove(flag_scope, &keys.restore_flag).await?;
        }
        Ok(MountDecision::Restored { verified_from_record })
    }

    /// Loads a stored enquiry and lands on the contact step. Returns whether
    /// the stored mobile was accepted as verified.
    fn apply_snapshot(&mut self, snapshot: &EnquirySnapshot) -> bool {
        self.reset();
        if let Some(selection) = self.selection.as_mut() {
            let household = snapshot.household;
            selection.restore(household.spouse, household.sons, household.daughters);
        }
        let ids = self.member_ids();
        self.ages.restore(&ids, &snapshot.ages);
        self.form.patch(&snapshot.details);
        self.gender = snapshot.gender;
        self.terms_accepted = snapshot.terms_accepted;
        self.step = WizardStep::Contact;

        let mobile = self.mobile().to_owned();
        let trusted = self.schema.requires_otp
            && self.schema.restore.trust_restored_mobile
            && !mobile.is_empty();
        if trusted {
            self.gate.mark_verified(&mobile);
        }
        trusted
    }

    fn reset(&mut self) {
        if let Some(selection) = self.selection.as_mut() {
            selection.reset();
        }
        self.ages.clear();
        self.reconcile_ages();
        self.form.reset();
        self.gate.reset();
        self.gender = Gender::default();
        self.terms_accepted = false;
        self.step = first_step(&self.schema);
    }

    fn reconcile_ages(&mut self) {
        let ids = self.member_ids();
        self.ages.reconcile(&ids);
    }

    pub fn toggle_member(&mut self, key: MemberKey) -> Result<(), DomainError> {
        self.mutate_members("toggle", key, |selection| selection.toggle(key))
    }

    pub fn increment_member(&mut self, key: MemberKey) -> Result<(), DomainError> {
        self.mutate_members("increment", key, |selection| selection.increment(key))
    }

    pub fn decrement_member(&mut self, key: MemberKey) -> Result<(), DomainError> {
        self.mutate_members("decrement", key, |selection| selection.decrement(key))
    }

    fn mutate_members(
        &mut self,
        action: &'static str,
        key: MemberKey,
        apply: impl FnOnce(&mut MemberSelection) -> Result<(), MemberError>,
    ) -> Result<(), DomainError> {
        let result = if self.step != WizardStep::Members {
            Err(DomainError::MembersLocked(self.step))
        } else {
            match self.selection.as_mut() {
                Some(selection) => apply(selection)
                    .map(|()| selection.flatten())
                    .map_err(DomainError::from),
                None => Err(MemberError::NotOffered(key).into()),
            }
        };

        match result {
            Ok(ids) => {
                self.ages.reconcile(&ids);
                Ok(())
            }
            Err(error) => {
                self.ports.audit.emit(
                    self.event("enquiry.members.rejected", AuditCategory::Members, AuditOutcome::Rejected)
                        .with_metadata("action", action)
                        .with_metadata("member", key.as_str())
                        .with_metadata("error", error.to_string()),
                );
                Err(error)
            }
        }
    }

    pub fn set_age(&mut self, id: &MemberId, value: &str) -> Result<(), DomainError> {
        self.ages.set_age(&self.schema.ages, id, value)?;
        Ok(())
    }

    /// Stores a field value after its input transform. Returns whether it changed.
    pub fn set_field(&mut self, name: &str, raw: &str) -> Result<bool, DomainError> {
        let changed = self.form.set_value(name, raw)?;
        if changed && name == self.schema.mobile_field {
            let was_verified = self.gate.is_verified();
            self.gate.reset();
            if self.schema.mobile_change_clears_terms {
                self.terms_accepted = false;
            }
            if was_verified {
                info!(
                    event_name = "enquiry.mobile.changed",
                    product = %self.schema.kind,
                    journey_id = %self.audit.journey_id,
                    "mobile changed, verification withdrawn"
                );
            }
        }
        Ok(changed)
    }

    pub fn touch_field(&mut self, name: &str) -> Result<(), DomainError> {
        self.form.touch(name)?;
        Ok(())
    }

    pub fn set_gender(&mut self, gender: Gender) {
        self.gender = gender;
    }

    pub fn set_terms_accepted(&mut self, accepted: bool) {
        self.terms_accepted = accepted;
    }

    pub async fn send_otp(&mut self) -> Result<(), DomainError> {
        let mobile = self.mobile().to_owned();
        let result = self.gate.send(&mobile).await;
        self.audit_otp("otp.sent", result.as_ref().map(|_| ()));
        Ok(result?)
    }

    pub async fn resend_otp(&mut self) -> Result<(), DomainError> {
        let mobile = self.mobile().to_owned();
        let result = self.gate.resend(&mobile).await;
        self.audit_otp("otp.resent", result.as_ref().map(|_| ()));
        Ok(result?)
    }

    /// Fills one OTP slot; the fourth digit verifies immediately.
    pub async fn enter_otp_digit(
        &mut self,
        index: usize,
        raw: &str,
    ) -> Result<VerifyOutcome, DomainError> {
        let mobile = self.mobile().to_owned();
        let result = self.gate.enter_digit(&mobile, index, raw).await;
        self.audit_verify(&result);
        Ok(result?)
    }

    pub async fn paste_otp(&mut self, text: &str) -> Result<VerifyOutcome, DomainError> {
        let mobile = self.mobile().to_owned();
        let result = self.gate.paste(&mobile, text).await;
        self.audit_verify(&result);
        Ok(result?)
    }

    pub async fn submit_otp(&mut self) -> Result<VerifyOutcome, DomainError> {
        let mobile = self.mobile().to_owned();
        let result = self.gate.submit(&mobile).await;
        self.audit_verify(&result);
        Ok(result?)
    }

    pub fn clear_otp_digit(&mut self, index: usize) -> Result<(), DomainError> {
        self.gate.clear_digit(index)?;
        Ok(())
    }

    fn audit_verify(&self, result: &Result<VerifyOutcome, VerificationError>) {
        match result {
            Ok(VerifyOutcome::Verified) => self.audit_otp("otp.verified", Ok(())),
            Ok(_) => {}
            Err(error) => self.audit_otp("otp.verify_failed", Err(error)),
        }
    }

    fn audit_otp(&self, event_type: &str, result: Result<(), &VerificationError>) {
        let event = match result {
            Ok(()) => self.event(event_type, AuditCategory::Verification, AuditOutcome::Success),
            Err(error) => self
                .event(event_type, AuditCategory::Verification, AuditOutcome::Rejected)
                .with_metadata("error", error.to_string()),
        };
        self.ports.audit.emit(event);
    }

    pub fn next(&mut self) -> Result<WizardStep, DomainError> {
        let from = self.step;
        let to = match from {
            WizardStep::Members => WizardStep::Ages,
            WizardStep::Ages => {
                let missing = self.ages.missing(&self.member_ids());
                if !missing.is_empty() {
                    return Err(self.blocked(from, StepBlock::MissingAges { ids: missing }));
                }
                if let Err(names) = self.form.validate_fields(self.schema.ages_step_fields) {
                    let names = names.into_iter().map(str::to_owned).collect();
                    return Err(self.blocked(from, StepBlock::InvalidFields { names }));
                }
                WizardStep::Contact
            }
            WizardStep::Contact => return Err(DomainError::SubmissionRequired),
        };
        self.move_to(to, "enquiry.step.advanced");
        Ok(to)
    }

    /// Steps back once; `None` when already on the first step.
    pub fn prev(&mut self) -> Option<WizardStep> {
        if self.step <= self.first_step() {
            return None;
        }
        let to = self.step.previous()?;
        self.move_to(to, "enquiry.step.back");
        Some(to)
    }

    pub fn back(&mut self) -> BackAction {
        match self.prev() {
            Some(step) => BackAction::Step(step),
            None => {
                self.ports.audit.emit(
                    self.event("enquiry.exit", AuditCategory::Navigation, AuditOutcome::Success)
                        .with_metadata("target", self.schema.landing_url.clone()),
                );
                BackAction::ExitToLanding(self.schema.landing_url.clone())
            }
        }
    }

    /// Jumps back to an earlier step this product offers.
    pub fn return_to(&mut self, step: WizardStep) -> Result<(), DomainError> {
        if step < self.first_step() || step > self.step {
            return Err(DomainError::InvalidStep(step.to_string()));
        }
        if step != self.step {
            self.move_to(step, "enquiry.step.back");
        }
        Ok(())
    }

    fn move_to(&mut self, to: WizardStep, event_type: &'static str) {
        let from = self.step;
        self.step = to;
        info!(
            event_name = event_type,
            product = %self.schema.kind,
            journey_id = %self.audit.journey_id,
            from = %from,
            to = %to,
            "wizard step changed"
        );
        self.ports.audit.emit(
            self.event(event_type, AuditCategory::Navigation, AuditOutcome::Success)
                .with_metadata("from", from.as_str())
                .with_metadata("to", to.as_str()),
        );
    }

    fn blocked(&self, step: WizardStep, block: StepBlock) -> DomainError {
        info!(
            event_name = "enquiry.step.blocked",
            product = %self.schema.kind,
            journey_id = %self.audit.journey_id,
            step = %step,
            block = %block,
            "wizard step blocked"
        );
        self.ports.audit.emit(
            self.event("enquiry.step.blocked", AuditCategory::Navigation, AuditOutcome::Rejected)
                .with_metadata("step", step.as_str())
                .with_metadata("block", block.to_string()),
        );
        DomainError::StepBlocked { step, block }
    }

    /// Validates the contact step, persists the enquiry, hands the lead off and
    /// leaves for the quotes route.
    pub async fn submit(&mut self) -> Result<SubmitOutcome, ApplicationError> {
        if self.step != WizardStep::Contact {
            return Err(DomainError::NotOnContactStep(self.step).into());
        }
        if let Err(names) = self.form.validate_all() {
            let names = names.into_iter().map(str::to_owned).collect();
            return Err(self.blocked(WizardStep::Contact, StepBlock::InvalidFields { names }).into());
        }
        let mobile = self.mobile().to_owned();
        if self.schema.requires_otp && !self.gate.is_verified_for(&mobile) {
            self.gate.surface_error(StepBlock::MobileNotVerified.message());
            return Err(self.blocked(WizardStep::Contact, StepBlock::MobileNotVerified).into());
        }
        if self.schema.requires_terms && !self.terms_accepted {
            return Err(self.blocked(WizardStep::Contact, StepBlock::TermsNotAccepted).into());
        }

        let now = Utc::now();
        let snapshot = self.snapshot();
        let record = self.schema.mapper.to_record(&snapshot, now);
        let keys = &self.schema.keys;
        let storage = &self.ports.storage;
        storage.set(StorageScope::Durable, &keys.enquiry, &record.to_string()).await?;
        storage.set(self.schema.restore.flag_scope, &keys.restore_flag, RESTORE_PERMITTED).await?;
        storage.set(StorageScope::Session, &keys.last_page, &keys.page_name).await?;

        let lead = self.schema.mapper.to_lead(&snapshot, self.schema.lead_type, now);
        let lead_task = self.hand_off_lead(lead.clone());

        info!(
            event_name = "enquiry.submitted",
            product = %self.schema.kind,
            journey_id = %self.audit.journey_id,
            route = %self.schema.quotes_route,
            members = snapshot.household.ids().len(),
            "enquiry submitted"
        );
        self.ports.audit.emit(
            self.event("enquiry.submitted", AuditCategory::Persistence, AuditOutcome::Success)
                .with_metadata("key", keys.enquiry.clone())
                .with_metadata("route", self.schema.quotes_route.clone()),
        );

        self.ports.navigator.navigate(&self.schema.quotes_route);
        Ok(SubmitOutcome { route: self.schema.quotes_route.clone(), record, lead, lead_task })
    }

    /// Remote lead write that never holds up navigation.
    fn hand_off_lead(&self, lead: LeadRecord) -> tokio::task::JoinHandle<()> {
        let leads = Arc::clone(&self.ports.leads);
        let audit = Arc::clone(&self.ports.audit);
        let context = self.audit.clone();
        tokio::spawn(async move {
            match leads.insert(lead).await {
                Ok(()) => {
                    info!(
                        event_name = "enquiry.lead.persisted",
                        product = %context.product,
                        journey_id = %context.journey_id,
                        "lead stored"
                    );
                    audit.emit(context.event(
                        "enquiry.lead.persisted",
                        AuditCategory::Lead,
                        AuditOutcome::Success,
                    ));
                }
                Err(error) => {
                    warn!(
                        event_name = "enquiry.lead.persist_failed",
                        product = %context.product,
                        journey_id = %context.journey_id,
                        error = %error,
                        "lead store write failed"
                    );
                    audit.emit(
                        context
                            .event("enquiry.lead.persist_failed", AuditCategory::Lead, AuditOutcome::Failed)
                            .with_metadata("error", error.to_string()),
                    );
                }
            }
        })
    }

    pub fn snapshot(&self) -> EnquirySnapshot {
        let ids = self.member_ids();
        EnquirySnapshot {
            household: Household::from_ids(&ids),
            ages: ids
                .iter()
                .map(|id| (id.clone(), self.ages.get(id).unwrap_or_default().to_owned()))
                .collect(),
            details: self.form.values(),
            gender: self.gender,
            terms_accepted: self.terms_accepted,
        }
    }

    fn event(&self, event_type: &str, category: AuditCategory, outcome: AuditOutcome) -> AuditEvent {
        self.audit.event(event_type, category, outcome)
    }
}

fn first_step(schema: &ProductSchema) -> WizardStep {
    if schema.has_household() {
        WizardStep::Members
    } else {
        WizardStep::Contact
    }
}

/// Marks `page` as the last page of the product visited in this session.
///
/// Pages outside the wizard (the quote screen) call this on load, so that a
/// reload there followed by back navigation restores instead of resetting.
pub async fn record_page_visit(
    storage: &dyn StoragePort,
    keys: &StorageKeys,
    page: &str,
) -> Result<(), StorageError> {
    storage.set(StorageScope::Session, &keys.last_page, page).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{EnquiryWizard, WizardPorts};
    use crate::audit::InMemoryAuditSink;
    use crate::domain::member::{MemberId, MemberKey};
    use crate::domain::product::{EnquiryPolicy, ProductKind, ProductSchema};
    use crate::errors::DomainError;
    use crate::flows::states::{BackAction, StepBlock, WizardStep};
    use crate::ports::memory::{
        InMemoryStorage, RecordingLeadStore, RecordingNavigator, ScriptedOtpService,
        StaticNavigation,
    };

    fn wizard(kind: ProductKind) -> (EnquiryWizard, InMemoryAuditSink) {
        let audit = InMemoryAuditSink::default();
        let ports = WizardPorts {
            storage: Arc::new(InMemoryStorage::default()),
            navigation: Arc::new(StaticNavigation::navigate()),
            otp: Arc::new(ScriptedOtpService::accepting("1234")),
            leads: Arc::new(RecordingLeadStore::default()),
            navigator: Arc::new(RecordingNavigator::default()),
            audit: Arc::new(audit.clone()),
        };
        let schema = ProductSchema::for_kind(kind, &EnquiryPolicy::default());
        (EnquiryWizard::new(schema, ports), audit)
    }

    #[tokio::test]
    async fn household_products_start_on_members_and_gmc_on_contact() {
        let (stu, _) = wizard(ProductKind::SuperTopUp);
        assert_eq!(stu.step(), WizardStep::Members);
        assert_eq!(stu.member_ids(), vec![MemberId::you()]);

        let (gmc, _) = wizard(ProductKind::GroupMedical);
        assert_eq!(gmc.step(), WizardStep::Contact);
        assert!(gmc.member_ids().is_empty());
    }

    #[tokio::test]
    async fn member_changes_are_locked_after_the_first_step() {
        let (mut wizard, audit) = wizard(ProductKind::SuperTopUp);
        wizard.toggle_member(MemberKey::Spouse).expect("spouse toggles");
        wizard.next().expect("advances to ages");

        let error = wizard.toggle_member(MemberKey::Son).expect_err("locked");
        assert_eq!(error, DomainError::MembersLocked(WizardStep::Ages));
        assert!(audit.event_types().contains(&"enquiry.members.rejected".to_owned()));

        assert_eq!(wizard.back(), BackAction::Step(WizardStep::Members));
        wizard.toggle_member(MemberKey::Son).expect("unlocked again");
        assert_eq!(wizard.ages().len(), 3);
    }

    #[tokio::test]
    async fn ages_step_names_the_members_without_an_age() {
        let (mut wizard, _) = wizard(ProductKind::SuperTopUp);
        wizard.increment_member(MemberKey::Daughter).expect("daughter added");
        wizard.next().expect("ages");
        wizard.set_age(&MemberId::you(), "34").expect("adult age");

        let error = wizard.next().expect_err("daughter missing");
        assert_eq!(
            error,
            DomainError::StepBlocked {
                step: WizardStep::Ages,
                block: StepBlock::MissingAges { ids: vec![MemberId("daughter1".to_owned())] },
            }
        );

        wizard.set_age(&MemberId("daughter1".to_owned()), "91 Days").expect("infant sentinel");
        assert_eq!(wizard.next(), Ok(WizardStep::Contact));
        assert_eq!(wizard.next(), Err(DomainError::SubmissionRequired));
    }

    #[tokio::test]
    async fn back_from_the_first_step_exits_to_landing() {
        let (mut gmc, audit) = wizard(ProductKind::GroupMedical);
        assert_eq!(gmc.prev(), None);
        assert_eq!(gmc.back(), BackAction::ExitToLanding("https://policyplanner.com/#/".to_owned()));
        assert_eq!(audit.event_types(), vec!["enquiry.exit"]);
        assert_eq!(
            gmc.return_to(WizardStep::Members),
            Err(DomainError::InvalidStep("members".to_owned()))
        );
    }

    #[tokio::test]
    async fn hospital_cash_mobile_edit_withdraws_terms() {
        let (mut wizard, _) = wizard(ProductKind::HospitalCash);
        wizard.set_field("mobile", "9123456789").expect("mobile");
        wizard.set_terms_accepted(true);

        assert_eq!(wizard.set_field("mobile", "9123456789"), Ok(false));
        assert!(wizard.terms_accepted());

        assert_eq!(wizard.set_field("mobile", "98765-43210"), Ok(true));
        assert_eq!(wizard.mobile(), "9876543210");
        assert!(!wizard.terms_accepted());
    }

    #[tokio::test]
    async fn view_only_reports_visible_field_errors() {
        let (mut wizard, _) = wizard(ProductKind::PersonalAccident);
        assert!(wizard.view().field_errors.is_empty());

        wizard.touch_field("pincode").expect("known field");
        let view = wizard.view();
        assert_eq!(view.field_errors.len(), 1);
        assert!(view.field_errors.contains_key("pincode"));
        assert_eq!(view.product, ProductKind::PersonalAccident);
    }
}
