use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::member::MemberId;
use crate::ports::LeadRecord;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Members,
    Ages,
    Contact,
}

impl WizardStep {
    pub fn number(self) -> u8 {
        match self {
            Self::Members => 1,
            Self::Ages => 2,
            Self::Contact => 3,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Members),
            2 => Some(Self::Ages),
            3 => Some(Self::Contact),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(self) -> Option<Self> {
        self.number().checked_sub(1).and_then(Self::from_number)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Members => "members",
            Self::Ages => "ages",
            Self::Contact => "contact",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the wizard refused to move forward, with what the user should do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StepBlock {
    MissingAges { ids: Vec<MemberId> },
    InvalidFields { names: Vec<String> },
    MobileNotVerified,
    TermsNotAccepted,
}

impl StepBlock {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingAges { .. } => "Please select ages for all members.",
            Self::InvalidFields { .. } => "Please correct the highlighted fields.",
            Self::MobileNotVerified => "Please verify your mobile number first.",
            Self::TermsNotAccepted => "Please accept Terms & Conditions.",
        }
    }
}

impl fmt::Display for StepBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingAges { ids } => {
                let ids: Vec<&str> = ids.iter().map(MemberId::as_str).collect();
                write!(f, "{} ({})", self.message(), ids.join(", "))
            }
            Self::InvalidFields { names } => write!(f, "{} ({})", self.message(), names.join(", ")),
            _ => f.write_str(self.message()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshReason {
    NoRestorePermission,
    NoPayload,
    CorruptPayload,
}

/// What a mount decided to show.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum MountDecision {
    /// Reload of this very page: stored enquiry wiped.
    RefreshReset,
    Restored { verified_from_record: bool },
    Fresh { reason: FreshReason },
}

impl MountDecision {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RefreshReset => "enquiry.mount.refresh_reset",
            Self::Restored { .. } => "enquiry.mount.restored",
            Self::Fresh { .. } => "enquiry.mount.fresh",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MountOutcome {
    pub decision: MountDecision,
    pub previous_page: Option<String>,
    pub step: WizardStep,
}

/// Result of a step-3 submission. The lead hand-off keeps running after return.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub route: String,
    pub record: Value,
    pub lead: LeadRecord,
    pub lead_task: tokio::task::JoinHandle<()>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "target")]
pub enum BackAction {
    Step(WizardStep),
    ExitToLanding(String),
}
