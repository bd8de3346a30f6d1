pub mod engine;
pub mod states;

pub use engine::{record_page_visit, EnquiryWizard, WizardPorts, WizardView, RESTORE_PERMITTED};
pub use states::{
    BackAction, FreshReason, MountDecision, MountOutcome, StepBlock, SubmitOutcome, WizardStep,
};
