use thiserror::Error;

use crate::domain::age::AgeError;
use crate::domain::form::FormError;
use crate::domain::member::MemberError;
use crate::domain::verification::VerificationError;
use crate::flows::{StepBlock, WizardStep};
use crate::ports::{IntegrationError, StorageError};
use crate::records::RecordError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Member(#[from] MemberError),
    #[error(transparent)]
    Age(#[from] AgeError),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("cannot leave the {step} step: {block}")]
    StepBlocked { step: WizardStep, block: StepBlock },
    #[error("household can only change on the members step (currently on {0})")]
    MembersLocked(WizardStep),
    #[error("the contact step finishes with a submission, not a next step")]
    SubmissionRequired,
    #[error("submission happens on the contact step (currently on {0})")]
    NotOnContactStep(WizardStep),
    #[error("`{0}` is not a step of this product's wizard")]
    InvalidStep(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<StorageError> for ApplicationError {
    fn from(value: StorageError) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<IntegrationError> for ApplicationError {
    fn from(value: IntegrationError) -> Self {
        Self::Integration(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Please review the highlighted details and try again.",
            Self::ServiceUnavailable { .. } => {
                "We could not reach our servers. Please retry shortly."
            }
            Self::Internal { .. } => "Something went wrong on our side.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::StepBlocked { block, .. }) => {
                Self::BadRequest { message: block.message().to_owned(), correlation_id: unassigned() }
            }
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
