pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod ports;
pub mod records;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use config::{AppConfig, LoadOptions};
pub use domain::member::{Gender, MemberId, MemberKey};
pub use domain::product::{EnquiryPolicy, ProductKind, ProductSchema};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{EnquiryWizard, MountDecision, StepBlock, WizardPorts, WizardStep};
pub use ports::{
    LeadRecord, LeadStore, NavigationContext, NavigationType, Navigator, OtpService, StoragePort,
    StorageScope,
};
