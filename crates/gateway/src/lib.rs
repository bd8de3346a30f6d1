//! HTTP adapters for the collaborators the enquiry wizard talks to.

pub mod http;
pub mod leads;
pub mod otp;
pub mod proposals;
pub mod quotes;

use std::sync::Arc;

use policyplanner_core::config::AppConfig;
use policyplanner_core::ports::IntegrationError;

pub use leads::HttpLeadStore;
pub use otp::HttpOtpService;
pub use proposals::{proposal_lead_type, LeadCopy, ProposalGateway, ProposalReceipt};
pub use quotes::{resolve_endpoint, InsurerQuote, QuoteFanout};

/// Every HTTP collaborator, built once from configuration.
#[derive(Clone)]
pub struct Collaborators {
    pub otp: Arc<HttpOtpService>,
    pub leads: Arc<HttpLeadStore>,
    pub quotes: QuoteFanout,
    pub proposals: ProposalGateway,
}

impl Collaborators {
    pub fn from_config(config: &AppConfig) -> Result<Self, IntegrationError> {
        Ok(Self {
            otp: Arc::new(HttpOtpService::from_config(&config.otp)?),
            leads: Arc::new(HttpLeadStore::from_config(&config.lead_store)?),
            quotes: QuoteFanout::from_config(&config.quotes)?,
            proposals: ProposalGateway::from_config(config)?,
        })
    }
}
