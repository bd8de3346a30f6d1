//! Proposal hand-off from the quote screens.
//!
//! A proposal is saved with `POST {base_url}/proposals/save` and, at the same
//! time, copied into the shared leads collection tagged with the product's
//! short lead type. Both writes have to succeed; a disabled lead store only
//! skips the copy.

use policyplanner_core::config::AppConfig;
use policyplanner_core::domain::product::ProductKind;
use policyplanner_core::ports::{IntegrationError, LeadRecord, LeadStore};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::http::{build_client, ensure_success, json_body, transport, trim_base};
use crate::leads::HttpLeadStore;

/// Lead type stamped on proposal copies; `None` for products without a
/// proposal flow.
pub fn proposal_lead_type(product: ProductKind) -> Option<&'static str> {
    match product {
        ProductKind::PersonalAccident => Some("pa"),
        ProductKind::HospitalCash => Some("hc"),
        ProductKind::SuperTopUp | ProductKind::GroupMedical => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadCopy {
    Recorded,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProposalReceipt {
    pub lead_type: &'static str,
    /// Body returned by the proposal API.
    pub saved: Value,
    pub lead_copy: LeadCopy,
}

#[derive(Clone, Debug)]
pub struct ProposalGateway {
    client: Client,
    save_url: String,
    leads: HttpLeadStore,
}

impl ProposalGateway {
    pub fn new(
        base_url: &str,
        leads: HttpLeadStore,
        timeout_secs: u64,
    ) -> Result<Self, IntegrationError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            save_url: format!("{}/proposals/save", trim_base(base_url)),
            leads,
        })
    }

    /// Proposals share the API base with the plan listing.
    pub fn from_config(config: &AppConfig) -> Result<Self, IntegrationError> {
        let leads = HttpLeadStore::for_collection(
            &config.lead_store,
            &config.lead_store.proposal_collection,
        )?;
        Self::new(&config.quotes.base_url, leads, config.quotes.timeout_secs)
    }

    pub fn save_url(&self) -> &str {
        &self.save_url
    }

    pub async fn submit(
        &self,
        product: ProductKind,
        proposal: &Value,
    ) -> Result<ProposalReceipt, IntegrationError> {
        let lead_type = proposal_lead_type(product).ok_or_else(|| IntegrationError::NotOffered {
            service: "proposal hand-off",
            product: product.to_string(),
        })?;
        let Value::Object(fields) = proposal else {
            return Err(IntegrationError::Decode("proposal must be a JSON object".to_owned()));
        };

        let save = async {
            let response =
                self.client.post(&self.save_url).json(proposal).send().await.map_err(transport)?;
            json_body(ensure_success(response).await?).await
        };
        let copy = async {
            if !self.leads.is_enabled() {
                return Ok(LeadCopy::Skipped);
            }
            let record = LeadRecord { lead_type: lead_type.to_owned(), fields: fields.clone() };
            self.leads.insert(record).await.map(|()| LeadCopy::Recorded)
        };
        let (saved, lead_copy) = tokio::join!(save, copy);

        let receipt = saved
            .and_then(|saved| {
                lead_copy.map(|lead_copy| ProposalReceipt { lead_type, saved, lead_copy })
            })
            .map_err(|error| {
                warn!(
                    event_name = "proposal.submit.failed",
                    product = %product,
                    error = %error,
                    "proposal hand-off failed"
                );
                error
            })?;
        info!(
            event_name = "proposal.submit.accepted",
            product = %product,
            lead_copy = ?receipt.lead_copy,
            "proposal saved"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use policyplanner_core::config::AppConfig;
    use policyplanner_core::domain::product::ProductKind;
    use policyplanner_core::ports::IntegrationError;
    use serde_json::json;

    use super::{proposal_lead_type, ProposalGateway};

    #[test]
    fn only_personal_accident_and_hospital_cash_hand_off_proposals() {
        assert_eq!(proposal_lead_type(ProductKind::PersonalAccident), Some("pa"));
        assert_eq!(proposal_lead_type(ProductKind::HospitalCash), Some("hc"));
        assert_eq!(proposal_lead_type(ProductKind::SuperTopUp), None);
        assert_eq!(proposal_lead_type(ProductKind::GroupMedical), None);
    }

    #[test]
    fn save_url_sits_under_the_api_base() {
        let gateway = ProposalGateway::from_config(&AppConfig::default()).expect("build");
        assert_eq!(gateway.save_url(), "http://localhost:1202/proposals/save");
    }

    #[tokio::test]
    async fn unsupported_products_and_non_objects_fail_before_any_request() {
        let gateway = ProposalGateway::from_config(&AppConfig::default()).expect("build");
        assert_eq!(
            gateway.submit(ProductKind::GroupMedical, &json!({})).await,
            Err(IntegrationError::NotOffered {
                service: "proposal hand-off",
                product: "gmc".to_owned()
            })
        );
        assert!(matches!(
            gateway.submit(ProductKind::HospitalCash, &json!([1, 2])).await,
            Err(IntegrationError::Decode(_))
        ));
    }
}
