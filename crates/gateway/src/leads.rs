use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use policyplanner_core::config::LeadStoreConfig;
use policyplanner_core::ports::{IntegrationError, LeadRecord, LeadStore};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tracing::info;

use crate::http::{build_client, ensure_success, transport, trim_base};

struct Target {
    url: String,
    api_key: Option<SecretString>,
}

/// Document store reached with `POST {base_url}/{collection}`.
///
/// Built disabled when `lead_store.enabled` is false; every insert then fails
/// with [`IntegrationError::Disabled`], which the wizard logs and ignores.
#[derive(Clone)]
pub struct HttpLeadStore {
    client: Client,
    target: Option<Arc<Target>>,
}

impl fmt::Debug for HttpLeadStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpLeadStore")
            .field("url", &self.target.as_ref().map(|target| target.url.as_str()))
            .field("api_key", &self.target.as_ref().map(|target| target.api_key.is_some()))
            .finish()
    }
}

impl HttpLeadStore {
    pub fn disabled() -> Self {
        Self { client: Client::new(), target: None }
    }

    pub fn new(
        base_url: &str,
        collection: &str,
        api_key: Option<SecretString>,
        timeout_secs: u64,
    ) -> Result<Self, IntegrationError> {
        let url = format!("{}/{}", trim_base(base_url), collection.trim_matches('/'));
        Ok(Self {
            client: build_client(timeout_secs)?,
            target: Some(Arc::new(Target { url, api_key })),
        })
    }

    pub fn from_config(config: &LeadStoreConfig) -> Result<Self, IntegrationError> {
        Self::for_collection(config, &config.collection)
    }

    /// Same store and credentials, writing into `collection`.
    pub fn for_collection(
        config: &LeadStoreConfig,
        collection: &str,
    ) -> Result<Self, IntegrationError> {
        match (&config.base_url, config.enabled) {
            (Some(base_url), true) => {
                Self::new(base_url, collection, config.api_key.clone(), config.timeout_secs)
            }
            _ => Ok(Self::disabled()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }
}

/// Flat document: the record's fields and lead type. A `created_at` stamp is
/// added when the mapper did not provide one.
pub fn lead_document(record: &LeadRecord) -> Value {
    let mut document: Map<String, Value> = record.fields.clone();
    document.insert("lead_type".to_owned(), Value::String(record.lead_type.clone()));
    document.entry("created_at").or_insert_with(|| {
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    });
    Value::Object(document)
}

#[async_trait]
impl LeadStore for HttpLeadStore {
    async fn insert(&self, record: LeadRecord) -> Result<(), IntegrationError> {
        let Some(target) = &self.target else {
            return Err(IntegrationError::Disabled("lead store"));
        };

        let mut request = self.client.post(&target.url).json(&lead_document(&record));
        if let Some(api_key) = &target.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }
        ensure_success(request.send().await.map_err(transport)?).await?;

        info!(
            event_name = "lead_store.insert.accepted",
            lead_type = %record.lead_type,
            fields = record.fields.len(),
            "lead stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use policyplanner_core::config::AppConfig;
    use policyplanner_core::ports::{IntegrationError, LeadRecord, LeadStore};
    use serde_json::{json, Map};

    use super::{lead_document, HttpLeadStore};

    fn record() -> LeadRecord {
        let mut fields = Map::new();
        fields.insert("cust_mobile".to_owned(), json!("9123456789"));
        LeadRecord { lead_type: "hospicash".to_owned(), fields }
    }

    #[test]
    fn document_flattens_fields_and_stamps_lead_type() {
        let document = lead_document(&record());
        assert_eq!(document["cust_mobile"], "9123456789");
        assert_eq!(document["lead_type"], "hospicash");
        assert!(document["created_at"].as_str().is_some_and(|stamp| stamp.ends_with('Z')));
    }

    #[test]
    fn mapper_supplied_stamp_is_kept() {
        let mut stamped = record();
        stamped.fields.insert("created_at".to_owned(), json!("2026-01-02T03:04:05.000Z"));
        assert_eq!(lead_document(&stamped)["created_at"], "2026-01-02T03:04:05.000Z");
    }

    #[tokio::test]
    async fn disabled_store_refuses_inserts() {
        let store = HttpLeadStore::from_config(&AppConfig::default().lead_store).expect("build");
        assert!(!store.is_enabled());
        assert_eq!(store.insert(record()).await, Err(IntegrationError::Disabled("lead store")));
    }

    #[test]
    fn debug_output_hides_the_api_key() {
        let store = HttpLeadStore::new(
            "https://leads.example.com/",
            "AUX_enquiry_leads",
            Some("super-secret".to_owned().into()),
            5,
        )
        .expect("build");
        let rendered = format!("{store:?}");
        assert!(rendered.contains("https://leads.example.com/AUX_enquiry_leads"));
        assert!(!rendered.contains("super-secret"));
    }
}
