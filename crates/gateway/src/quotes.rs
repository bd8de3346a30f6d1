//! Quote fan-out: list a product's insurer endpoints, then post the enquiry
//! payload to all of them at once. Insurers that fail are left out.

use policyplanner_core::config::QuotesConfig;
use policyplanner_core::domain::product::ProductKind;
use policyplanner_core::ports::IntegrationError;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::http::{build_client, ensure_success, json_body, transport, trim_base};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InsurerQuote {
    pub endpoint: String,
    pub response: Value,
}

impl InsurerQuote {
    pub fn company(&self) -> Option<&str> {
        self.response.get("company").and_then(Value::as_str).map(str::trim)
    }
}

#[derive(Clone, Debug)]
pub struct QuoteFanout {
    client: Client,
    base_url: String,
}

/// Absolute URLs pass through; anything else is joined onto `base_url`.
pub fn resolve_endpoint(base_url: &str, raw: &str) -> String {
    let api = raw.trim();
    if api.starts_with("http://") || api.starts_with("https://") {
        api.to_owned()
    } else if api.starts_with('/') {
        format!("{}{api}", trim_base(base_url))
    } else {
        format!("{}/{api}", trim_base(base_url))
    }
}

/// Endpoint entries are either bare strings or objects carrying `api_type`.
fn endpoint_list(payload: &Value) -> Vec<String> {
    let entries = match payload.get("data") {
        Some(Value::Array(entries)) => entries.as_slice(),
        _ => match payload {
            Value::Array(entries) => entries.as_slice(),
            _ => &[],
        },
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(api) => Some(api.as_str()),
            other => other.get("api_type").and_then(Value::as_str),
        })
        .map(str::trim)
        .filter(|api| !api.is_empty())
        .map(str::to_owned)
        .collect()
}

impl QuoteFanout {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, IntegrationError> {
        Ok(Self { client: build_client(timeout_secs)?, base_url: trim_base(base_url) })
    }

    pub fn from_config(config: &QuotesConfig) -> Result<Self, IntegrationError> {
        Self::new(&config.base_url, config.timeout_secs)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolved premium endpoints for `product`.
    pub async fn endpoints(&self, product: ProductKind) -> Result<Vec<String>, IntegrationError> {
        let url = format!("{}/companies/plans", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("policy", product.plan_policy())])
            .send()
            .await
            .map_err(transport)?;
        let payload = json_body(ensure_success(response).await?).await?;
        Ok(endpoint_list(&payload)
            .iter()
            .map(|api| resolve_endpoint(&self.base_url, api))
            .collect())
    }

    /// Posts `payload` to every endpoint concurrently. Results keep endpoint order.
    pub async fn fetch_quotes(
        &self,
        product: ProductKind,
        payload: &Value,
    ) -> Result<Vec<InsurerQuote>, IntegrationError> {
        let endpoints = self.endpoints(product).await?;
        let total = endpoints.len();

        let mut requests = JoinSet::new();
        for (index, endpoint) in endpoints.into_iter().enumerate() {
            let client = self.client.clone();
            let body = payload.clone();
            requests.spawn(async move {
                let outcome = post_quote(&client, &endpoint, &body).await;
                (index, endpoint, outcome)
            });
        }

        let mut quotes = Vec::with_capacity(total);
        while let Some(joined) = requests.join_next().await {
            let Ok((index, endpoint, outcome)) = joined else {
                continue;
            };
            match outcome {
                Ok(Value::Null) => {}
                Ok(response) => quotes.push((index, InsurerQuote { endpoint, response })),
                Err(error) => warn!(
                    event_name = "quotes.insurer.skipped",
                    product = %product,
                    endpoint = %endpoint,
                    error = %error,
                    "skipping failed insurer"
                ),
            }
        }
        quotes.sort_by_key(|(index, _)| *index);

        info!(
            event_name = "quotes.fanout.completed",
            product = %product,
            requested = total,
            answered = quotes.len(),
            "quote fan-out finished"
        );
        Ok(quotes.into_iter().map(|(_, quote)| quote).collect())
    }
}

async fn post_quote(client: &Client, endpoint: &str, body: &Value) -> Result<Value, IntegrationError> {
    let response = client.post(endpoint).json(body).send().await.map_err(transport)?;
    json_body(ensure_success(response).await?).await
}
