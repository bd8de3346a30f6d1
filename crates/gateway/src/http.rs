use std::time::Duration;

use policyplanner_core::ports::IntegrationError;
use reqwest::{Client, Response};
use serde_json::Value;

pub fn build_client(timeout_secs: u64) -> Result<Client, IntegrationError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|error| IntegrationError::Transport(format!("http client: {error}")))
}

pub fn transport(error: reqwest::Error) -> IntegrationError {
    IntegrationError::Transport(error.to_string())
}

/// Maps non-2xx responses to [`IntegrationError::Status`] with the body text.
pub async fn ensure_success(response: Response) -> Result<Response, IntegrationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IntegrationError::Status { status: status.as_u16(), body })
}

pub async fn json_body(response: Response) -> Result<Value, IntegrationError> {
    response.json::<Value>().await.map_err(|error| IntegrationError::Decode(error.to_string()))
}

pub fn trim_base(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_owned()
}
