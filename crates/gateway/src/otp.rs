use async_trait::async_trait;
use policyplanner_core::config::OtpConfig;
use policyplanner_core::ports::{IntegrationError, OtpReply, OtpService};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::http::{build_client, ensure_success, json_body, transport, trim_base};

#[derive(Serialize)]
struct SendRequest<'a> {
    mobile: &'a str,
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    mobile: &'a str,
    otp: &'a str,
}

/// OTP backend reached over `POST /otp/send-otp` and `POST /otp/verify-otp`.
#[derive(Clone, Debug)]
pub struct HttpOtpService {
    client: Client,
    base_url: String,
}

impl HttpOtpService {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, IntegrationError> {
        Ok(Self { client: build_client(timeout_secs)?, base_url: trim_base(base_url) })
    }

    pub fn from_config(config: &OtpConfig) -> Result<Self, IntegrationError> {
        Self::new(&config.base_url, config.timeout_secs)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Value, IntegrationError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await.map_err(transport)?;
        json_body(ensure_success(response).await?).await
    }
}

/// Only a literal `true` under `flag` counts as acceptance.
fn interpret(payload: &Value, flag: &str) -> OtpReply {
    let message = payload.get("message").and_then(Value::as_str).map(str::to_owned);
    if payload.get(flag) == Some(&Value::Bool(true)) {
        OtpReply { accepted: true, message }
    } else {
        OtpReply { accepted: false, message }
    }
}

#[async_trait]
impl OtpService for HttpOtpService {
    async fn send_otp(&self, mobile: &str) -> Result<OtpReply, IntegrationError> {
        let reply = match self.post("/otp/send-otp", &SendRequest { mobile }).await {
            Ok(payload) => interpret(&payload, "success"),
            Err(error) => {
                warn!(event_name = "otp.send.failed", error = %error, "otp send call failed");
                return Err(error);
            }
        };
        if !reply.accepted {
            warn!(
                event_name = "otp.send.rejected",
                message = reply.message.as_deref().unwrap_or(""),
                "otp backend refused to send"
            );
        }
        Ok(reply)
    }

    async fn verify_otp(&self, mobile: &str, code: &str) -> Result<OtpReply, IntegrationError> {
        let payload = self
            .post("/otp/verify-otp", &VerifyRequest { mobile, otp: code })
            .await
            .map_err(|error| {
                warn!(event_name = "otp.verify.failed", error = %error, "otp verify call failed");
                error
            })?;
        let reply = interpret(&payload, "valid");
        debug!(event_name = "otp.verify.answered", accepted = reply.accepted, "otp verify answered");
        Ok(reply)
    }
}
