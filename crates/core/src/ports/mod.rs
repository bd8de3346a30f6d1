//! Boundaries between the enquiry engine and the outside world.
//!
//! The engine never touches a concrete store, clock-driven browser API or HTTP
//! client directly; everything goes through the traits below so the mount
//! decision procedure can be exercised against [`memory`] fakes.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Lifetime of a stored value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageScope {
    /// Cleared when the browsing session ends.
    Session,
    /// Survives reloads and session end.
    Durable,
}

impl StorageScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Durable => "durable",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "session" => Some(Self::Session),
            "durable" => Some(Self::Durable),
            _ => None,
        }
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored value for `{key}` could not be decoded: {reason}")]
    Decode { key: String, reason: String },
}

#[async_trait]
pub trait StoragePort: Send + Sync {
    async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError>;
}

/// How the current page load came about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationType {
    Navigate,
    Reload,
    BackForward,
}

pub trait NavigationContext: Send + Sync {
    /// `None` when the signal is unavailable; callers treat that as "not a reload".
    fn navigation_type(&self) -> Option<NavigationType>;

    fn is_reload(&self) -> bool {
        self.navigation_type() == Some(NavigationType::Reload)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected upstream payload: {0}")]
    Decode(String),
    #[error("{0} is not configured")]
    Disabled(&'static str),
    #[error("{service} is not offered for {product}")]
    NotOffered { service: &'static str, product: String },
}

/// Normalised answer from the OTP backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpReply {
    pub accepted: bool,
    pub message: Option<String>,
}

impl OtpReply {
    pub fn accepted() -> Self {
        Self { accepted: true, message: None }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { accepted: false, message: Some(message.into()) }
    }
}

#[async_trait]
pub trait OtpService: Send + Sync {
    async fn send_otp(&self, mobile: &str) -> Result<OtpReply, IntegrationError>;
    async fn verify_otp(&self, mobile: &str, code: &str) -> Result<OtpReply, IntegrationError>;
}

/// Flat document handed to the remote lead store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub lead_type: String,
    pub fields: Map<String, Value>,
}

impl LeadRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert(&self, record: LeadRecord) -> Result<(), IntegrationError>;
}

/// Leaves the wizard for another route of the product.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}
