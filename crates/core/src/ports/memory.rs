use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    IntegrationError, LeadRecord, LeadStore, NavigationContext, NavigationType, Navigator,
    OtpReply, OtpService, StorageError, StoragePort, StorageScope,
};

/// Two-scope key/value store held in process memory.
#[derive(Default)]
pub struct InMemoryStorage {
    entries: RwLock<HashMap<(StorageScope, String), String>>,
}

impl InMemoryStorage {
    /// Drops every session-scoped entry, as closing the tab would.
    pub async fn end_session(&self) {
        let mut entries = self.entries.write().await;
        entries.retain(|(scope, _), _| *scope == StorageScope::Durable);
    }

    pub async fn entries(&self, scope: StorageScope) -> BTreeMap<String, String> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|((entry_scope, _), _)| *entry_scope == scope)
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect()
    }
}

#[async_trait]
impl StoragePort for InMemoryStorage {
    async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(scope, key.to_owned())).cloned())
    }

    async fn set(&self, scope: StorageScope, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.insert((scope, key.to_owned()), value.to_owned());
        Ok(())
    }

    async fn remove(&self, scope: StorageScope, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.remove(&(scope, key.to_owned()));
        Ok(())
    }
}

/// Navigation signal fixed at construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticNavigation(pub Option<NavigationType>);

impl StaticNavigation {
    pub fn navigate() -> Self {
        Self(Some(NavigationType::Navigate))
    }

    pub fn reload() -> Self {
        Self(Some(NavigationType::Reload))
    }

    pub fn unavailable() -> Self {
        Self(None)
    }
}

impl NavigationContext for StaticNavigation {
    fn navigation_type(&self) -> Option<NavigationType> {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtpCall {
    Send { mobile: String },
    Verify { mobile: String, code: String },
}

/// OTP backend that accepts one fixed code and records every call.
pub struct ScriptedOtpService {
    code: String,
    send_accepted: bool,
    unreachable: bool,
    latency: Option<Duration>,
    calls: Mutex<Vec<OtpCall>>,
}

impl ScriptedOtpService {
    pub fn accepting(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            send_accepted: true,
            unreachable: false,
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_sends(mut self) -> Self {
        self.send_accepted = false;
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<OtpCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn verify_calls(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, OtpCall::Verify { .. })).count()
    }

    pub fn send_calls(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, OtpCall::Send { .. })).count()
    }

    fn record(&self, call: OtpCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }

    async fn respond(&self, reply: OtpReply) -> Result<OtpReply, IntegrationError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable {
            return Err(IntegrationError::Transport("connection refused".to_owned()));
        }
        Ok(reply)
    }
}

#[async_trait]
impl OtpService for ScriptedOtpService {
    async fn send_otp(&self, mobile: &str) -> Result<OtpReply, IntegrationError> {
        self.record(OtpCall::Send { mobile: mobile.to_owned() });
        let reply = if self.send_accepted {
            OtpReply::accepted()
        } else {
            OtpReply::rejected("OTP quota exceeded")
        };
        self.respond(reply).await
    }

    async fn verify_otp(&self, mobile: &str, code: &str) -> Result<OtpReply, IntegrationError> {
        self.record(OtpCall::Verify { mobile: mobile.to_owned(), code: code.to_owned() });
        let reply = if code == self.code {
            OtpReply::accepted()
        } else {
            OtpReply { accepted: false, message: None }
        };
        self.respond(reply).await
    }
}

/// Lead store that keeps inserted records, or fails every insert.
#[derive(Default)]
pub struct RecordingLeadStore {
    failing: bool,
    records: Mutex<Vec<LeadRecord>>,
}

impl RecordingLeadStore {
    pub fn failing() -> Self {
        Self { failing: true, records: Mutex::new(Vec::new()) }
    }

    pub fn records(&self) -> Vec<LeadRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LeadStore for RecordingLeadStore {
    async fn insert(&self, record: LeadRecord) -> Result<(), IntegrationError> {
        if self.failing {
            return Err(IntegrationError::Status {
                status: 503,
                body: "lead store unavailable".to_owned(),
            });
        }
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNavigator {
    routes: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        match self.routes.lock() {
            Ok(routes) => routes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<String> {
        self.routes().last().cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        match self.routes.lock() {
            Ok(mut routes) => routes.push(route.to_owned()),
            Err(poisoned) => poisoned.into_inner().push(route.to_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryStorage, OtpCall, RecordingLeadStore, ScriptedOtpService};
    use crate::ports::{LeadRecord, LeadStore, OtpService, StoragePort, StorageScope};

    #[tokio::test]
    async fn scopes_are_independent_and_end_session_keeps_durable_entries() {
        let storage = InMemoryStorage::default();
        storage.set(StorageScope::Session, "k", "session").await.expect("set session");
        storage.set(StorageScope::Durable, "k", "durable").await.expect("set durable");

        assert_eq!(
            storage.get(StorageScope::Session, "k").await.expect("get"),
            Some("session".to_owned())
        );

        storage.end_session().await;
        assert_eq!(storage.get(StorageScope::Session, "k").await.expect("get"), None);
        assert_eq!(
            storage.get(StorageScope::Durable, "k").await.expect("get"),
            Some("durable".to_owned())
        );
    }

    #[tokio::test]
    async fn scripted_otp_accepts_only_its_code() {
        let otp = ScriptedOtpService::accepting("4321");
        assert!(otp.send_otp("9123456789").await.expect("send").accepted);
        assert!(!otp.verify_otp("9123456789", "1234").await.expect("verify").accepted);
        assert!(otp.verify_otp("9123456789", "4321").await.expect("verify").accepted);

        assert_eq!(otp.send_calls(), 1);
        assert_eq!(otp.verify_calls(), 2);
        assert_eq!(
            otp.calls()[0],
            OtpCall::Send { mobile: "9123456789".to_owned() }
        );
    }

    #[tokio::test]
    async fn failing_lead_store_keeps_nothing() {
        let store = RecordingLeadStore::failing();
        let result = store.insert(LeadRecord::default()).await;
        assert!(result.is_err());
        assert!(store.records().is_empty());
    }
}
