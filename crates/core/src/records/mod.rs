//! Stored enquiry formats.
//!
//! Every product keeps its historical record shape so that payloads written by
//! earlier releases, and the quote screens reading them, keep working.

pub mod group_medical;
pub mod legacy_flat;
pub mod structured;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::member::{Gender, MemberId, MemberKey};
use crate::ports::LeadRecord;

pub use group_medical::{demography_counts, GroupMedicalMapper, ZoneDirectory};
pub use legacy_flat::LegacyFlatMapper;
pub use structured::{GenderPlacement, StructuredMapper};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("stored enquiry is not valid JSON: {0}")]
    Malformed(String),
    #[error("stored enquiry is missing `{0}`")]
    MissingField(&'static str),
    #[error("stored enquiry field `{0}` has an unexpected shape")]
    UnexpectedShape(String),
}

/// Household composition independent of any record format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Household {
    pub spouse: bool,
    pub sons: u8,
    pub daughters: u8,
}

impl Household {
    /// Child counts follow the highest ordinal seen, so `son3` stays `son3`
    /// even when `son2` is absent from a stored record.
    pub fn from_ids<'a>(ids: impl IntoIterator<Item = &'a MemberId>) -> Self {
        let mut household = Self::default();
        for id in ids {
            match id.parts() {
                Some((MemberKey::Spouse, _)) => household.spouse = true,
                Some((MemberKey::Son, Some(n))) => household.sons = household.sons.max(n),
                Some((MemberKey::Daughter, Some(n))) => {
                    household.daughters = household.daughters.max(n)
                }
                Some(_) | None => {}
            }
        }
        household
    }

    pub fn children(&self) -> u8 {
        self.sons.saturating_add(self.daughters)
    }

    /// Flat ids in wizard order.
    pub fn ids(&self) -> Vec<MemberId> {
        let mut ids = vec![MemberId::you()];
        if self.spouse {
            ids.push(MemberId::spouse());
        }
        ids.extend((1..=self.sons).map(|n| MemberId::child(MemberKey::Son, n)));
        ids.extend((1..=self.daughters).map(|n| MemberId::child(MemberKey::Daughter, n)));
        ids
    }
}

/// Everything a wizard needs to persist or restore, in form-field terms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EnquirySnapshot {
    pub household: Household,
    pub ages: BTreeMap<MemberId, String>,
    pub details: BTreeMap<String, String>,
    pub gender: Gender,
    pub terms_accepted: bool,
}

impl EnquirySnapshot {
    pub fn detail(&self, name: &str) -> &str {
        self.details.get(name).map(String::as_str).unwrap_or_default()
    }

    pub fn age(&self, id: &MemberId) -> &str {
        self.ages.get(id).map(String::as_str).unwrap_or_default()
    }
}

/// Converts between a snapshot and one product's stored and lead formats.
pub trait PayloadMapper: Send + Sync {
    fn to_record(&self, snapshot: &EnquirySnapshot, saved_at: DateTime<Utc>) -> Value;

    fn from_record(&self, record: &Value) -> Result<EnquirySnapshot, RecordError>;

    fn to_lead(
        &self,
        snapshot: &EnquirySnapshot,
        lead_type: &str,
        created_at: DateTime<Utc>,
    ) -> LeadRecord;

    fn decode(&self, raw: &str) -> Result<EnquirySnapshot, RecordError> {
        let record: Value =
            serde_json::from_str(raw).map_err(|error| RecordError::Malformed(error.to_string()))?;
        self.from_record(&record)
    }
}

/// Stored scalars come back as strings whatever JSON type they were written as.
pub(crate) fn scalar_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn count_of(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::String(text)) => text.trim().parse::<u8>().unwrap_or(0),
        Some(Value::Number(number)) => {
            number.as_u64().map(|n| u8::try_from(n).unwrap_or(u8::MAX)).unwrap_or(0)
        }
        _ => 0,
    }
}

pub(crate) fn object<'a>(
    value: &'a Value,
    field: &str,
) -> Result<&'a serde_json::Map<String, Value>, RecordError> {
    value.as_object().ok_or_else(|| RecordError::UnexpectedShape(field.to_owned()))
}
