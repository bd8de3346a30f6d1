use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::{object, scalar_text, EnquirySnapshot, Household, PayloadMapper, RecordError};
use crate::domain::member::{Gender, MemberId};
use crate::ports::LeadRecord;

/// Where the applicant's gender is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GenderPlacement {
    /// `details.gender` (super top-up).
    Details,
    /// On the `you` member entry (personal accident).
    Member,
}

/// `{ members: [{id, age}], details: {...form, gender} }`
#[derive(Clone, Debug)]
pub struct StructuredMapper {
    gender: GenderPlacement,
}

impl StructuredMapper {
    pub fn new(gender: GenderPlacement) -> Self {
        Self { gender }
    }

    fn members(&self, snapshot: &EnquirySnapshot) -> Vec<Value> {
        snapshot
            .household
            .ids()
            .into_iter()
            .map(|id| {
                let age = match snapshot.age(&id) {
                    "" => Value::Null,
                    age => Value::String(age.to_owned()),
                };
                let mut entry = Map::new();
                if self.gender == GenderPlacement::Member && id == MemberId::you() {
                    entry.insert("gender".to_owned(), json!(snapshot.gender.as_str()));
                }
                entry.insert("id".to_owned(), Value::String(id.0));
                entry.insert("age".to_owned(), age);
                Value::Object(entry)
            })
            .collect()
    }

    fn details(&self, snapshot: &EnquirySnapshot) -> Map<String, Value> {
        let mut details: Map<String, Value> = snapshot
            .details
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();
        if self.gender == GenderPlacement::Details {
            details.insert("gender".to_owned(), json!(snapshot.gender.as_str()));
        }
        details
    }
}

impl PayloadMapper for StructuredMapper {
    fn to_record(&self, snapshot: &EnquirySnapshot, _saved_at: DateTime<Utc>) -> Value {
        json!({
            "members": self.members(snapshot),
            "details": self.details(snapshot),
        })
    }

    fn from_record(&self, record: &Value) -> Result<EnquirySnapshot, RecordError> {
        let root = object(record, "$")?;
        let members =
            root.get("members").and_then(Value::as_array).ok_or(RecordError::MissingField("members"))?;
        let details = root.get("details").ok_or(RecordError::MissingField("details"))?;
        let details = object(details, "details")?;

        let mut ids = Vec::with_capacity(members.len());
        let mut ages = BTreeMap::new();
        let mut member_gender = None;
        for member in members {
            let entry = object(member, "members[]")?;
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| RecordError::UnexpectedShape("members[].id".to_owned()))?;
            let id = MemberId(id.to_owned());
            if id.parts().is_none() {
                return Err(RecordError::UnexpectedShape(format!("members[].id={id}")));
            }
            if id == MemberId::you() {
                member_gender = entry.get("gender").and_then(Value::as_str);
            }
            ages.insert(id.clone(), scalar_text(entry.get("age")));
            ids.push(id);
        }

        let gender_source = match self.gender {
            GenderPlacement::Details => details.get("gender").and_then(Value::as_str),
            GenderPlacement::Member => member_gender,
        };

        Ok(EnquirySnapshot {
            household: Household::from_ids(&ids),
            ages,
            details: details
                .iter()
                .filter(|(name, _)| name.as_str() != "gender")
                .map(|(name, value)| (name.clone(), scalar_text(Some(value))))
                .collect(),
            gender: Gender::from_stored(gender_source),
            terms_accepted: false,
        })
    }

    fn to_lead(
        &self,
        snapshot: &EnquirySnapshot,
        lead_type: &str,
        created_at: DateTime<Utc>,
    ) -> LeadRecord {
        let mut fields = self.details(snapshot);
        fields.insert("gender".to_owned(), json!(snapshot.gender.as_str()));
        fields.insert("members".to_owned(), Value::Array(self.members(snapshot)));
        fields.insert("lead_type".to_owned(), json!(lead_type));
        fields.insert(
            "created_at".to_owned(),
            json!(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        LeadRecord { lead_type: lead_type.to_owned(), fields }
    }
}
