use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::{object, scalar_text, EnquirySnapshot, PayloadMapper, RecordError};
use crate::domain::form::age_on;
use crate::ports::LeadRecord;

pub const ZONE_NOT_AVAILABLE: &str = "Zone not available";

/// Pricing zone per city, keyed by lowercase city name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneDirectory {
    zones: BTreeMap<String, u8>,
}

impl Default for ZoneDirectory {
    fn default() -> Self {
        let entries = [
            ("mumbai", 1),
            ("navi mumbai", 1),
            ("thane", 1),
            ("delhi", 1),
            ("new delhi", 1),
            ("gurgaon", 1),
            ("gurugram", 1),
            ("noida", 1),
            ("ahmedabad", 1),
            ("surat", 1),
            ("vadodara", 1),
            ("bangalore", 2),
            ("bengaluru", 2),
            ("chennai", 2),
            ("hyderabad", 2),
            ("kolkata", 2),
            ("pune", 2),
        ];
        Self::new(entries.map(|(city, zone)| (city.to_owned(), zone)))
    }
}

impl ZoneDirectory {
    pub fn new(entries: impl IntoIterator<Item = (String, u8)>) -> Self {
        Self {
            zones: entries
                .into_iter()
                .map(|(city, zone)| (city.trim().to_lowercase(), zone))
                .collect(),
        }
    }

    pub fn zone_for(&self, city: &str) -> Option<u8> {
        self.zones.get(&city.trim().to_lowercase()).copied()
    }

    pub fn label_for(&self, city: &str) -> String {
        self.zone_for(city)
            .map(|zone| format!("Zone {zone}"))
            .unwrap_or_else(|| ZONE_NOT_AVAILABLE.to_owned())
    }
}

/// `(adults, children)` covered by a demography option.
pub fn demography_counts(demography: &str) -> (u8, u8) {
    match demography {
        "employee+spouse" => (2, 0),
        "spouse+2kids" => (2, 2),
        "withParents" => (4, 2),
        _ => (1, 0),
    }
}

/// Form field -> key inside `details`.
const DETAIL_KEYS: [(&str, &str); 10] = [
    ("companyName", "companyName"),
    ("contactPerson", "contactPerson"),
    ("contactNumber", "cust_mobile"),
    ("email", "email"),
    ("companySize", "companySize"),
    ("industryType", "industryType"),
    ("city", "cust_city"),
    ("coverageAmount", "cover_amount"),
    ("demography", "demography"),
    ("dateOfBirth", "dateOfBirth"),
];

/// `details` key -> lead document key.
const LEAD_KEYS: [(&str, &str); 13] = [
    ("companyName", "company_name"),
    ("contactPerson", "contact_person"),
    ("cust_mobile", "cust_mobile"),
    ("email", "email"),
    ("companySize", "company_size"),
    ("industryType", "industry_type"),
    ("cust_city", "cust_city"),
    ("cover_amount", "cover_amount"),
    ("demography", "demography"),
    ("dateOfBirth", "date_of_birth"),
    ("Age", "Age"),
    ("noOfAdults", "no_of_adults"),
    ("noOfChildren", "no_of_children"),
];

/// `{ step: 1, details: {...} }` company enquiry with derived zone and headcount.
#[derive(Clone, Debug, Default)]
pub struct GroupMedicalMapper {
    zones: ZoneDirectory,
}

impl GroupMedicalMapper {
    pub fn new(zones: ZoneDirectory) -> Self {
        Self { zones }
    }

    pub fn zones(&self) -> &ZoneDirectory {
        &self.zones
    }

    fn details(&self, snapshot: &EnquirySnapshot, today: NaiveDate) -> Map<String, Value> {
        let mut details = Map::new();
        for (field, key) in DETAIL_KEYS {
            details.insert(key.to_owned(), json!(snapshot.detail(field)));
        }

        let zone = self.zones.zone_for(snapshot.detail("city")).map(|zone| zone.to_string());
        details.insert("zone".to_owned(), json!(zone.unwrap_or_default()));

        let age = NaiveDate::parse_from_str(snapshot.detail("dateOfBirth"), "%Y-%m-%d")
            .ok()
            .map(|dob| age_on(dob, today));
        details.insert("Age".to_owned(), json!(age));

        let (adults, children) = demography_counts(snapshot.detail("demography"));
        details.insert("noOfAdults".to_owned(), json!(adults));
        details.insert("noOfChildren".to_owned(), json!(children));
        details.insert("termsAccepted".to_owned(), json!(snapshot.terms_accepted));
        details
    }
}

impl PayloadMapper for GroupMedicalMapper {
    fn to_record(&self, snapshot: &EnquirySnapshot, saved_at: DateTime<Utc>) -> Value {
        json!({
            "step": 1,
            "details": self.details(snapshot, saved_at.date_naive()),
        })
    }

    fn from_record(&self, record: &Value) -> Result<EnquirySnapshot, RecordError> {
        let root = object(record, "$")?;
        let details = root.get("details").ok_or(RecordError::MissingField("details"))?;
        let details = object(details, "details")?;

        let terms_accepted = match details.get("termsAccepted") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(flag)) => flag == "1" || flag == "true",
            _ => false,
        };

        Ok(EnquirySnapshot {
            details: DETAIL_KEYS
                .iter()
                .map(|(field, key)| ((*field).to_owned(), scalar_text(details.get(*key))))
                .collect(),
            terms_accepted,
            ..EnquirySnapshot::default()
        })
    }

    fn to_lead(
        &self,
        snapshot: &EnquirySnapshot,
        lead_type: &str,
        created_at: DateTime<Utc>,
    ) -> LeadRecord {
        let details = self.details(snapshot, created_at.date_naive());
        let mut fields = Map::new();
        for (detail, key) in LEAD_KEYS {
            fields.insert(key.to_owned(), details.get(detail).cloned().unwrap_or(Value::Null));
        }
        fields.insert("lead_type".to_owned(), json!(lead_type));
        fields.insert("plan_type".to_owned(), json!("gmc"));
        fields.insert(
            "created_at".to_owned(),
            json!(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        LeadRecord { lead_type: lead_type.to_owned(), fields }
    }
}
