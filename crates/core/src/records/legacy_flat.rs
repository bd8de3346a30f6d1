use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::{count_of, object, scalar_text, EnquirySnapshot, Household, PayloadMapper, RecordError};
use crate::domain::member::{Gender, MemberId, MemberKey};
use crate::ports::LeadRecord;

/// Form field -> stored key, as the quote backend expects them.
const FIELD_KEYS: [(&str, &str); 7] = [
    ("firstName", "cust_fname"),
    ("lastName", "cust_lname"),
    ("mobile", "cust_mobile"),
    ("pincode", "cust_Pincode"),
    ("city", "cust_city"),
    ("roomRent", "room_rent"),
    ("noOfDays", "no_of_days"),
];

/// Flat `key: "string"` record with `on` checkboxes and per-member age keys.
#[derive(Clone, Debug)]
pub struct LegacyFlatMapper {
    product_type: &'static str,
}

impl LegacyFlatMapper {
    pub fn new(product_type: &'static str) -> Self {
        Self { product_type }
    }

    fn fields(&self, snapshot: &EnquirySnapshot, saved_at: DateTime<Utc>) -> Map<String, Value> {
        let household = snapshot.household;
        let mut record = Map::new();
        let mut put = |key: &str, value: String| {
            record.insert(key.to_owned(), Value::String(value));
        };

        put("product_type", self.product_type.to_owned());
        put("gender", snapshot.gender.as_str().to_owned());
        put("self", "on".to_owned());
        if household.spouse {
            put("spouse", "on".to_owned());
        }
        if household.sons > 0 {
            put("son", "on".to_owned());
        }
        if household.daughters > 0 {
            put("daughter", "on".to_owned());
        }
        put("sonCount", household.sons.to_string());
        put("daughterCount", household.daughters.to_string());
        put("cover_for", cover_for(&household));

        put("Age", snapshot.age(&MemberId::you()).to_owned());
        let spouse_age =
            if household.spouse { snapshot.age(&MemberId::spouse()) } else { "" };
        put("SAge", spouse_age.to_owned());
        for (key, count) in [(MemberKey::Son, household.sons), (MemberKey::Daughter, household.daughters)]
        {
            for ordinal in 1..=count {
                let id = MemberId::child(key, ordinal);
                put(&format!("{id}Age"), snapshot.age(&id).to_owned());
            }
        }

        for (field, key) in FIELD_KEYS {
            put(key, snapshot.detail(field).to_owned());
        }
        put("cover_amount", snapshot.detail("roomRent").to_owned());
        put("termsAccepted", if snapshot.terms_accepted { "1" } else { "0" }.to_owned());
        put("__savedAt", saved_at.to_rfc3339_opts(SecondsFormat::Millis, true));
        record
    }
}

/// `"1"` for self, spouse flag, child count, trailing `"0"`.
pub fn cover_for(household: &Household) -> String {
    format!("1{}{}0", u8::from(household.spouse), household.children())
}

impl PayloadMapper for LegacyFlatMapper {
    fn to_record(&self, snapshot: &EnquirySnapshot, saved_at: DateTime<Utc>) -> Value {
        Value::Object(self.fields(snapshot, saved_at))
    }

    fn from_record(&self, record: &Value) -> Result<EnquirySnapshot, RecordError> {
        let root = object(record, "$")?;
        let household = Household {
            spouse: root.get("spouse").and_then(Value::as_str) == Some("on"),
            sons: count_of(root.get("sonCount")),
            daughters: count_of(root.get("daughterCount")),
        };

        let mut ages = BTreeMap::new();
        for id in household.ids() {
            let key = match id.parts() {
                Some((MemberKey::You, _)) => "Age".to_owned(),
                Some((MemberKey::Spouse, _)) => "SAge".to_owned(),
                _ => format!("{id}Age"),
            };
            ages.insert(id, scalar_text(root.get(&key)));
        }

        let details = FIELD_KEYS
            .iter()
            .map(|(field, key)| ((*field).to_owned(), scalar_text(root.get(*key))))
            .collect();

        let terms_accepted = match root.get("termsAccepted") {
            Some(Value::String(flag)) => flag == "1",
            Some(Value::Number(flag)) => flag.as_u64() == Some(1),
            _ => false,
        };

        Ok(EnquirySnapshot {
            household,
            ages,
            details,
            gender: Gender::from_stored(root.get("gender").and_then(Value::as_str)),
            terms_accepted,
        })
    }

    fn to_lead(
        &self,
        snapshot: &EnquirySnapshot,
        lead_type: &str,
        created_at: DateTime<Utc>,
    ) -> LeadRecord {
        let mut fields = self.fields(snapshot, created_at);
        fields.insert("lead_type".to_owned(), json!(lead_type));
        fields.insert(
            "created_at".to_owned(),
            json!(created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        LeadRecord { lead_type: lead_type.to_owned(), fields }
    }
}
