use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::age::AgeBands;
use crate::domain::form::{
    FieldRule, FieldSchema, FieldSpec, InputTransform, COMPANY_NAME, EMAIL, INDUSTRY, MOBILE,
    PERSON_NAME, PINCODE, UPPER_CITY,
};
use crate::domain::member::{MemberSchema, DEFAULT_MAX_DEPENDENTS};
use crate::ports::StorageScope;
use crate::records::{
    GenderPlacement, GroupMedicalMapper, LegacyFlatMapper, PayloadMapper, StructuredMapper,
};

pub const DEFAULT_LANDING_URL: &str = "https://policyplanner.com/#/";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    SuperTopUp,
    PersonalAccident,
    GroupMedical,
    HospitalCash,
}

impl ProductKind {
    pub const ALL: [ProductKind; 4] =
        [Self::SuperTopUp, Self::PersonalAccident, Self::GroupMedical, Self::HospitalCash];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperTopUp => "supertopup",
            Self::PersonalAccident => "pa",
            Self::GroupMedical => "gmc",
            Self::HospitalCash => "hospicash",
        }
    }

    /// Value of the `policy` query parameter on the plan listing endpoint.
    pub fn plan_policy(self) -> &'static str {
        match self {
            Self::SuperTopUp => "super_top_up",
            Self::PersonalAccident => "pa",
            Self::GroupMedical => "gmc",
            Self::HospitalCash => "hc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "supertopup" | "stu" => Some(Self::SuperTopUp),
            "pa" | "personalaccident" => Some(Self::PersonalAccident),
            "gmc" | "groupmedical" | "groupmedicalcare" => Some(Self::GroupMedical),
            "hospicash" | "hospitalcash" | "hc" => Some(Self::HospitalCash),
            _ => None,
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage keys and the page identity used for refresh detection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StorageKeys {
    pub enquiry: String,
    pub restore_flag: String,
    pub last_page: String,
    pub page_name: String,
}

impl StorageKeys {
    pub fn new(prefix: &str, page_name: &str) -> Self {
        Self {
            enquiry: format!("{prefix}_enquiry"),
            restore_flag: format!("{prefix}_restore_ok"),
            last_page: format!("{prefix}_last_page"),
            page_name: page_name.to_owned(),
        }
    }

    pub fn with_restore_flag(mut self, key: &str) -> Self {
        self.restore_flag = key.to_owned();
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RestorePolicy {
    pub flag_scope: StorageScope,
    /// Remove the flag once a restore has used it.
    pub consume_flag_on_restore: bool,
    /// A non-empty stored mobile counts as already verified.
    pub trust_restored_mobile: bool,
}

/// Business policy shared by every product, usually taken from configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnquiryPolicy {
    pub max_dependents: u8,
    pub trust_restored_mobile: bool,
    pub landing_url: String,
    pub resend_cooldown_secs: u32,
}

impl Default for EnquiryPolicy {
    fn default() -> Self {
        Self {
            max_dependents: DEFAULT_MAX_DEPENDENTS,
            trust_restored_mobile: true,
            landing_url: DEFAULT_LANDING_URL.to_owned(),
            resend_cooldown_secs: crate::domain::verification::DEFAULT_RESEND_COOLDOWN_SECS,
        }
    }
}

/// Everything that differs between the product wizards.
#[derive(Clone)]
pub struct ProductSchema {
    pub kind: ProductKind,
    pub keys: StorageKeys,
    pub restore: RestorePolicy,
    pub fields: FieldSchema,
    /// Fields filled in next to the ages; leaving the ages step validates them.
    pub ages_step_fields: &'static [&'static str],
    /// `None` for products without household and age steps.
    pub household: Option<MemberSchema>,
    pub ages: AgeBands,
    pub requires_otp: bool,
    pub requires_terms: bool,
    /// Editing the mobile number also withdraws terms acceptance.
    pub mobile_change_clears_terms: bool,
    pub mobile_field: &'static str,
    pub quotes_route: String,
    pub landing_url: String,
    pub lead_type: &'static str,
    pub resend_cooldown_secs: u32,
    pub mapper: Arc<dyn PayloadMapper>,
}

impl fmt::Debug for ProductSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductSchema")
            .field("kind", &self.kind)
            .field("keys", &self.keys)
            .field("restore", &self.restore)
            .field("household", &self.household)
            .field("requires_otp", &self.requires_otp)
            .field("requires_terms", &self.requires_terms)
            .field("quotes_route", &self.quotes_route)
            .finish_non_exhaustive()
    }
}

impl ProductSchema {
    pub fn for_kind(kind: ProductKind, policy: &EnquiryPolicy) -> Self {
        match kind {
            ProductKind::SuperTopUp => Self::super_top_up(policy),
            ProductKind::PersonalAccident => Self::personal_accident(policy),
            ProductKind::GroupMedical => Self::group_medical(policy),
            ProductKind::HospitalCash => Self::hospital_cash(policy),
        }
    }

    pub fn super_top_up(policy: &EnquiryPolicy) -> Self {
        Self {
            kind: ProductKind::SuperTopUp,
            keys: StorageKeys::new("supertopup", "supertopup-enquiry"),
            restore: RestorePolicy {
                flag_scope: StorageScope::Durable,
                consume_flag_on_restore: false,
                trust_restored_mobile: policy.trust_restored_mobile,
            },
            fields: FieldSchema::new(vec![
                person_name("firstName"),
                person_name("lastName"),
                mobile("mobile"),
                pincode(),
                FieldSpec::new("city")
                    .required()
                    .rule(FieldRule::pattern("city", &PERSON_NAME))
                    .transform(InputTransform::LettersOnly),
                FieldSpec::new("coverAmount").required(),
            ]),
            ages_step_fields: &[],
            household: Some(MemberSchema::family(policy.max_dependents)),
            ages: AgeBands::default(),
            requires_otp: true,
            requires_terms: false,
            mobile_change_clears_terms: false,
            mobile_field: "mobile",
            quotes_route: "/supertopup/quotes".to_owned(),
            landing_url: policy.landing_url.clone(),
            lead_type: "supertopup",
            resend_cooldown_secs: policy.resend_cooldown_secs,
            mapper: Arc::new(StructuredMapper::new(GenderPlacement::Details)),
        }
    }

    pub fn personal_accident(policy: &EnquiryPolicy) -> Self {
        let upper_letters = |name: &'static str| {
            FieldSpec::new(name)
                .required()
                .rule(FieldRule::pattern("name", &PERSON_NAME))
                .transform(InputTransform::LettersUpper)
        };
        Self {
            kind: ProductKind::PersonalAccident,
            keys: StorageKeys::new("pa", "pa-enquiry"),
            restore: RestorePolicy {
                flag_scope: StorageScope::Session,
                consume_flag_on_restore: false,
                trust_restored_mobile: policy.trust_restored_mobile,
            },
            fields: FieldSchema::new(vec![
                upper_letters("firstName"),
                upper_letters("lastName"),
                FieldSpec::new("dob").required().rule(FieldRule::AdultDateOfBirth),
                mobile("mobile"),
                pincode(),
                upper_letters("city"),
                FieldSpec::new("occupation").required(),
                FieldSpec::new("incomeRange").required(),
                FieldSpec::new("coverAmount").required(),
                FieldSpec::new("riskCategory").required(),
            ]),
            ages_step_fields: &["firstName", "lastName", "dob", "mobile", "pincode", "city"],
            household: Some(MemberSchema::self_only()),
            ages: AgeBands::default(),
            requires_otp: false,
            requires_terms: false,
            mobile_change_clears_terms: false,
            mobile_field: "mobile",
            quotes_route: "/personal-accident/quotes".to_owned(),
            landing_url: policy.landing_url.clone(),
            lead_type: "pa",
            resend_cooldown_secs: policy.resend_cooldown_secs,
            mapper: Arc::new(StructuredMapper::new(GenderPlacement::Member)),
        }
    }

    pub fn group_medical(policy: &EnquiryPolicy) -> Self {
        let upper = |name: &'static str, pattern: &'static str, regex: &Regex| {
            FieldSpec::new(name)
                .required()
                .rule(FieldRule::MinLength(2))
                .rule(FieldRule::pattern(pattern, regex))
                .transform(InputTransform::Upper)
        };
        Self {
            kind: ProductKind::GroupMedical,
            keys: StorageKeys::new("gmc", "gmc-enquiry-form")
                .with_restore_flag("gmc_enquiry_restore_ok"),
            restore: RestorePolicy {
                flag_scope: StorageScope::Session,
                consume_flag_on_restore: true,
                trust_restored_mobile: policy.trust_restored_mobile,
            },
            fields: FieldSchema::new(vec![
                upper("companyName", "company name", &COMPANY_NAME),
                FieldSpec::new("contactPerson").required(),
                mobile("contactNumber"),
                FieldSpec::new("email").required().rule(FieldRule::pattern("email", &EMAIL)),
                FieldSpec::new("companySize").required(),
                upper("industryType", "industry", &INDUSTRY),
                upper("city", "city", &UPPER_CITY),
                FieldSpec::new("coverageAmount").required(),
                FieldSpec::new("demography").required(),
                FieldSpec::new("dateOfBirth").required().rule(FieldRule::AdultDateOfBirth),
            ]),
            ages_step_fields: &[],
            household: None,
            ages: AgeBands::default(),
            requires_otp: false,
            requires_terms: true,
            mobile_change_clears_terms: false,
            mobile_field: "contactNumber",
            quotes_route: "/gmc/quotes".to_owned(),
            landing_url: policy.landing_url.clone(),
            lead_type: "group-medical-care",
            resend_cooldown_secs: policy.resend_cooldown_secs,
            mapper: Arc::new(GroupMedicalMapper::default()),
        }
    }

    pub fn hospital_cash(policy: &EnquiryPolicy) -> Self {
        Self {
            kind: ProductKind::HospitalCash,
            keys: StorageKeys::new("hospicash", "hospi-cash-enquiry"),
            restore: RestorePolicy {
                flag_scope: StorageScope::Session,
                consume_flag_on_restore: false,
                trust_restored_mobile: policy.trust_restored_mobile,
            },
            fields: FieldSchema::new(vec![
                person_name("firstName"),
                person_name("lastName"),
                mobile("mobile"),
                pincode(),
                FieldSpec::new("city")
                    .required()
                    .rule(FieldRule::MinLength(3))
                    .rule(FieldRule::pattern("city", &PERSON_NAME))
                    .transform(InputTransform::LettersOnly),
                FieldSpec::new("roomRent").required(),
                FieldSpec::new("noOfDays").required(),
            ]),
            ages_step_fields: &[],
            household: Some(MemberSchema::family(policy.max_dependents)),
            ages: AgeBands::default().with_infant_value("0.4"),
            requires_otp: true,
            requires_terms: true,
            mobile_change_clears_terms: true,
            mobile_field: "mobile",
            quotes_route: "/hospicash/quotes".to_owned(),
            landing_url: policy.landing_url.clone(),
            lead_type: "hospicash",
            resend_cooldown_secs: policy.resend_cooldown_secs,
            mapper: Arc::new(LegacyFlatMapper::new("hospicash")),
        }
    }

    pub fn has_household(&self) -> bool {
        self.household.is_some()
    }
}

fn person_name(name: &'static str) -> FieldSpec {
    FieldSpec::new(name)
        .required()
        .rule(FieldRule::MaxLength(20))
        .rule(FieldRule::pattern("name", &PERSON_NAME))
        .transform(InputTransform::LettersOnly)
}

fn mobile(name: &'static str) -> FieldSpec {
    FieldSpec::new(name)
        .required()
        .rule(FieldRule::pattern("mobile number", &MOBILE))
        .transform(InputTransform::Digits { max_len: 10 })
}

fn pincode() -> FieldSpec {
    FieldSpec::new("pincode")
        .required()
        .rule(FieldRule::pattern("pincode", &PINCODE))
        .transform(InputTransform::Digits { max_len: 6 })
}

#[cfg(test)]
mod tests {
    use super::{EnquiryPolicy, ProductKind, ProductSchema};
    use crate::ports::StorageScope;

    #[test]
    fn storage_keys_match_existing_browser_data() {
        let policy = EnquiryPolicy::default();
        let stu = ProductSchema::super_top_up(&policy);
        assert_eq!(stu.keys.enquiry, "supertopup_enquiry");
        assert_eq!(stu.keys.restore_flag, "supertopup_restore_ok");
        assert_eq!(stu.keys.last_page, "supertopup_last_page");
        assert_eq!(stu.restore.flag_scope, StorageScope::Durable);

        let gmc = ProductSchema::group_medical(&policy);
        assert_eq!(gmc.keys.restore_flag, "gmc_enquiry_restore_ok");
        assert!(gmc.restore.consume_flag_on_restore);
        assert!(gmc.household.is_none());

        let hc = ProductSchema::hospital_cash(&policy);
        assert_eq!(hc.keys.page_name, "hospi-cash-enquiry");
        assert_eq!(hc.quotes_route, "/hospicash/quotes");
        assert_eq!(hc.ages.infant_value, "0.4");
        assert!(hc.requires_otp && hc.requires_terms);
    }

    #[test]
    fn policy_flows_into_every_schema() {
        let policy = EnquiryPolicy {
            max_dependents: 2,
            trust_restored_mobile: false,
            landing_url: "https://example.test/".to_owned(),
            resend_cooldown_secs: 45,
        };
        for kind in ProductKind::ALL {
            let schema = ProductSchema::for_kind(kind, &policy);
            assert_eq!(schema.kind, kind);
            assert!(!schema.restore.trust_restored_mobile);
            assert_eq!(schema.landing_url, "https://example.test/");
            assert_eq!(schema.resend_cooldown_secs, 45);
            assert!(schema.fields.field(schema.mobile_field).is_some());
        }
        let household = ProductSchema::super_top_up(&policy).household.expect("household");
        assert_eq!(household.max_dependents, 2);
    }

    #[test]
    fn product_names_parse_with_aliases() {
        assert_eq!(ProductKind::parse("super-top-up"), Some(ProductKind::SuperTopUp));
        assert_eq!(ProductKind::parse("HC"), Some(ProductKind::HospitalCash));
        assert_eq!(ProductKind::parse("group_medical"), Some(ProductKind::GroupMedical));
        assert_eq!(ProductKind::parse("motor"), None);
        assert_eq!(ProductKind::HospitalCash.plan_policy(), "hc");
    }

    #[test]
    fn ages_step_fields_exist_in_the_form() {
        let policy = EnquiryPolicy::default();
        for kind in ProductKind::ALL {
            let schema = ProductSchema::for_kind(kind, &policy);
            for name in schema.ages_step_fields {
                assert!(schema.fields.field(name).is_some(), "{kind} lacks {name}");
            }
        }
        let pa = ProductSchema::personal_accident(&policy);
        assert!(pa.ages_step_fields.contains(&"dob"));
    }
}
