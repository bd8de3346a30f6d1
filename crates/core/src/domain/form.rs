use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Months, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub static PERSON_NAME: Lazy<Regex> = Lazy::new(|| pattern(r"^[A-Za-z ]+$"));
pub static MOBILE: Lazy<Regex> = Lazy::new(|| pattern(r"^[6-9]\d{9}$"));
pub static PINCODE: Lazy<Regex> = Lazy::new(|| pattern(r"^\d{6}$"));
pub static EMAIL: Lazy<Regex> =
    Lazy::new(|| pattern(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"));
pub static COMPANY_NAME: Lazy<Regex> = Lazy::new(|| pattern(r"^[A-Z0-9 .&()-]+$"));
pub static INDUSTRY: Lazy<Regex> = Lazy::new(|| pattern(r"^[A-Z .&()-]+$"));
pub static UPPER_CITY: Lazy<Regex> = Lazy::new(|| pattern(r"^[A-Z ]+$"));
pub static ISO_DATE: Lazy<Regex> = Lazy::new(|| pattern(r"^\d{4}-\d{2}-\d{2}$"));

static NOT_LETTER: Lazy<Regex> = Lazy::new(|| pattern(r"[^A-Za-z ]"));
static SPACE_RUNS: Lazy<Regex> = Lazy::new(|| pattern(r"\s{2,}"));

fn pattern(source: &str) -> Regex {
    match Regex::new(source) {
        Ok(regex) => regex,
        // Only reachable with a malformed literal above; the unit tests compile every pattern.
        Err(error) => panic!("invalid built-in field pattern `{source}`: {error}"),
    }
}

#[derive(Clone, Debug)]
pub enum FieldRule {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Pattern { name: &'static str, regex: Regex },
    /// ISO date of birth for an adult aged 18..=100, year 1900 or later.
    AdultDateOfBirth,
}

impl FieldRule {
    pub fn pattern(name: &'static str, regex: &Regex) -> Self {
        Self::Pattern { name, regex: regex.clone() }
    }

    fn check(&self, value: &str, today: NaiveDate) -> Option<FieldViolation> {
        match self {
            Self::Required => value.trim().is_empty().then_some(FieldViolation::Required),
            // Length and format rules stay silent on empty values; `Required` owns that case.
            _ if value.is_empty() => None,
            Self::MinLength(min) => {
                (value.chars().count() < *min).then_some(FieldViolation::TooShort { min: *min })
            }
            Self::MaxLength(max) => {
                (value.chars().count() > *max).then_some(FieldViolation::TooLong { max: *max })
            }
            Self::Pattern { name, regex } => {
                (!regex.is_match(value)).then_some(FieldViolation::Format { pattern: name })
            }
            Self::AdultDateOfBirth => check_date_of_birth(value, today).err(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FieldViolation {
    Required,
    TooShort { min: usize },
    TooLong { max: usize },
    Format { pattern: &'static str },
    InvalidDateFormat,
    InvalidDate,
    FutureDate,
    Underage,
    TooOld,
    YearBefore1900,
}

impl FieldViolation {
    pub fn message(&self) -> String {
        match self {
            Self::Required => "This field is required".to_owned(),
            Self::TooShort { min } => format!("Enter at least {min} characters"),
            Self::TooLong { max } => format!("Enter at most {max} characters"),
            Self::Format { pattern } => format!("Enter a valid {pattern}"),
            Self::InvalidDateFormat => "Date must be in YYYY-MM-DD format".to_owned(),
            Self::InvalidDate => "Please enter a valid date".to_owned(),
            Self::FutureDate => "Date of birth cannot be in the future".to_owned(),
            Self::Underage => "You must be at least 18 years old".to_owned(),
            Self::TooOld => "Please enter a valid date of birth".to_owned(),
            Self::YearBefore1900 => "Please enter a year after 1900".to_owned(),
        }
    }
}

/// Display-side normalisation applied before a value is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputTransform {
    #[default]
    None,
    LettersOnly,
    LettersUpper,
    Upper,
    Digits { max_len: usize },
}

impl InputTransform {
    pub fn apply(self, raw: &str) -> String {
        match self {
            Self::None => raw.to_owned(),
            Self::LettersOnly => NOT_LETTER.replace_all(raw, "").into_owned(),
            Self::LettersUpper => {
                let letters = NOT_LETTER.replace_all(raw, "").to_uppercase();
                SPACE_RUNS.replace_all(&letters, " ").into_owned()
            }
            Self::Upper => raw.to_uppercase(),
            Self::Digits { max_len } => {
                raw.chars().filter(char::is_ascii_digit).take(max_len).collect()
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub rules: Vec<FieldRule>,
    pub transform: InputTransform,
    pub initial: &'static str,
}

impl FieldSpec {
    pub fn new(name: &'static str) -> Self {
        Self { name, rules: Vec::new(), transform: InputTransform::None, initial: "" }
    }

    pub fn required(mut self) -> Self {
        self.rules.push(FieldRule::Required);
        self
    }

    pub fn rule(mut self, rule: FieldRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn transform(mut self, transform: InputTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn initial(mut self, initial: &'static str) -> Self {
        self.initial = initial;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("unknown form field `{0}`")]
    UnknownField(String),
}

#[derive(Clone, Debug)]
pub struct ContactForm {
    schema: FieldSchema,
    values: BTreeMap<&'static str, String>,
    touched: BTreeSet<&'static str>,
    submit_attempted: bool,
}

impl ContactForm {
    pub fn new(schema: FieldSchema) -> Self {
        let values = initial_values(&schema);
        Self { schema, values, touched: BTreeSet::new(), submit_attempted: false }
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn values(&self) -> BTreeMap<String, String> {
        self.values.iter().map(|(name, value)| ((*name).to_owned(), value.clone())).collect()
    }

    /// Stores the transformed input. Returns whether the stored value changed.
    pub fn set_value(&mut self, name: &str, raw: &str) -> Result<bool, FormError> {
        let spec = self.spec(name)?;
        let field = spec.name;
        let next = spec.transform.apply(raw);
        let previous = self.values.insert(field, next.clone());
        Ok(previous.as_deref() != Some(next.as_str()))
    }

    pub fn touch(&mut self, name: &str) -> Result<(), FormError> {
        let field = self.spec(name)?.name;
        self.touched.insert(field);
        Ok(())
    }

    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.contains(name)
    }

    pub fn submit_attempted(&self) -> bool {
        self.submit_attempted
    }

    pub fn violations(&self, name: &str) -> Vec<FieldViolation> {
        let today = Utc::now().date_naive();
        let Some(spec) = self.schema.field(name) else {
            return Vec::new();
        };
        let value = self.value(name).unwrap_or_default();
        spec.rules.iter().filter_map(|rule| rule.check(value, today)).collect()
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.violations(name).is_empty()
    }

    /// Errors only show once the field was touched or a submit was attempted.
    pub fn is_invalid(&self, name: &str) -> bool {
        (self.is_touched(name) || self.submit_attempted) && !self.is_valid(name)
    }

    pub fn first_error(&self, name: &str) -> Option<String> {
        if !self.is_invalid(name) {
            return None;
        }
        self.violations(name).first().map(FieldViolation::message)
    }

    pub fn invalid_fields(&self) -> Vec<&'static str> {
        self.schema.names().filter(|name| !self.is_valid(name)).collect()
    }

    /// Marks the submit attempt and every field touched, then lists invalid fields.
    pub fn validate_all(&mut self) -> Result<(), Vec<&'static str>> {
        self.submit_attempted = true;
        self.touched.extend(self.schema.names());
        let invalid = self.invalid_fields();
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(invalid)
        }
    }

    /// Touches `names` and lists the invalid ones, leaving other fields quiet.
    pub fn validate_fields(&mut self, names: &[&str]) -> Result<(), Vec<&'static str>> {
        let fields: Vec<&'static str> =
            self.schema.names().filter(|field| names.contains(field)).collect();
        self.touched.extend(fields.iter().copied());
        let invalid: Vec<_> = fields.into_iter().filter(|name| !self.is_valid(name)).collect();
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(invalid)
        }
    }

    /// Restores stored values verbatim, leaving touched state untouched.
    pub fn patch(&mut self, stored: &BTreeMap<String, String>) {
        for spec in self.schema.fields() {
            if let Some(value) = stored.get(spec.name) {
                self.values.insert(spec.name, value.clone());
            }
        }
    }

    pub fn reset(&mut self) {
        self.values = initial_values(&self.schema);
        self.touched.clear();
        self.submit_attempted = false;
    }

    fn spec(&self, name: &str) -> Result<&FieldSpec, FormError> {
        self.schema.field(name).ok_or_else(|| FormError::UnknownField(name.to_owned()))
    }
}

fn initial_values(schema: &FieldSchema) -> BTreeMap<&'static str, String> {
    schema.fields().iter().map(|spec| (spec.name, spec.initial.to_owned())).collect()
}

pub fn check_date_of_birth(value: &str, today: NaiveDate) -> Result<(), FieldViolation> {
    if !ISO_DATE.is_match(value) {
        return Err(FieldViolation::InvalidDateFormat);
    }
    let dob =
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| FieldViolation::InvalidDate)?;
    if dob > today {
        return Err(FieldViolation::FutureDate);
    }
    if years_before(today, MIN_ADULT_YEARS).is_some_and(|limit| dob > limit) {
        return Err(FieldViolation::Underage);
    }
    if years_before(today, MAX_AGE_YEARS).is_some_and(|limit| dob < limit) {
        return Err(FieldViolation::TooOld);
    }
    if dob.year() < 1900 {
        return Err(FieldViolation::YearBefore1900);
    }
    Ok(())
}

const MIN_ADULT_YEARS: u32 = 18;
const MAX_AGE_YEARS: u32 = 100;

/// Same calendar day `years` back; 29 February falls back to the 28th.
fn years_before(today: NaiveDate, years: u32) -> Option<NaiveDate> {
    today.checked_sub_months(Months::new(years * 12))
}

/// Completed years between `dob` and `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

#[cfg(test)]
mod tests {
    use chrono::{Months, NaiveDate, Utc};

    use super::{
        age_on, check_date_of_birth, ContactForm, FieldRule, FieldSchema, FieldSpec,
        FieldViolation, FormError, InputTransform, COMPANY_NAME, EMAIL, INDUSTRY, ISO_DATE,
        MOBILE, PERSON_NAME, PINCODE, UPPER_CITY,
    };

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldSpec::new("firstName")
                .required()
                .rule(FieldRule::MaxLength(20))
                .rule(FieldRule::pattern("name", &PERSON_NAME))
                .transform(InputTransform::LettersOnly),
            FieldSpec::new("mobile")
                .required()
                .rule(FieldRule::pattern("mobile number", &MOBILE))
                .transform(InputTransform::Digits { max_len: 10 }),
            FieldSpec::new("pincode").required().rule(FieldRule::pattern("pincode", &PINCODE)),
        ])
    }

    #[test]
    fn built_in_patterns_compile_and_match_examples() {
        assert!(PERSON_NAME.is_match("Asha Rao"));
        assert!(MOBILE.is_match("9123456789"));
        assert!(!MOBILE.is_match("5123456789"));
        assert!(PINCODE.is_match("411001"));
        assert!(EMAIL.is_match("hr@acme.co.in"));
        assert!(COMPANY_NAME.is_match("ACME (INDIA) PVT. LTD."));
        assert!(INDUSTRY.is_match("IT & SERVICES"));
        assert!(UPPER_CITY.is_match("PUNE"));
        assert!(ISO_DATE.is_match("1990-04-01"));
    }

    #[test]
    fn fresh_form_reports_no_invalid_fields_until_touched() {
        let form = ContactForm::new(schema());
        for name in ["firstName", "mobile", "pincode"] {
            assert!(!form.is_invalid(name), "{name} should not flash an error");
            assert!(!form.is_valid(name), "{name} is still required");
        }
    }

    #[test]
    fn touching_activates_error_state() {
        let mut form = ContactForm::new(schema());
        form.touch("mobile").expect("known field");
        assert!(form.is_invalid("mobile"));
        assert!(!form.is_invalid("pincode"));
        assert_eq!(form.first_error("mobile").as_deref(), Some("This field is required"));
    }

    #[test]
    fn submit_attempt_activates_every_field() {
        let mut form = ContactForm::new(schema());
        form.set_value("firstName", "Asha").expect("known field");
        let invalid = form.validate_all().expect_err("mobile and pincode missing");

        assert_eq!(invalid, vec!["mobile", "pincode"]);
        assert!(form.is_invalid("pincode"));
        assert!(!form.is_invalid("firstName"));
    }

    #[test]
    fn partial_validation_only_wakes_the_named_fields() {
        let mut form = ContactForm::new(schema());
        form.set_value("firstName", "Asha").expect("known field");
        assert_eq!(form.validate_fields(&["firstName", "mobile"]), Err(vec!["mobile"]));

        assert!(form.is_invalid("mobile"));
        assert!(!form.is_invalid("pincode"));
        assert!(!form.submit_attempted());
    }

    #[test]
    fn transforms_run_before_validation() {
        let mut form = ContactForm::new(schema());
        form.set_value("firstName", "As4ha!").expect("known field");
        form.set_value("mobile", "+91 98765-43210 ext").expect("known field");

        assert_eq!(form.value("firstName"), Some("Asha"));
        assert_eq!(form.value("mobile"), Some("9198765432"));
        assert!(form.is_valid("mobile"));
    }

    #[test]
    fn set_value_reports_changes() {
        let mut form = ContactForm::new(schema());
        assert_eq!(form.set_value("mobile", "9123456789"), Ok(true));
        assert_eq!(form.set_value("mobile", "9123456789"), Ok(false));
        assert_eq!(
            form.set_value("email", "x@y.z"),
            Err(FormError::UnknownField("email".to_owned()))
        );
    }

    #[test]
    fn letters_upper_collapses_spaces() {
        assert_eq!(InputTransform::LettersUpper.apply("ravi  kumar9"), "RAVI KUMAR");
        assert_eq!(InputTransform::Upper.apply("acme & co"), "ACME & CO");
    }

    #[test]
    fn reset_clears_values_and_touch_state() {
        let mut form = ContactForm::new(schema());
        form.set_value("pincode", "411001").expect("known field");
        let _ = form.validate_all();
        form.reset();

        assert_eq!(form.value("pincode"), Some(""));
        assert!(!form.submit_attempted());
        assert!(!form.is_invalid("pincode"));
    }

    #[test]
    fn date_of_birth_rules() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date");
        assert_eq!(check_date_of_birth("19-10-1990", today), Err(FieldViolation::InvalidDateFormat));
        assert_eq!(check_date_of_birth("1990-02-30", today), Err(FieldViolation::InvalidDate));
        assert_eq!(check_date_of_birth("2027-01-01", today), Err(FieldViolation::FutureDate));
        assert_eq!(check_date_of_birth("2008-10-20", today), Err(FieldViolation::Underage));
        assert_eq!(check_date_of_birth("2008-10-19", today), Ok(()));
        assert_eq!(check_date_of_birth("1920-01-01", today), Err(FieldViolation::TooOld));
        assert_eq!(check_date_of_birth("1899-12-31", today), Err(FieldViolation::TooOld));
    }

    #[test]
    fn too_old_is_measured_to_the_day() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).expect("valid date");
        assert_eq!(check_date_of_birth("1926-10-19", today), Ok(()));
        assert_eq!(check_date_of_birth("1926-10-18", today), Err(FieldViolation::TooOld));
        assert_eq!(check_date_of_birth("1926-10-02", today), Err(FieldViolation::TooOld));
    }

    #[test]
    fn year_floor_applies_after_the_age_window() {
        let today = NaiveDate::from_ymd_opt(1995, 1, 1).expect("valid date");
        assert_eq!(check_date_of_birth("1899-06-01", today), Err(FieldViolation::YearBefore1900));
        assert_eq!(check_date_of_birth("1894-12-31", today), Err(FieldViolation::TooOld));
    }

    #[test]
    fn age_on_counts_completed_years() {
        let dob = NaiveDate::from_ymd_opt(1990, 6, 15).expect("valid date");
        let before = NaiveDate::from_ymd_opt(2026, 6, 14).expect("valid date");
        let on = NaiveDate::from_ymd_opt(2026, 6, 15).expect("valid date");
        assert_eq!(age_on(dob, before), 35);
        assert_eq!(age_on(dob, on), 36);
    }

    #[test]
    fn date_of_birth_field_uses_today() {
        let schema = FieldSchema::new(vec![FieldSpec::new("dateOfBirth")
            .required()
            .rule(FieldRule::AdultDateOfBirth)]);
        let mut form = ContactForm::new(schema);
        let thirty_years_ago = Utc::now().date_naive() - Months::new(12 * 30);
        form.set_value("dateOfBirth", &thirty_years_ago.format("%Y-%m-%d").to_string())
            .expect("known field");
        assert!(form.is_valid("dateOfBirth"));
    }
}
