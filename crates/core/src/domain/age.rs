use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::member::MemberId;

pub const INFANT_LABEL: &str = "91 Days";

/// Selectable ages for one product.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgeBands {
    pub adult_min: u8,
    pub adult_max: u8,
    pub child_min: u8,
    pub child_max: u8,
    /// Stored value for the infant option; products disagree (`"91 Days"` vs `"0.4"`).
    pub infant_value: String,
}

impl Default for AgeBands {
    fn default() -> Self {
        Self {
            adult_min: 18,
            adult_max: 100,
            child_min: 1,
            child_max: 25,
            infant_value: INFANT_LABEL.to_owned(),
        }
    }
}

impl AgeBands {
    pub fn with_infant_value(mut self, value: impl Into<String>) -> Self {
        self.infant_value = value.into();
        self
    }

    pub fn options_for(&self, id: &MemberId) -> Vec<AgeChoice> {
        if id.is_child() {
            let mut options = vec![AgeChoice {
                value: self.infant_value.clone(),
                label: INFANT_LABEL.to_owned(),
            }];
            options.extend((self.child_min..=self.child_max).map(AgeChoice::years));
            options
        } else {
            (self.adult_min..=self.adult_max).map(AgeChoice::years).collect()
        }
    }

    pub fn accepts(&self, id: &MemberId, value: &str) -> bool {
        let value = value.trim();
        if id.is_child() && value == self.infant_value {
            return true;
        }
        let Ok(years) = value.parse::<u8>() else {
            return false;
        };
        if id.is_child() {
            (self.child_min..=self.child_max).contains(&years)
        } else {
            (self.adult_min..=self.adult_max).contains(&years)
        }
    }

    pub fn label_for(&self, value: &str) -> String {
        if value.is_empty() {
            "Select Age".to_owned()
        } else if value == self.infant_value {
            INFANT_LABEL.to_owned()
        } else {
            format!("{value} Years")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeChoice {
    pub value: String,
    pub label: String,
}

impl AgeChoice {
    fn years(years: u8) -> Self {
        Self { value: years.to_string(), label: format!("{years} Years") }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgeError {
    #[error("`{0}` is not a selected member")]
    UnknownMember(MemberId),
    #[error("`{value}` is not an offered age for `{id}`")]
    OptionNotOffered { id: MemberId, value: String },
}

/// Age per flat member id. Its key set always mirrors the member selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgeMap {
    entries: BTreeMap<MemberId, String>,
}

impl AgeMap {
    pub fn reconcile(&mut self, ids: &[MemberId]) {
        let mut next = BTreeMap::new();
        for id in ids {
            let value = self.entries.remove(id).unwrap_or_default();
            next.insert(id.clone(), value);
        }
        self.entries = next;
    }

    pub fn set_age(
        &mut self,
        bands: &AgeBands,
        id: &MemberId,
        value: &str,
    ) -> Result<(), AgeError> {
        let Some(slot) = self.entries.get_mut(id) else {
            return Err(AgeError::UnknownMember(id.clone()));
        };
        if !value.is_empty() && !bands.accepts(id, value) {
            return Err(AgeError::OptionNotOffered { id: id.clone(), value: value.to_owned() });
        }
        *slot = value.trim().to_owned();
        Ok(())
    }

    pub fn get(&self, id: &MemberId) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &MemberId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids from `ids` that have no age yet, in the given order.
    pub fn missing(&self, ids: &[MemberId]) -> Vec<MemberId> {
        ids.iter()
            .filter(|id| self.get(id).map(str::is_empty).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Loads stored values without option checks; ids outside `ids` are dropped.
    pub fn restore(&mut self, ids: &[MemberId], stored: &BTreeMap<MemberId, String>) {
        self.entries = ids
            .iter()
            .map(|id| (id.clone(), stored.get(id).cloned().unwrap_or_default()))
            .collect();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
