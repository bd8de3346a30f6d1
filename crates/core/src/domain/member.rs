use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_MAX_DEPENDENTS: u8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKey {
    You,
    Spouse,
    Son,
    Daughter,
}

impl MemberKey {
    pub const ALL: [MemberKey; 4] =
        [MemberKey::You, MemberKey::Spouse, MemberKey::Son, MemberKey::Daughter];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::You => "you",
            Self::Spouse => "spouse",
            Self::Son => "son",
            Self::Daughter => "daughter",
        }
    }

    pub fn is_child(self) -> bool {
        matches!(self, Self::Son | Self::Daughter)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "you" | "self" => Some(Self::You),
            "spouse" => Some(Self::Spouse),
            "son" => Some(Self::Son),
            "daughter" => Some(Self::Daughter),
            _ => None,
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }

    /// Anything other than an explicit `Female` restores as `Male`.
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw {
            Some("Female") => Self::Female,
            _ => Self::Male,
        }
    }
}

/// Flat identifier of one concrete household member (`you`, `spouse`, `son2`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn you() -> Self {
        Self(MemberKey::You.as_str().to_owned())
    }

    pub fn spouse() -> Self {
        Self(MemberKey::Spouse.as_str().to_owned())
    }

    pub fn child(key: MemberKey, ordinal: u8) -> Self {
        Self(format!("{}{ordinal}", key.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Category and 1-based ordinal for child ids; `you`/`spouse` have no ordinal.
    pub fn parts(&self) -> Option<(MemberKey, Option<u8>)> {
        match self.0.as_str() {
            "you" => return Some((MemberKey::You, None)),
            "spouse" => return Some((MemberKey::Spouse, None)),
            _ => {}
        }
        for key in [MemberKey::Son, MemberKey::Daughter] {
            if let Some(rest) = self.0.strip_prefix(key.as_str()) {
                return rest.parse::<u8>().ok().filter(|n| *n > 0).map(|n| (key, Some(n)));
            }
        }
        None
    }

    pub fn is_child(&self) -> bool {
        self.parts().map(|(key, _)| key.is_child()).unwrap_or(false)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub key: MemberKey,
    pub selected: bool,
    pub count: u8,
}

/// Which household members a product offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberSchema {
    pub allow_spouse: bool,
    pub allow_children: bool,
    pub max_dependents: u8,
}

impl MemberSchema {
    pub fn family(max_dependents: u8) -> Self {
        Self { allow_spouse: true, allow_children: true, max_dependents }
    }

    pub fn self_only() -> Self {
        Self { allow_spouse: false, allow_children: false, max_dependents: 0 }
    }

    fn offers(&self, key: MemberKey) -> bool {
        match key {
            MemberKey::You => true,
            MemberKey::Spouse => self.allow_spouse,
            MemberKey::Son | MemberKey::Daughter => self.allow_children,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MemberError {
    #[error("`you` is always covered and cannot be removed")]
    SelfNotRemovable,
    #[error("`{0}` is not offered by this product")]
    NotOffered(MemberKey),
    #[error("`{0}` has no counter; only son and daughter can be incremented")]
    NotCountable(MemberKey),
    #[error("you can select up to {max} children in total")]
    DependentCapReached { max: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberSelection {
    schema: MemberSchema,
    members: [Member; 4],
    last_added: Option<MemberKey>,
}

impl MemberSelection {
    pub fn new(schema: MemberSchema) -> Self {
        Self { schema, members: default_members(), last_added: None }
    }

    pub fn schema(&self) -> MemberSchema {
        self.schema
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, key: MemberKey) -> Member {
        self.members[index_of(key)]
    }

    pub fn count(&self, key: MemberKey) -> u8 {
        self.member(key).count
    }

    pub fn is_selected(&self, key: MemberKey) -> bool {
        match key {
            MemberKey::You => true,
            MemberKey::Spouse => self.member(key).selected,
            MemberKey::Son | MemberKey::Daughter => self.member(key).count > 0,
        }
    }

    pub fn total_children(&self) -> u8 {
        self.count(MemberKey::Son) + self.count(MemberKey::Daughter)
    }

    pub fn can_increment(&self) -> bool {
        self.schema.allow_children && self.total_children() < self.schema.max_dependents
    }

    pub fn reset(&mut self) {
        self.members = default_members();
        self.last_added = None;
    }

    pub fn toggle(&mut self, key: MemberKey) -> Result<(), MemberError> {
        if key == MemberKey::You {
            return Err(MemberError::SelfNotRemovable);
        }
        self.ensure_offered(key)?;

        let member = &mut self.members[index_of(key)];
        member.selected = !member.selected;
        if key.is_child() {
            if member.selected && member.count == 0 {
                member.count = 1;
            }
            if !member.selected {
                member.count = 0;
            }
            if member.selected {
                self.last_added = Some(key);
            }
        } else {
            member.count = u8::from(member.selected);
        }

        self.normalize();
        Ok(())
    }

    pub fn increment(&mut self, key: MemberKey) -> Result<(), MemberError> {
        if !key.is_child() {
            return Err(MemberError::NotCountable(key));
        }
        self.ensure_offered(key)?;
        if self.total_children() >= self.schema.max_dependents {
            return Err(MemberError::DependentCapReached { max: self.schema.max_dependents });
        }

        let member = &mut self.members[index_of(key)];
        member.count += 1;
        member.selected = true;
        self.last_added = Some(key);
        self.normalize();
        Ok(())
    }

    pub fn decrement(&mut self, key: MemberKey) -> Result<(), MemberError> {
        if !key.is_child() {
            return Err(MemberError::NotCountable(key));
        }
        self.ensure_offered(key)?;

        let member = &mut self.members[index_of(key)];
        if member.count > 0 {
            member.count -= 1;
            if member.count == 0 {
                member.selected = false;
            }
        }
        Ok(())
    }

    /// Rebuilds the selection from a stored household shape, clamped to the cap.
    pub fn restore(&mut self, spouse: bool, sons: u8, daughters: u8) {
        self.reset();
        if self.schema.allow_spouse {
            let member = &mut self.members[index_of(MemberKey::Spouse)];
            member.selected = spouse;
            member.count = u8::from(spouse);
        }
        if self.schema.allow_children {
            self.members[index_of(MemberKey::Son)].count = sons;
            self.members[index_of(MemberKey::Daughter)].count = daughters;
            self.last_added = Some(MemberKey::Daughter);
        }
        self.normalize();
    }

    /// `[you, spouse?, son1..sonN, daughter1..daughterM]`
    pub fn flatten(&self) -> Vec<MemberId> {
        let mut ids = vec![MemberId::you()];
        if self.is_selected(MemberKey::Spouse) {
            ids.push(MemberId::spouse());
        }
        for key in [MemberKey::Son, MemberKey::Daughter] {
            for ordinal in 1..=self.count(key) {
                ids.push(MemberId::child(key, ordinal));
            }
        }
        ids
    }

    fn ensure_offered(&self, key: MemberKey) -> Result<(), MemberError> {
        if self.schema.offers(key) {
            Ok(())
        } else {
            Err(MemberError::NotOffered(key))
        }
    }

    // Trims the most recently added child category first until the cap holds.
    fn normalize(&mut self) {
        let max = self.schema.max_dependents;
        let first = self.last_added.filter(|key| key.is_child()).unwrap_or(MemberKey::Daughter);
        let second = if first == MemberKey::Son { MemberKey::Daughter } else { MemberKey::Son };

        while self.total_children() > max {
            if self.members[index_of(first)].count > 0 {
                self.members[index_of(first)].count -= 1;
            } else if self.members[index_of(second)].count > 0 {
                self.members[index_of(second)].count -= 1;
            }
        }

        for key in [MemberKey::Son, MemberKey::Daughter] {
            let member = &mut self.members[index_of(key)];
            member.selected = member.count > 0;
        }
    }
}

fn index_of(key: MemberKey) -> usize {
    match key {
        MemberKey::You => 0,
        MemberKey::Spouse => 1,
        MemberKey::Son => 2,
        MemberKey::Daughter => 3,
    }
}

fn default_members() -> [Member; 4] {
    [
        Member { key: MemberKey::You, selected: true, count: 1 },
        Member { key: MemberKey::Spouse, selected: false, count: 0 },
        Member { key: MemberKey::Son, selected: false, count: 0 },
        Member { key: MemberKey::Daughter, selected: false, count: 0 },
    ]
}

#[cfg(test)]
mod tests {
    use super::{
        Gender, MemberError, MemberId, MemberKey, MemberSchema, MemberSelection,
        DEFAULT_MAX_DEPENDENTS,
    };

    fn family() -> MemberSelection {
        MemberSelection::new(MemberSchema::family(DEFAULT_MAX_DEPENDENTS))
    }

    fn ids(selection: &MemberSelection) -> Vec<String> {
        selection.flatten().into_iter().map(|id| id.0).collect()
    }

    #[test]
    fn fresh_selection_covers_only_you() {
        let selection = family();
        assert_eq!(ids(&selection), vec!["you"]);
        assert!(selection.is_selected(MemberKey::You));
        assert_eq!(selection.total_children(), 0);
    }

    #[test]
    fn you_cannot_be_toggled_off() {
        let mut selection = family();
        assert_eq!(selection.toggle(MemberKey::You), Err(MemberError::SelfNotRemovable));
        assert_eq!(ids(&selection), vec!["you"]);
    }

    #[test]
    fn flatten_orders_spouse_then_sons_then_daughters() {
        let mut selection = family();
        selection.toggle(MemberKey::Daughter).expect("daughter on");
        selection.toggle(MemberKey::Spouse).expect("spouse on");
        selection.increment(MemberKey::Son).expect("son 1");
        selection.increment(MemberKey::Son).expect("son 2");

        assert_eq!(ids(&selection), vec!["you", "spouse", "son1", "son2", "daughter1"]);
    }

    #[test]
    fn toggling_child_off_clears_its_count() {
        let mut selection = family();
        selection.increment(MemberKey::Son).expect("son 1");
        selection.increment(MemberKey::Son).expect("son 2");
        selection.toggle(MemberKey::Son).expect("son off");

        assert_eq!(selection.count(MemberKey::Son), 0);
        assert!(!selection.member(MemberKey::Son).selected);
    }

    #[test]
    fn increment_is_refused_at_the_cap() {
        let mut selection = family();
        for _ in 0..3 {
            selection.increment(MemberKey::Son).expect("sons");
        }
        selection.increment(MemberKey::Daughter).expect("daughter");

        assert_eq!(
            selection.increment(MemberKey::Daughter),
            Err(MemberError::DependentCapReached { max: 4 })
        );
        assert!(!selection.can_increment());
        assert_eq!(selection.total_children(), 4);
    }

    #[test]
    fn toggle_at_the_cap_is_trimmed_from_the_newest_category() {
        let mut selection = family();
        for _ in 0..4 {
            selection.increment(MemberKey::Son).expect("sons");
        }
        selection.toggle(MemberKey::Daughter).expect("toggle is accepted");

        assert_eq!(selection.count(MemberKey::Daughter), 0);
        assert!(!selection.member(MemberKey::Daughter).selected);
        assert_eq!(selection.count(MemberKey::Son), 4);
    }

    #[test]
    fn decrement_to_zero_deselects() {
        let mut selection = family();
        selection.increment(MemberKey::Daughter).expect("daughter");
        selection.decrement(MemberKey::Daughter).expect("daughter removed");
        selection.decrement(MemberKey::Daughter).expect("no-op at zero");

        assert_eq!(selection.count(MemberKey::Daughter), 0);
        assert!(!selection.member(MemberKey::Daughter).selected);
    }

    #[test]
    fn cap_holds_for_any_operation_sequence() {
        let mut selection = family();
        let keys = [MemberKey::Spouse, MemberKey::Son, MemberKey::Daughter];
        // Deterministic pseudo-random walk over every mutation.
        let mut seed: u32 = 0x2545_f491;
        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let key = keys[(seed % 3) as usize];
            let _ = match (seed >> 8) % 3 {
                0 => selection.toggle(key),
                1 => selection.increment(key),
                _ => selection.decrement(key),
            };
            assert!(selection.total_children() <= DEFAULT_MAX_DEPENDENTS);
            assert!(selection.is_selected(MemberKey::You));
        }
    }

    #[test]
    fn self_only_schema_rejects_dependents() {
        let mut selection = MemberSelection::new(MemberSchema::self_only());
        assert_eq!(
            selection.toggle(MemberKey::Spouse),
            Err(MemberError::NotOffered(MemberKey::Spouse))
        );
        assert_eq!(
            selection.increment(MemberKey::Son),
            Err(MemberError::NotOffered(MemberKey::Son))
        );
        assert_eq!(ids(&selection), vec!["you"]);
    }

    #[test]
    fn restore_clamps_to_the_cap() {
        let mut selection = family();
        selection.restore(true, 3, 3);

        assert_eq!(selection.total_children(), 4);
        assert!(selection.is_selected(MemberKey::Spouse));
        assert_eq!(selection.count(MemberKey::Son), 3);
        assert_eq!(selection.count(MemberKey::Daughter), 1);
    }

    #[test]
    fn member_id_parts_parse_child_ordinals() {
        assert_eq!(MemberId("son2".into()).parts(), Some((MemberKey::Son, Some(2))));
        assert_eq!(MemberId("daughter1".into()).parts(), Some((MemberKey::Daughter, Some(1))));
        assert_eq!(MemberId("you".into()).parts(), Some((MemberKey::You, None)));
        assert_eq!(MemberId("son0".into()).parts(), None);
        assert_eq!(MemberId("uncle".into()).parts(), None);
    }

    #[test]
    fn gender_restores_male_unless_explicitly_female() {
        assert_eq!(Gender::from_stored(Some("Female")), Gender::Female);
        assert_eq!(Gender::from_stored(Some("female")), Gender::Male);
        assert_eq!(Gender::from_stored(None), Gender::Male);
    }
}
