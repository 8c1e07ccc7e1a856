use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Party and terms served for one speaker name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpIdentity {
    pub party: Option<String>,
    /// Sorted, without duplicates
    pub terms: Vec<u32>,
}

impl MpIdentity {
    pub fn new(party: Option<String>, terms: impl IntoIterator<Item = u32>) -> Self {
        let terms: BTreeSet<u32> = terms.into_iter().collect();
        Self {
            party: party.filter(|p| !p.trim().is_empty()),
            terms: terms.into_iter().collect(),
        }
    }

    /// Negative result cached after a failed or empty lookup
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn has_party(&self) -> bool {
        self.party.as_deref().is_some_and(|p| !p.trim().is_empty())
    }

    /// Keep our party if set, otherwise take theirs; union the terms.
    pub fn absorb(&mut self, other: &MpIdentity) {
        if !self.has_party() && other.has_party() {
            self.party = other.party.clone();
        }
        let terms: BTreeSet<u32> = self.terms.iter().chain(other.terms.iter()).copied().collect();
        self.terms = terms.into_iter().collect();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeReason {
    DirectNormalization,
    FuzzyMatch,
}

impl fmt::Display for MergeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeReason::DirectNormalization => write!(f, "direct_normalization"),
            MergeReason::FuzzyMatch => write!(f, "fuzzy_match"),
        }
    }
}

/// Audit entry for one name variant folded into a canonical entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeduplicationRecord {
    pub original_name: String,
    pub canonical_name: String,
    pub reason: MergeReason,
    pub original: MpIdentity,
    pub merged: MpIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_and_dedups_terms() {
        let identity = MpIdentity::new(Some("A".to_string()), [19, 17, 19, 18]);
        assert_eq!(identity.terms, vec![17, 18, 19]);
    }

    #[test]
    fn test_blank_party_is_none() {
        let identity = MpIdentity::new(Some("  ".to_string()), []);
        assert_eq!(identity.party, None);
        assert!(!identity.has_party());
    }

    #[test]
    fn test_absorb_prefers_existing_party() {
        let mut identity = MpIdentity::new(Some("A".to_string()), [17]);
        identity.absorb(&MpIdentity::new(Some("B".to_string()), [18]));
        assert_eq!(identity.party.as_deref(), Some("A"));
        assert_eq!(identity.terms, vec![17, 18]);

        let mut empty = MpIdentity::unknown();
        empty.absorb(&identity);
        assert_eq!(empty.party.as_deref(), Some("A"));
    }
}
