//! Links chat directory accounts to roster people by edit distance.
//!
//! Each person is scored against the account three ways (display name vs full
//! name, real name vs full name, and first/last names pairwise) and keeps the
//! lowest score. The lowest-scoring person overall wins; ties keep the earliest
//! person in input order, so callers should pass people sorted by id.

use crate::types::{DirectoryAccount, RosterPerson};

/// Distances strictly below this value produce a link.
pub const LINK_ACCEPTANCE_THRESHOLD: u32 = 7;

/// Best roster candidate for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityMatch {
    pub person_id: u64,
    pub distance: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDecision {
    Linked(IdentityMatch),
    /// `best` is `None` only when the roster was empty.
    Unlinked { best: Option<IdentityMatch> },
}

impl LinkDecision {
    pub fn linked_person_id(&self) -> Option<u64> {
        match self {
            Self::Linked(matched) => Some(matched.person_id),
            Self::Unlinked { .. } => None,
        }
    }

    pub fn distance(&self) -> Option<u32> {
        match self {
            Self::Linked(matched) => Some(matched.distance),
            Self::Unlinked { best } => best.map(|matched| matched.distance),
        }
    }
}

fn levenshtein(left: &str, right: &str) -> u32 {
    u32::try_from(strsim::levenshtein(left, right)).unwrap_or(u32::MAX)
}

/// Score of `person` for `account`: the minimum of the three name comparisons.
pub fn name_distance(account: &DirectoryAccount, person: &RosterPerson) -> u32 {
    let full_name = person.full_name();
    let by_display_name = levenshtein(&account.display_name, &full_name);
    let by_real_name = levenshtein(&account.real_name, &full_name);
    let by_split_name = levenshtein(&account.first_name, &person.first_name)
        .saturating_add(levenshtein(&account.last_name, &person.last_name));
    by_display_name.min(by_real_name).min(by_split_name)
}

/// Returns the lowest-scoring person, or `None` for an empty roster.
pub fn best_match(account: &DirectoryAccount, people: &[RosterPerson]) -> Option<IdentityMatch> {
    let mut best: Option<IdentityMatch> = None;
    for person in people {
        let distance = name_distance(account, person);
        if best.map_or(true, |current| distance < current.distance) {
            best = Some(IdentityMatch {
                person_id: person.id,
                distance,
            });
        }
    }
    best
}

#[derive(Debug, Clone, Copy)]
pub struct IdentityMatcher {
    threshold: u32,
}

impl Default for IdentityMatcher {
    fn default() -> Self {
        Self::new(LINK_ACCEPTANCE_THRESHOLD)
    }
}

impl IdentityMatcher {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn decide(&self, account: &DirectoryAccount, people: &[RosterPerson]) -> LinkDecision {
        match best_match(account, people) {
            Some(matched) if matched.distance < self.threshold => LinkDecision::Linked(matched),
            best => LinkDecision::Unlinked { best },
        }
    }

    /// Recomputes the link on `account`, clearing any previous link that no
    /// longer clears the threshold.
    pub fn link(&self, account: &mut DirectoryAccount, people: &[RosterPerson]) -> LinkDecision {
        let decision = self.decide(account, people);
        account.linked_roster_id = decision.linked_person_id();
        account.match_distance = decision.distance();
        decision
    }
}
