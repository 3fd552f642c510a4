use super::participant::{ParticipantId, RosterSnapshot};
use crate::error::{Result, SantaError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Giver to recipient mapping for one exchange.
///
/// Always a permutation of one identifier set with no fixed points. The only
/// ways to obtain one are [`Assignment::from_cycle`] and
/// [`Assignment::from_pairs`], both of which check this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Assignment {
    pairs: BTreeMap<ParticipantId, ParticipantId>,
}

impl Assignment {
    /// Links each identifier to the one after it, wrapping around at the end.
    pub fn from_cycle(order: &[ParticipantId]) -> Result<Self> {
        let n = order.len();
        let pairs = order
            .iter()
            .enumerate()
            .map(|(i, giver)| (giver.clone(), order[(i + 1) % n].clone()))
            .collect();
        Self::from_pairs(pairs)
    }

    pub fn from_pairs(pairs: BTreeMap<ParticipantId, ParticipantId>) -> Result<Self> {
        if pairs.len() < 2 {
            return Err(SantaError::AssignmentInvariantViolated(format!(
                "assignment has {} pair(s), need at least 2",
                pairs.len()
            )));
        }
        if let Some((giver, _)) = pairs.iter().find(|(g, r)| g == r) {
            return Err(SantaError::AssignmentInvariantViolated(format!(
                "{giver} is assigned to themselves"
            )));
        }
        let recipients: BTreeSet<&ParticipantId> = pairs.values().collect();
        if recipients.len() != pairs.len() {
            return Err(SantaError::AssignmentInvariantViolated(
                "a recipient is assigned to more than one giver".to_string(),
            ));
        }
        if let Some(stray) = recipients.iter().find(|r| !pairs.contains_key(**r)) {
            return Err(SantaError::AssignmentInvariantViolated(format!(
                "recipient {stray} is not a giver"
            )));
        }
        Ok(Self { pairs })
    }

    /// Checks that givers and recipients are exactly the roster's identifiers.
    pub fn verify_against(&self, roster: &RosterSnapshot) -> Result<()> {
        if roster.len() != self.pairs.len() {
            return Err(SantaError::AssignmentInvariantViolated(format!(
                "assignment covers {} participants, roster has {}",
                self.pairs.len(),
                roster.len()
            )));
        }
        if let Some(missing) = roster.ids().find(|id| !self.pairs.contains_key(*id)) {
            return Err(SantaError::AssignmentInvariantViolated(format!(
                "participant {missing} has no recipient"
            )));
        }
        Ok(())
    }

    pub fn recipient_of(&self, giver: &ParticipantId) -> Option<&ParticipantId> {
        self.pairs.get(giver)
    }

    pub fn giver_of(&self, recipient: &ParticipantId) -> Option<&ParticipantId> {
        self.pairs
            .iter()
            .find_map(|(g, r)| (r == recipient).then_some(g))
    }

    /// Pairs ordered by giver identifier.
    pub fn pairs(&self) -> impl Iterator<Item = (&ParticipantId, &ParticipantId)> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<'de> Deserialize<'de> for Assignment {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let pairs = BTreeMap::<ParticipantId, ParticipantId>::deserialize(deserializer)?;
        Assignment::from_pairs(pairs).map_err(serde::de::Error::custom)
    }
}
