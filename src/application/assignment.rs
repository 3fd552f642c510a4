use crate::domain::assignment::Assignment;
use crate::domain::participant::{ParticipantId, RosterSnapshot};
use crate::error::{Result, SantaError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, error};

/// Smallest roster for which a no-self-assignment permutation exists.
pub const MIN_ROSTER_SIZE: usize = 2;

/// Computes randomized giver/recipient pairings.
///
/// The roster is shuffled (Fisher-Yates via `SliceRandom::shuffle`) and read
/// as a single cycle: position `i` gives to position `(i + 1) % n`. A single
/// cycle over two or more people is always a bijection without fixed points,
/// so no rejection sampling is needed.
///
/// Generic over the random source so tests can pin the outcome with a seeded
/// generator.
pub struct AssignmentEngine<R = StdRng> {
    rng: R,
}

impl AssignmentEngine<StdRng> {
    /// Creates an engine seeded from the operating system's entropy source.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for AssignmentEngine<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> AssignmentEngine<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn compute_assignment(&mut self, roster: &RosterSnapshot) -> Result<Assignment> {
        if roster.len() < MIN_ROSTER_SIZE {
            return Err(SantaError::InsufficientParticipants {
                required: MIN_ROSTER_SIZE,
                actual: roster.len(),
            });
        }

        let mut order: Vec<ParticipantId> = roster.ids().cloned().collect();
        order.shuffle(&mut self.rng);

        let assignment = Assignment::from_cycle(&order)
            .and_then(|assignment| assignment.verify_against(roster).map(|_| assignment));

        match assignment {
            Ok(assignment) => {
                debug!(participants = roster.len(), "assignment computed");
                Ok(assignment)
            }
            Err(e) => {
                error!(error = %e, participants = roster.len(), "computed assignment failed verification");
                Err(e)
            }
        }
    }
}
