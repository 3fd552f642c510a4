use crate::domain::assignment::Assignment;
use crate::domain::dispatch::DispatchReport;
use crate::domain::participant::{Participant, RosterSnapshot};
use crate::domain::ports::{AssignmentStore, RosterStore};
use crate::error::{Result, SantaError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory participant roster.
///
/// Uses `Arc<RwLock<Vec<Participant>>>` so clones share the same roster and
/// insertion order is preserved.
#[derive(Default, Clone)]
pub struct InMemoryRosterStore {
    participants: Arc<RwLock<Vec<Participant>>>,
}

impl InMemoryRosterStore {
    /// Creates a new, empty in-memory roster.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RosterStore for InMemoryRosterStore {
    async fn create(&self, participant: Participant) -> Result<()> {
        let mut participants = self.participants.write().await;
        if let Some(existing) = participants.iter().find(|p| p.conflicts_with(&participant)) {
            return Err(SantaError::DuplicateParticipant(existing.id.clone()));
        }
        participants.push(participant);
        Ok(())
    }

    async fn list(&self) -> Result<RosterSnapshot> {
        let participants = self.participants.read().await;
        RosterSnapshot::new(participants.clone())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.participants.read().await.len())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut participants = self.participants.write().await;
        let removed = participants.len();
        participants.clear();
        Ok(removed)
    }
}

#[derive(Default)]
struct Saved {
    assignment: Option<Assignment>,
    report: Option<DispatchReport>,
}

/// A thread-safe in-memory home for the current assignment and its report.
///
/// Replacing the whole value under one write lock makes each save atomic
/// for readers.
#[derive(Default, Clone)]
pub struct InMemoryAssignmentStore {
    saved: Arc<RwLock<Saved>>,
}

impl InMemoryAssignmentStore {
    /// Creates a new, empty in-memory assignment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
    async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        self.saved.write().await.assignment = Some(assignment.clone());
        Ok(())
    }

    async fn load_assignment(&self) -> Result<Option<Assignment>> {
        Ok(self.saved.read().await.assignment.clone())
    }

    async fn save_report(&self, report: &DispatchReport) -> Result<()> {
        self.saved.write().await.report = Some(report.clone());
        Ok(())
    }

    async fn load_report(&self) -> Result<Option<DispatchReport>> {
        Ok(self.saved.read().await.report.clone())
    }

    async fn clear(&self) -> Result<()> {
        *self.saved.write().await = Saved::default();
        Ok(())
    }
}
