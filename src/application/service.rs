use super::assignment::AssignmentEngine;
use super::dispatcher::{CancelToken, DispatchRequest, NotificationDispatcher};
use crate::config::Settings;
use crate::domain::assignment::Assignment;
use crate::domain::dispatch::DispatchReport;
use crate::domain::participant::{
    LanguageCode, Participant, ParticipantId, RosterSnapshot, is_valid_email, is_valid_name,
};
use crate::domain::ports::{AssignmentStoreBox, RosterStoreBox};
use crate::error::{Result, SantaError};
use rand::Rng;
use rand::rngs::StdRng;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

/// Orchestrates roster management, the draw and notification delivery.
///
/// A draw runs in two phases connected only by the immutable [`Assignment`]:
/// compute and persist first, then dispatch. A delivery problem can therefore
/// never change or half-write the stored pairing, and a resend reuses it
/// as is.
pub struct SecretSantaService<R = StdRng> {
    roster: RosterStoreBox,
    assignments: AssignmentStoreBox,
    engine: Mutex<AssignmentEngine<R>>,
    dispatcher: NotificationDispatcher,
    min_participants: usize,
    default_language: LanguageCode,
}

impl SecretSantaService<StdRng> {
    pub fn new(
        roster: RosterStoreBox,
        assignments: AssignmentStoreBox,
        dispatcher: NotificationDispatcher,
        settings: &Settings,
    ) -> Self {
        Self::with_engine(
            roster,
            assignments,
            dispatcher,
            AssignmentEngine::new(),
            settings,
        )
    }
}

impl<R: Rng> SecretSantaService<R> {
    pub fn with_engine(
        roster: RosterStoreBox,
        assignments: AssignmentStoreBox,
        dispatcher: NotificationDispatcher,
        engine: AssignmentEngine<R>,
        settings: &Settings,
    ) -> Self {
        Self {
            roster,
            assignments,
            engine: Mutex::new(engine),
            dispatcher,
            min_participants: settings.min_participants,
            default_language: settings.default_language.clone(),
        }
    }

    /// Validates and stores a new participant.
    ///
    /// Names must be 3 to 50 letters or spaces and emails must look like
    /// addresses. The store rejects an email that is already registered.
    pub async fn add_participant(
        &self,
        name: &str,
        email: &str,
        language: Option<&str>,
    ) -> Result<Participant> {
        let name = name.trim();
        let email = email.trim();
        if !is_valid_name(name) {
            return Err(SantaError::Validation(
                "invalid name: only letters and spaces are allowed, 3 to 50 characters"
                    .to_string(),
            ));
        }
        if !is_valid_email(email) {
            return Err(SantaError::Validation(format!("invalid email `{email}`")));
        }

        let language = language
            .map(LanguageCode::new)
            .filter(|code| !code.as_str().is_empty())
            .unwrap_or_else(|| self.default_language.clone());
        let participant = Participant {
            id: ParticipantId::generate(),
            name: name.to_string(),
            email: email.to_string(),
            language,
        };
        self.roster.create(participant.clone()).await?;
        info!(id = %participant.id, "participant added");
        Ok(participant)
    }

    pub async fn list_participants(&self) -> Result<RosterSnapshot> {
        self.roster.list().await
    }

    pub async fn count(&self) -> Result<usize> {
        self.roster.count().await
    }

    /// Removes every participant together with the stored assignment and
    /// report, which would no longer match the roster.
    pub async fn clear(&self) -> Result<usize> {
        let removed = self.roster.delete_all().await?;
        self.assignments.clear().await?;
        info!(removed, "roster cleared");
        Ok(removed)
    }

    pub async fn current_assignment(&self) -> Result<Option<Assignment>> {
        self.assignments.load_assignment().await
    }

    pub async fn last_report(&self) -> Result<Option<DispatchReport>> {
        self.assignments.load_report().await
    }

    /// Computes a fresh assignment, persists it, then notifies every giver.
    pub async fn draw(
        &self,
        request: &DispatchRequest,
        cancel: &CancelToken,
    ) -> Result<(Assignment, DispatchReport)> {
        let roster = self.roster.list().await?;
        if roster.len() < self.min_participants {
            return Err(SantaError::InsufficientParticipants {
                required: self.min_participants,
                actual: roster.len(),
            });
        }

        let assignment = self
            .engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .compute_assignment(&roster)?;

        self.assignments.save_assignment(&assignment).await?;
        self.assignments.save_report(&DispatchReport::new()).await?;
        info!(participants = roster.len(), "assignment persisted");

        let report = self
            .dispatcher
            .dispatch(&assignment, &roster, request, cancel)
            .await?;
        self.assignments.save_report(&report).await?;
        Ok((assignment, report))
    }

    /// Re-sends every notification of the stored assignment that has not been
    /// delivered yet and returns the merged report.
    pub async fn resend(
        &self,
        request: &DispatchRequest,
        cancel: &CancelToken,
    ) -> Result<DispatchReport> {
        let assignment = self
            .assignments
            .load_assignment()
            .await?
            .ok_or_else(|| SantaError::NotFound("no assignment has been drawn".to_string()))?;
        let roster = self.roster.list().await?;
        let mut report = self.assignments.load_report().await?.unwrap_or_default();

        let resent = self
            .dispatcher
            .resend(&assignment, &roster, request, &report, cancel)
            .await?;
        if resent.is_empty() {
            warn!("every notification was already delivered");
        }

        report.merge(resent);
        report.retain(|o| assignment.recipient_of(&o.giver) == Some(&o.recipient));
        self.assignments.save_report(&report).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::LanguageSelection;
    use crate::domain::dispatch::RetryPolicy;
    use crate::infrastructure::in_memory::{InMemoryAssignmentStore, InMemoryRosterStore};
    use crate::infrastructure::templates::BuiltinCatalog;
    use crate::infrastructure::transport::LogTransport;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn service(min_participants: usize) -> SecretSantaService<StdRng> {
        let settings = Settings {
            min_participants,
            ..Settings::default()
        };
        let dispatcher = NotificationDispatcher::new(
            Arc::new(LogTransport),
            Arc::new(BuiltinCatalog::default()),
            RetryPolicy::no_retry(),
            settings.max_in_flight,
        );
        SecretSantaService::with_engine(
            Box::new(InMemoryRosterStore::new()),
            Box::new(InMemoryAssignmentStore::new()),
            dispatcher,
            AssignmentEngine::with_rng(StdRng::seed_from_u64(5)),
            &settings,
        )
    }

    #[tokio::test]
    async fn test_add_participant_validates_input() {
        let service = service(2);

        assert!(matches!(
            service.add_participant("Al", "al@example.com", None).await,
            Err(SantaError::Validation(_))
        ));
        assert!(matches!(
            service.add_participant("Alice", "alice.example.com", None).await,
            Err(SantaError::Validation(_))
        ));

        let alice = service
            .add_participant("  Alice  ", "alice@example.com", Some("RO"))
            .await
            .unwrap();
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.language, LanguageCode::from("ro"));

        let bob = service
            .add_participant("Bob Smith", "bob@example.com", None)
            .await
            .unwrap();
        assert_eq!(bob.language, LanguageCode::from("en"));
        assert_eq!(service.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let service = service(2);
        service
            .add_participant("Alice", "alice@example.com", None)
            .await
            .unwrap();

        let result = service
            .add_participant("Alice Again", "ALICE@example.com", None)
            .await;
        assert!(matches!(result, Err(SantaError::DuplicateParticipant(_))));
        assert_eq!(service.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_adds_with_same_email_keep_one() {
        let service = service(2);

        let (first, second) = tokio::join!(
            service.add_participant("Alice", "alice@example.com", None),
            service.add_participant("Alice Twin", "Alice@Example.com", None),
        );

        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        assert!(
            matches!(first, Err(SantaError::DuplicateParticipant(_)))
                || matches!(second, Err(SantaError::DuplicateParticipant(_)))
        );
        assert_eq!(service.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_draw_enforces_minimum_group_size() {
        let service = service(4);
        for (name, email) in [
            ("Ana", "ana@example.com"),
            ("Ben", "ben@example.com"),
            ("Cleo", "cleo@example.com"),
        ] {
            service.add_participant(name, email, None).await.unwrap();
        }

        let request = DispatchRequest::new(LanguageSelection::PerParticipant);
        let result = service.draw(&request, &CancelToken::new()).await;
        assert!(matches!(
            result,
            Err(SantaError::InsufficientParticipants {
                required: 4,
                actual: 3
            })
        ));
        assert!(service.current_assignment().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_draw_persists_assignment_and_report() {
        let service = service(4);
        for (name, email) in [
            ("Ana", "ana@example.com"),
            ("Ben", "ben@example.com"),
            ("Cleo", "cleo@example.com"),
            ("Dan", "dan@example.com"),
        ] {
            service.add_participant(name, email, None).await.unwrap();
        }

        let request = DispatchRequest::new(LanguageSelection::Fixed("de".into()));
        let (assignment, report) = service.draw(&request, &CancelToken::new()).await.unwrap();

        assert_eq!(assignment.len(), 4);
        assert_eq!(report.delivered(), 4);
        assert_eq!(service.current_assignment().await.unwrap(), Some(assignment));
        assert_eq!(service.last_report().await.unwrap(), Some(report));
    }

    #[tokio::test]
    async fn test_resend_without_draw_is_not_found() {
        let service = service(2);
        let request = DispatchRequest::new(LanguageSelection::PerParticipant);
        assert!(matches!(
            service.resend(&request, &CancelToken::new()).await,
            Err(SantaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clear_discards_assignment() {
        let service = service(2);
        service
            .add_participant("Ana", "ana@example.com", None)
            .await
            .unwrap();
        service
            .add_participant("Ben", "ben@example.com", None)
            .await
            .unwrap();
        let request = DispatchRequest::new(LanguageSelection::PerParticipant);
        service.draw(&request, &CancelToken::new()).await.unwrap();

        assert_eq!(service.clear().await.unwrap(), 2);
        assert_eq!(service.count().await.unwrap(), 0);
        assert!(service.current_assignment().await.unwrap().is_none());
        assert!(service.last_report().await.unwrap().is_none());
    }
}
