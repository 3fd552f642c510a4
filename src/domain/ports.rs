use super::assignment::Assignment;
use super::dispatch::{DispatchReport, Message, TransportError};
use super::participant::{LanguageCode, Participant, RosterSnapshot};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Participant records keyed by identifier.
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Adds a participant. Fails with `DuplicateParticipant` when the
    /// identifier or the email (case-insensitively) is already taken; the
    /// check and the insert happen under one write lock.
    async fn create(&self, participant: Participant) -> Result<()>;
    /// Returns every participant in insertion order, captured in one read.
    async fn list(&self) -> Result<RosterSnapshot>;
    async fn count(&self) -> Result<usize>;
    /// Removes every participant and returns how many were removed.
    async fn delete_all(&self) -> Result<usize>;
}

/// Durable home of the current assignment and its latest delivery report.
///
/// `save_assignment` must be a single atomic write: readers either see the
/// previous assignment or the complete new one.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn save_assignment(&self, assignment: &Assignment) -> Result<()>;
    async fn load_assignment(&self) -> Result<Option<Assignment>>;
    async fn save_report(&self, report: &DispatchReport) -> Result<()>;
    async fn load_report(&self) -> Result<Option<DispatchReport>>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub language: LanguageCode,
    pub subject: String,
    pub body: String,
}

/// Localized message texts.
pub trait TemplateCatalog: Send + Sync {
    /// Renders the notification for a giver whose recipient is
    /// `recipient_name`. Unknown languages fall back to the default one.
    fn render(
        &self,
        language: &LanguageCode,
        recipient_name: &str,
        custom_note: Option<&str>,
    ) -> Result<RenderedTemplate>;
}

/// Outbound delivery of a single addressed message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &Message) -> std::result::Result<(), TransportError>;
}

pub type RosterStoreBox = Box<dyn RosterStore>;
pub type AssignmentStoreBox = Box<dyn AssignmentStore>;
pub type TemplateCatalogRef = Arc<dyn TemplateCatalog>;
pub type TransportRef = Arc<dyn Transport>;
