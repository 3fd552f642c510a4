use crate::domain::assignment::Assignment;
use crate::domain::dispatch::{
    DispatchOutcome, DispatchReport, Message, RetryPolicy, TransportError,
};
use crate::domain::participant::{LanguageCode, Participant, ParticipantId, RosterSnapshot};
use crate::domain::ports::{TemplateCatalogRef, TransportRef};
use crate::error::{Result, SantaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, info, warn};

/// Which language each giver's notification is rendered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageSelection {
    /// One language for the whole group.
    Fixed(LanguageCode),
    /// Each giver's preferred language.
    PerParticipant,
}

impl LanguageSelection {
    pub fn resolve(&self, giver: &Participant) -> LanguageCode {
        match self {
            Self::Fixed(code) => code.clone(),
            Self::PerParticipant => giver.language.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub language: LanguageSelection,
    pub custom_note: Option<String>,
}

impl DispatchRequest {
    pub fn new(language: LanguageSelection) -> Self {
        Self {
            language,
            custom_note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.custom_note = Some(note.into());
        self
    }
}

/// Cooperative cancellation shared between a caller and a running dispatch.
///
/// Cloning yields a handle to the same signal.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

struct Job {
    giver: ParticipantId,
    recipient: ParticipantId,
    message: Message,
}

/// Sends one localized notification per assignment pair.
///
/// Pairs are independent units: each runs its own send/retry loop on a tokio
/// task, bounded by `max_in_flight` concurrent sends, and reports its outcome
/// over a channel to a single collector. A failing pair never stops the
/// others.
#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: TransportRef,
    catalog: TemplateCatalogRef,
    policy: RetryPolicy,
    max_in_flight: usize,
}

impl NotificationDispatcher {
    pub fn new(
        transport: TransportRef,
        catalog: TemplateCatalogRef,
        policy: RetryPolicy,
        max_in_flight: usize,
    ) -> Self {
        Self {
            transport,
            catalog,
            policy,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Notifies every giver in the assignment.
    ///
    /// Per-pair delivery failures are recorded in the report. Only structural
    /// problems (an assignment that does not match the roster, a template that
    /// cannot be rendered) fail the call, and they do so before anything is
    /// sent.
    pub async fn dispatch(
        &self,
        assignment: &Assignment,
        roster: &RosterSnapshot,
        request: &DispatchRequest,
        cancel: &CancelToken,
    ) -> Result<DispatchReport> {
        assignment
            .verify_against(roster)
            .map_err(|e| SantaError::MalformedAssignment(e.to_string()))?;
        let jobs = self.prepare(assignment.pairs(), roster, request)?;
        Ok(self.run(jobs, cancel).await)
    }

    /// Notifies only the givers in `givers`, leaving the assignment untouched.
    pub async fn dispatch_only(
        &self,
        assignment: &Assignment,
        roster: &RosterSnapshot,
        request: &DispatchRequest,
        givers: &BTreeSet<ParticipantId>,
        cancel: &CancelToken,
    ) -> Result<DispatchReport> {
        if let Some(unknown) = givers.iter().find(|g| assignment.recipient_of(g).is_none()) {
            return Err(SantaError::MalformedAssignment(format!(
                "{unknown} is not a giver in this assignment"
            )));
        }
        let pairs = assignment.pairs().filter(|(giver, _)| givers.contains(*giver));
        let jobs = self.prepare(pairs, roster, request)?;
        Ok(self.run(jobs, cancel).await)
    }

    /// Re-sends the pairs a previous run did not deliver.
    ///
    /// A pair counts as delivered only if `previous` has a delivered outcome
    /// for the same giver and recipient. The returned report covers just the
    /// re-sent pairs.
    pub async fn resend(
        &self,
        assignment: &Assignment,
        roster: &RosterSnapshot,
        request: &DispatchRequest,
        previous: &DispatchReport,
        cancel: &CancelToken,
    ) -> Result<DispatchReport> {
        let pending: BTreeSet<ParticipantId> = assignment
            .pairs()
            .filter(|(giver, recipient)| !previous.is_settled(giver, recipient))
            .map(|(giver, _)| giver.clone())
            .collect();
        if pending.is_empty() {
            debug!("nothing to resend");
            return Ok(DispatchReport::new());
        }
        info!(pairs = pending.len(), "resending undelivered notifications");
        self.dispatch_only(assignment, roster, request, &pending, cancel)
            .await
    }

    fn prepare<'a>(
        &self,
        pairs: impl Iterator<Item = (&'a ParticipantId, &'a ParticipantId)>,
        roster: &RosterSnapshot,
        request: &DispatchRequest,
    ) -> Result<Vec<Job>> {
        let note = request
            .custom_note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        pairs
            .map(|(giver_id, recipient_id)| -> Result<Job> {
                let giver = roster.get(giver_id).ok_or_else(|| {
                    SantaError::MalformedAssignment(format!("giver {giver_id} is not on the roster"))
                })?;
                let recipient = roster.get(recipient_id).ok_or_else(|| {
                    SantaError::MalformedAssignment(format!(
                        "recipient {recipient_id} is not on the roster"
                    ))
                })?;
                let language = request.language.resolve(giver);
                let rendered = self.catalog.render(&language, &recipient.name, note)?;
                Ok(Job {
                    giver: giver_id.clone(),
                    recipient: recipient_id.clone(),
                    message: Message {
                        to: giver.email.clone(),
                        subject: rendered.subject,
                        body: rendered.body,
                    },
                })
            })
            .collect()
    }

    async fn run(&self, jobs: Vec<Job>, cancel: &CancelToken) -> DispatchReport {
        let expected: Vec<(ParticipantId, ParticipantId)> = jobs
            .iter()
            .map(|job| (job.giver.clone(), job.recipient.clone()))
            .collect();
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let (tx, mut rx) = mpsc::channel(jobs.len().max(1));

        for job in jobs {
            let unit = DeliveryUnit {
                transport: Arc::clone(&self.transport),
                policy: self.policy.clone(),
                permits: Arc::clone(&permits),
                cancel: cancel.clone(),
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = unit.deliver(job).await;
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut report = DispatchReport::new();
        while let Some(outcome) = rx.recv().await {
            report.record(outcome);
        }

        // A unit that panicked never reported back.
        for (giver, recipient) in expected {
            if report.get(&giver).is_none() {
                warn!(giver = %giver, "delivery task ended without an outcome");
                report.record(DispatchOutcome::failed(
                    giver,
                    recipient,
                    0,
                    TransportError::transient("delivery task aborted"),
                ));
            }
        }

        info!(
            delivered = report.delivered(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            "dispatch finished"
        );
        report
    }
}

struct DeliveryUnit {
    transport: TransportRef,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
    cancel: CancelToken,
}

impl DeliveryUnit {
    async fn deliver(self, job: Job) -> DispatchOutcome {
        let Job {
            giver,
            recipient,
            message,
        } = job;

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return DispatchOutcome::cancelled(giver, recipient, 0);
            }
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return DispatchOutcome::cancelled(giver, recipient, 0),
            },
        };

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            if self.cancel.is_cancelled() {
                return DispatchOutcome::cancelled(giver, recipient, attempt);
            }
            attempt += 1;

            let error = match self.transport.send(&message).await {
                Ok(()) => {
                    debug!(giver = %giver, attempt, "notification delivered");
                    return DispatchOutcome::delivered(giver, recipient, attempt);
                }
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= max_attempts {
                warn!(giver = %giver, attempt, error = %error, "notification failed");
                return DispatchOutcome::failed(giver, recipient, attempt, error);
            }

            let delay = self.policy.backoff_after(attempt);
            debug!(giver = %giver, attempt, ?delay, error = %error, "retrying notification");
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return DispatchOutcome::cancelled(giver, recipient, attempt);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
