use super::participant::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A rendered notification addressed to one giver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportErrorKind {
    /// Retrying may succeed (connection drop, timeout).
    Transient,
    /// Retrying will not help (invalid address, rejected message).
    Permanent,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Permanent => f.write_str("permanent"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} transport error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == TransportErrorKind::Transient
    }
}

/// Exponential backoff schedule for transient transport failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per pair, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries and never sleeps.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Delivered,
    Failed,
    /// Dispatch was cancelled before this pair finished.
    Cancelled,
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => f.write_str("delivered"),
            Self::Failed => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub giver: ParticipantId,
    pub recipient: ParticipantId,
    pub status: DispatchStatus,
    pub attempts: u32,
    pub error: Option<TransportError>,
}

impl DispatchOutcome {
    pub fn delivered(giver: ParticipantId, recipient: ParticipantId, attempts: u32) -> Self {
        Self {
            giver,
            recipient,
            status: DispatchStatus::Delivered,
            attempts,
            error: None,
        }
    }

    pub fn failed(
        giver: ParticipantId,
        recipient: ParticipantId,
        attempts: u32,
        error: TransportError,
    ) -> Self {
        Self {
            giver,
            recipient,
            status: DispatchStatus::Failed,
            attempts,
            error: Some(error),
        }
    }

    pub fn cancelled(giver: ParticipantId, recipient: ParticipantId, attempts: u32) -> Self {
        Self {
            giver,
            recipient,
            status: DispatchStatus::Cancelled,
            attempts,
            error: None,
        }
    }

    /// Whether a resend should pick this pair up again.
    pub fn needs_resend(&self) -> bool {
        self.status != DispatchStatus::Delivered
    }
}

/// Per-giver outcomes of one dispatch run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchReport {
    outcomes: BTreeMap<ParticipantId, DispatchOutcome>,
}

impl DispatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: DispatchOutcome) {
        self.outcomes.insert(outcome.giver.clone(), outcome);
    }

    /// Overlays the outcomes of a later run on top of this one.
    pub fn merge(&mut self, later: DispatchReport) {
        self.outcomes.extend(later.outcomes);
    }

    pub fn get(&self, giver: &ParticipantId) -> Option<&DispatchOutcome> {
        self.outcomes.get(giver)
    }

    /// Outcomes sorted by giver identifier.
    pub fn outcomes(&self) -> impl Iterator<Item = &DispatchOutcome> {
        self.outcomes.values()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn delivered(&self) -> usize {
        self.count(DispatchStatus::Delivered)
    }

    pub fn failed(&self) -> usize {
        self.count(DispatchStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(DispatchStatus::Cancelled)
    }

    /// Whether `giver` already has a delivered notification naming `recipient`.
    pub fn is_settled(&self, giver: &ParticipantId, recipient: &ParticipantId) -> bool {
        self.outcomes.get(giver).is_some_and(|o| {
            o.status == DispatchStatus::Delivered && &o.recipient == recipient
        })
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&DispatchOutcome) -> bool) {
        self.outcomes.retain(|_, outcome| keep(outcome));
    }

    /// Givers whose notification still has to go out.
    pub fn pending_givers(&self) -> BTreeSet<ParticipantId> {
        self.outcomes
            .values()
            .filter(|o| o.needs_resend())
            .map(|o| o.giver.clone())
            .collect()
    }

    fn count(&self, status: DispatchStatus) -> usize {
        self.outcomes.values().filter(|o| o.status == status).count()
    }
}
