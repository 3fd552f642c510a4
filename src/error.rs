use crate::domain::participant::{LanguageCode, ParticipantId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SantaError {
    #[error("at least {required} participants are required, found {actual}")]
    InsufficientParticipants { required: usize, actual: usize },
    #[error("assignment invariant violated: {0}")]
    AssignmentInvariantViolated(String),
    #[error("duplicate participant: {0}")]
    DuplicateParticipant(ParticipantId),
    #[error("malformed assignment: {0}")]
    MalformedAssignment(String),
    #[error("unknown language `{0}` and no default template available")]
    UnknownLanguage(LanguageCode),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SantaError>;
