//! Application layer containing the draw and notification orchestration.
//!
//! `AssignmentEngine` computes pairings in memory, `NotificationDispatcher`
//! delivers them concurrently over a `Transport`, and `SecretSantaService`
//! ties both to the roster and assignment stores.

pub mod assignment;
pub mod dispatcher;
pub mod service;
