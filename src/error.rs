//! # Error Taxonomy
//!
//! Engine-level failures are typed and name the pipeline phase they arose in,
//! so callers can diagnose without seeing store internals. Store-level
//! failures distinguish retryable serialization conflicts from hard
//! unavailability.

use crate::model::ContactId;
use std::fmt;
use thiserror::Error;

/// The pipeline phase a store failure surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Match,
    Consolidate,
    Synthesize,
    Commit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Match => "match",
            Phase::Consolidate => "consolidate",
            Phase::Synthesize => "synthesize",
            Phase::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Failures raised by a contact store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write-write or serialization conflict with a concurrent transaction.
    /// The whole unit of work is safe to re-run.
    #[error("serialization conflict with a concurrent transaction")]
    Conflict,

    /// The store could not complete the operation; the transaction rolls back.
    #[error("contact store failure")]
    Unavailable(#[from] anyhow::Error),

    /// A contact referenced mid-transaction does not exist. Indicates a bug
    /// or external tampering, never normal operation.
    #[error("contact {0} missing mid-transaction")]
    MissingContact(ContactId),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

/// Failures surfaced to the caller of the identify operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Neither an email nor a phone number was supplied. Recovered at the
    /// boundary; never reaches the store.
    #[error("either email or phoneNumber must be provided")]
    InvalidRequest,

    /// Serialization conflicts persisted past the retry budget. Transient;
    /// the whole operation is safe to retry.
    #[error("serialization conflict persisted after {attempts} attempts")]
    ConflictRetryExhausted { attempts: u32 },

    /// The persistence layer failed; the transaction was rolled back.
    #[error("contact store unavailable during {phase} phase")]
    StoreUnavailable {
        phase: Phase,
        #[source]
        source: StoreError,
    },
}

/// A store failure tagged with the pipeline phase it arose in. Internal
/// currency between the transactional pipeline and the retry loop.
#[derive(Debug)]
pub struct PhaseError {
    pub phase: Phase,
    pub source: StoreError,
}

impl PhaseError {
    pub fn new(phase: Phase, source: StoreError) -> Self {
        Self { phase, source }
    }
}

pub(crate) trait PhaseResultExt<T> {
    fn in_phase(self, phase: Phase) -> Result<T, PhaseError>;
}

impl<T> PhaseResultExt<T> for Result<T, StoreError> {
    fn in_phase(self, phase: Phase) -> Result<T, PhaseError> {
        self.map_err(|source| PhaseError::new(phase, source))
    }
}
