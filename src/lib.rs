//! # Idlink
//!
//! A contact identity reconciliation engine.
//!
//! Fragments of contact information (an email and/or a phone number) arrive
//! independently over time; the engine clusters fragments belonging to the
//! same person into one link group with a single canonical primary record,
//! merging previously-disjoint groups when a new fragment bridges them, and
//! returns a deduplicated, deterministically-ordered view of the group.

pub mod compose;
pub mod config;
pub mod consolidator;
pub mod error;
pub mod guard;
pub mod matcher;
pub mod model;
pub mod persistence;
pub mod store;
pub mod synthesizer;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use error::{EngineError, Phase, StoreError};
pub use guard::KeyLocks;
pub use model::{
    Contact, ContactId, IdentifyRequest, IdentityView, LinkPrecedence, NormalizedRequest,
    PhoneNumber,
};
pub use persistence::SqliteStore;
pub use store::{ContactPatch, ContactStore, ContactTx, MatchPredicate, MemoryStore, NewContact};

use error::{PhaseError, PhaseResultExt};
use std::time::Duration;
use tracing::{debug, warn};

/// Main API for identity reconciliation.
///
/// Holds no mutable state between requests; the store is the only shared
/// mutable resource. `identify` is safe to call from many threads at once.
pub struct Idlink {
    store: Box<dyn ContactStore>,
    locks: KeyLocks,
    config: EngineConfig,
}

impl Idlink {
    /// Create an engine over the given store with default tuning.
    pub fn with_store<S>(store: S) -> Self
    where
        S: ContactStore + 'static,
    {
        Self::with_store_and_config(store, EngineConfig::default())
    }

    /// Create an engine over the given store with explicit tuning.
    pub fn with_store_and_config<S>(store: S, config: EngineConfig) -> Self
    where
        S: ContactStore + 'static,
    {
        Self {
            store: Box::new(store),
            locks: KeyLocks::new(),
            config,
        }
    }

    /// Resolve a contact fragment to its canonical identity group, creating
    /// or consolidating records as required.
    ///
    /// The whole pipeline — match, consolidate, synthesize, compose — runs
    /// as one atomic unit of work, serialized against any concurrent
    /// resolution touching the same email or phone.
    pub fn identify(&self, request: IdentifyRequest) -> Result<IdentityView, EngineError> {
        let normalized = normalize(&request)?;
        let _guard = self.locks.acquire(normalized.lock_keys());

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .store
                .with_transaction(&mut |tx| resolve(tx, &normalized))
            {
                Ok(view) => return Ok(view),
                Err(err) if err.source.is_retryable() => {
                    if attempt >= self.config.max_retries {
                        warn!(attempts = attempt, "conflict retry budget exhausted");
                        return Err(EngineError::ConflictRetryExhausted { attempts: attempt });
                    }
                    warn!(attempt, phase = %err.phase, "serialization conflict, retrying");
                    std::thread::sleep(Duration::from_millis(
                        self.config.retry_backoff_ms * u64::from(attempt),
                    ));
                }
                Err(err) => {
                    return Err(EngineError::StoreUnavailable {
                        phase: err.phase,
                        source: err.source,
                    })
                }
            }
        }
    }
}

/// Validate and normalize the request at the boundary; a request with
/// neither field (after empty-string stripping) never reaches the store.
fn normalize(request: &IdentifyRequest) -> Result<NormalizedRequest, EngineError> {
    let email = request
        .email
        .as_deref()
        .filter(|email| !email.is_empty())
        .map(str::to_string);
    let phone = request
        .phone_number
        .as_ref()
        .and_then(PhoneNumber::normalized);
    if email.is_none() && phone.is_none() {
        return Err(EngineError::InvalidRequest);
    }
    Ok(NormalizedRequest { email, phone })
}

/// The resolution pipeline, run inside one transaction. Re-running it after
/// a conflict converges to the same final state.
fn resolve(
    tx: &mut dyn ContactTx,
    request: &NormalizedRequest,
) -> Result<IdentityView, PhaseError> {
    let predicate = MatchPredicate::from_request(request);
    let matches = matcher::find_matches(tx, &predicate).in_phase(Phase::Match)?;

    if matches.is_empty() {
        let created = tx
            .insert(NewContact::primary(
                request.email.clone(),
                request.phone.clone(),
            ))
            .in_phase(Phase::Synthesize)?;
        debug!(id = %created.id, "created new primary for unseen identity");
        return Ok(compose::singleton(&created));
    }

    let mut group = consolidator::consolidate(tx, &matches).in_phase(Phase::Consolidate)?;
    synthesizer::synthesize(tx, &mut group, request).in_phase(Phase::Synthesize)?;
    Ok(compose::compose(&group))
}
