//! # Match Finder
//!
//! Retrieves every stored contact sharing the submitted email or phone,
//! by exact string equality. An empty result means no link group exists yet.

use crate::error::StoreError;
use crate::model::Contact;
use crate::store::{ContactTx, MatchPredicate};
use tracing::debug;

/// Find all contacts matching either clause of the predicate.
pub fn find_matches(
    tx: &mut dyn ContactTx,
    predicate: &MatchPredicate,
) -> Result<Vec<Contact>, StoreError> {
    let matches = tx.find_by_predicate(predicate)?;
    debug!(count = matches.len(), "matched stored contacts");
    Ok(matches)
}
