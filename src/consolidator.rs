//! # Group Consolidator
//!
//! Expands a match set into the full connected link group, elects the
//! canonical primary, and repairs any structural drift: promotion of the
//! oldest member, demotion and re-pointing of former primaries, and a
//! bounded second-hop repair pass that restores the one-hop invariant.
//!
//! Safe to run unconditionally on every request; an already-correct group
//! passes through without a single write.

use crate::error::StoreError;
use crate::model::{Contact, ContactId, LinkPrecedence};
use crate::store::{ContactPatch, ContactTx};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// A consolidated link group with its canonical primary. `members` includes
/// the primary and is totally ordered by (`created_at`, id), so downstream
/// output is deterministic on both the single-group and merge paths.
#[derive(Debug, Clone)]
pub struct ConsolidatedGroup {
    pub primary: Contact,
    pub members: Vec<Contact>,
}

/// Total deterministic member order: earliest `created_at` first, ties by id.
pub fn sort_members(members: &mut [Contact]) {
    members.sort_unstable_by_key(|contact| (contact.created_at, contact.id));
}

/// Consolidate the link groups touched by `matches` into one correct group.
pub fn consolidate(
    tx: &mut dyn ContactTx,
    matches: &[Contact],
) -> Result<ConsolidatedGroup, StoreError> {
    // Roots of every touched group; more than one means the new fragment
    // bridges previously-separate groups.
    let roots: BTreeSet<ContactId> = matches.iter().map(Contact::root).collect();
    debug!(roots = roots.len(), "collected link-group roots");

    let mut members = tx.find_by_ids_or_linked_id(&roots)?;
    sort_members(&mut members);
    let canonical = members
        .first()
        .cloned()
        .ok_or_else(|| StoreError::Unavailable(anyhow::anyhow!("match set resolved to no members")))?;
    let canonical_id = canonical.id;

    // Promote the canonical primary in place if it is not already one.
    if !canonical.is_primary() || canonical.linked_id.is_some() {
        tx.update_many(&BTreeSet::from([canonical_id]), ContactPatch::promote())?;
        info!(primary = %canonical_id, "promoted canonical primary");
    }

    // Demote and re-point every other member that is not already a
    // secondary of the canonical primary. This folds former primaries of
    // merged groups in.
    let demoted: BTreeSet<ContactId> = members
        .iter()
        .filter(|contact| {
            contact.id != canonical_id
                && (contact.link_precedence != LinkPrecedence::Secondary
                    || contact.linked_id != Some(canonical_id))
        })
        .map(|contact| contact.id)
        .collect();

    if !demoted.is_empty() {
        tx.update_many(&demoted, ContactPatch::demote_to(canonical_id))?;
        info!(primary = %canonical_id, demoted = demoted.len(), "merged link groups");
        repair_second_hop(tx, canonical_id, &demoted)?;
    }

    // Re-fetch the now-consistent membership for downstream steps.
    let mut members = tx.find_by_ids_or_linked_id(&BTreeSet::from([canonical_id]))?;
    sort_members(&mut members);
    let primary = members
        .iter()
        .find(|contact| contact.id == canonical_id)
        .cloned()
        .ok_or(StoreError::MissingContact(canonical_id))?;

    Ok(ConsolidatedGroup { primary, members })
}

/// Re-point any contact still linked to a just-demoted former primary.
///
/// The repair is a single bounded pass over an arena of records indexed by
/// id: after it, every link is one hop. No fixpoint iteration is needed
/// because demotion only ever introduces links of depth two.
fn repair_second_hop(
    tx: &mut dyn ContactTx,
    canonical_id: ContactId,
    demoted: &BTreeSet<ContactId>,
) -> Result<(), StoreError> {
    let arena: FxHashMap<ContactId, Contact> = tx
        .find_by_ids_or_linked_id(demoted)?
        .into_iter()
        .map(|contact| (contact.id, contact))
        .collect();

    let strays: BTreeSet<ContactId> = arena
        .values()
        .filter(|contact| {
            contact.id != canonical_id
                && !demoted.contains(&contact.id)
                && contact
                    .linked_id
                    .is_some_and(|linked| demoted.contains(&linked))
        })
        .map(|contact| contact.id)
        .collect();

    if !strays.is_empty() {
        tx.update_many(&strays, ContactPatch::demote_to(canonical_id))?;
        info!(primary = %canonical_id, repaired = strays.len(), "re-pointed second-hop links");
    }
    Ok(())
}
