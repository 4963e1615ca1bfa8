//! # Store Module
//!
//! The transactional contact-store interface consumed by the engine, the
//! typed match predicate, and an in-memory reference implementation with
//! snapshot-clone transactions.

use crate::error::{PhaseError, StoreError};
use crate::model::{now_millis, Contact, ContactId, IdentityView, LinkPrecedence, NormalizedRequest};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

/// Disjunctive exact-match predicate: a contact matches if its email equals
/// `email` or its phone number equals `phone`. Built from a normalized
/// request, so at least one clause is present by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPredicate {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl MatchPredicate {
    pub fn from_request(request: &NormalizedRequest) -> Self {
        Self {
            email: request.email.clone(),
            phone: request.phone.clone(),
        }
    }

    /// Exact string equality on either clause.
    pub fn matches(&self, contact: &Contact) -> bool {
        let email_hit = match (&self.email, &contact.email) {
            (Some(wanted), Some(have)) => wanted == have,
            _ => false,
        };
        let phone_hit = match (&self.phone, &contact.phone_number) {
            (Some(wanted), Some(have)) => wanted == have,
            _ => false,
        };
        email_hit || phone_hit
    }
}

/// Fields of a contact to be inserted. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    pub fn primary(email: Option<String>, phone_number: Option<String>) -> Self {
        Self {
            email,
            phone_number,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    pub fn secondary(
        email: Option<String>,
        phone_number: Option<String>,
        primary: ContactId,
    ) -> Self {
        Self {
            email,
            phone_number,
            linked_id: Some(primary),
            link_precedence: LinkPrecedence::Secondary,
        }
    }
}

/// Patch applied by `update_many`. `linked_id` is doubly optional so a
/// patch can distinguish "leave unchanged" from "clear the link".
/// `updated_at` always advances on application.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactPatch {
    pub link_precedence: Option<LinkPrecedence>,
    pub linked_id: Option<Option<ContactId>>,
}

impl ContactPatch {
    /// Promote to primary and clear the link.
    pub fn promote() -> Self {
        Self {
            link_precedence: Some(LinkPrecedence::Primary),
            linked_id: Some(None),
        }
    }

    /// Demote to secondary pointing directly at `primary`.
    pub fn demote_to(primary: ContactId) -> Self {
        Self {
            link_precedence: Some(LinkPrecedence::Secondary),
            linked_id: Some(Some(primary)),
        }
    }
}

/// Operations available inside one atomic unit of work.
pub trait ContactTx {
    /// All contacts matching the disjunctive predicate.
    fn find_by_predicate(&mut self, predicate: &MatchPredicate)
        -> Result<Vec<Contact>, StoreError>;

    /// All contacts whose id is in `ids` or whose `linked_id` is in `ids`.
    fn find_by_ids_or_linked_id(
        &mut self,
        ids: &BTreeSet<ContactId>,
    ) -> Result<Vec<Contact>, StoreError>;

    /// Insert a contact; the store issues the id and both timestamps and
    /// returns the full stored record.
    fn insert(&mut self, new: NewContact) -> Result<Contact, StoreError>;

    /// Apply `patch` to every contact in `ids`, advancing `updated_at`.
    fn update_many(
        &mut self,
        ids: &BTreeSet<ContactId>,
        patch: ContactPatch,
    ) -> Result<(), StoreError>;
}

/// A transactional contact store. `with_transaction` runs the closure
/// against a transaction scope; on `Ok` the transaction commits, on `Err`
/// it rolls back with no partial effect observable.
pub trait ContactStore: Send + Sync {
    fn with_transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn ContactTx) -> Result<IdentityView, PhaseError>,
    ) -> Result<IdentityView, PhaseError>;
}

impl<S: ContactStore + ?Sized> ContactStore for std::sync::Arc<S> {
    fn with_transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn ContactTx) -> Result<IdentityView, PhaseError>,
    ) -> Result<IdentityView, PhaseError> {
        (**self).with_transaction(f)
    }
}

#[derive(Debug, Clone)]
struct MemoryInner {
    contacts: BTreeMap<ContactId, Contact>,
    next_id: i64,
}

/// In-memory reference store. Transactions run against a cloned snapshot;
/// commit swaps the snapshot back, rollback drops it. The store mutex is
/// held for the whole transaction, so units of work are fully serialized.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                contacts: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Build a store pre-populated with explicit records, ids and timestamps
    /// included. Used by tests to reproduce drifted link states.
    pub fn seeded(contacts: Vec<Contact>) -> Self {
        let next_id = contacts.iter().map(|c| c.id.0).max().unwrap_or(0) + 1;
        let contacts = contacts.into_iter().map(|c| (c.id, c)).collect();
        Self {
            inner: Mutex::new(MemoryInner { contacts, next_id }),
        }
    }

    /// All stored contacts in id order.
    pub fn snapshot(&self) -> Vec<Contact> {
        self.inner.lock().contacts.values().cloned().collect()
    }
}

struct MemoryTx<'a> {
    staged: &'a mut MemoryInner,
}

impl ContactTx for MemoryTx<'_> {
    fn find_by_predicate(
        &mut self,
        predicate: &MatchPredicate,
    ) -> Result<Vec<Contact>, StoreError> {
        Ok(self
            .staged
            .contacts
            .values()
            .filter(|contact| predicate.matches(contact))
            .cloned()
            .collect())
    }

    fn find_by_ids_or_linked_id(
        &mut self,
        ids: &BTreeSet<ContactId>,
    ) -> Result<Vec<Contact>, StoreError> {
        Ok(self
            .staged
            .contacts
            .values()
            .filter(|contact| {
                ids.contains(&contact.id)
                    || contact.linked_id.is_some_and(|linked| ids.contains(&linked))
            })
            .cloned()
            .collect())
    }

    fn insert(&mut self, new: NewContact) -> Result<Contact, StoreError> {
        let now = now_millis();
        let id = ContactId(self.staged.next_id);
        self.staged.next_id += 1;
        let contact = Contact {
            id,
            email: new.email,
            phone_number: new.phone_number,
            linked_id: new.linked_id,
            link_precedence: new.link_precedence,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.staged.contacts.insert(id, contact.clone());
        Ok(contact)
    }

    fn update_many(
        &mut self,
        ids: &BTreeSet<ContactId>,
        patch: ContactPatch,
    ) -> Result<(), StoreError> {
        let now = now_millis();
        for id in ids {
            let contact = self
                .staged
                .contacts
                .get_mut(id)
                .ok_or(StoreError::MissingContact(*id))?;
            if let Some(precedence) = patch.link_precedence {
                contact.link_precedence = precedence;
            }
            if let Some(linked) = patch.linked_id {
                contact.linked_id = linked;
            }
            contact.updated_at = now;
        }
        Ok(())
    }
}

impl ContactStore for MemoryStore {
    fn with_transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn ContactTx) -> Result<IdentityView, PhaseError>,
    ) -> Result<IdentityView, PhaseError> {
        let mut inner = self.inner.lock();
        let mut staged = inner.clone();
        let view = f(&mut MemoryTx {
            staged: &mut staged,
        })?;
        *inner = staged;
        Ok(view)
    }
}
