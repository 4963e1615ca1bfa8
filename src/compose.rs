//! # Response Composer
//!
//! Builds the deduplicated, deterministically-ordered aggregate view of a
//! link group: the primary's values lead each list, first occurrence wins,
//! nulls are dropped.

use crate::consolidator::ConsolidatedGroup;
use crate::model::{Contact, IdentityView};

fn push_unique<T: PartialEq + Clone>(out: &mut Vec<T>, value: Option<&T>) {
    if let Some(value) = value {
        if !out.contains(value) {
            out.push(value.clone());
        }
    }
}

/// Compose the aggregate view from consolidated membership. Members must be
/// in group order (`created_at`, then id); the primary's own values are
/// emitted first regardless of its position.
pub fn compose(group: &ConsolidatedGroup) -> IdentityView {
    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();
    push_unique(&mut emails, group.primary.email.as_ref());
    push_unique(&mut phone_numbers, group.primary.phone_number.as_ref());

    let mut secondary_contact_ids = Vec::new();
    for member in &group.members {
        push_unique(&mut emails, member.email.as_ref());
        push_unique(&mut phone_numbers, member.phone_number.as_ref());
        if member.id != group.primary.id {
            push_unique(&mut secondary_contact_ids, Some(&member.id));
        }
    }

    IdentityView {
        primary_contact_id: group.primary.id,
        emails,
        phone_numbers,
        secondary_contact_ids,
    }
}

/// View for a brand-new identity: the freshly created contact stands alone.
pub fn singleton(contact: &Contact) -> IdentityView {
    IdentityView {
        primary_contact_id: contact.id,
        emails: contact.email.iter().cloned().collect(),
        phone_numbers: contact.phone_number.iter().cloned().collect(),
        secondary_contact_ids: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContactId, LinkPrecedence};

    fn member(id: i64, email: Option<&str>, phone: Option<&str>, created_at: i64) -> Contact {
        Contact {
            id: ContactId(id),
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    #[test]
    fn primary_values_lead_and_duplicates_collapse() {
        let primary = member(1, Some("first@x.io"), Some("111"), 100);
        let group = ConsolidatedGroup {
            primary: primary.clone(),
            members: vec![
                primary,
                member(2, Some("second@x.io"), Some("111"), 200),
                member(3, Some("first@x.io"), Some("222"), 300),
            ],
        };

        let view = compose(&group);
        assert_eq!(view.primary_contact_id, ContactId(1));
        assert_eq!(view.emails, vec!["first@x.io", "second@x.io"]);
        assert_eq!(view.phone_numbers, vec!["111", "222"]);
        assert_eq!(
            view.secondary_contact_ids,
            vec![ContactId(2), ContactId(3)]
        );
    }

    #[test]
    fn null_fields_are_dropped() {
        let primary = member(1, None, Some("111"), 100);
        let group = ConsolidatedGroup {
            primary: primary.clone(),
            members: vec![primary, member(2, Some("only@x.io"), None, 200)],
        };

        let view = compose(&group);
        assert_eq!(view.emails, vec!["only@x.io"]);
        assert_eq!(view.phone_numbers, vec!["111"]);
    }

    #[test]
    fn singleton_view_has_no_secondaries() {
        let contact = member(5, Some("solo@x.io"), None, 100);
        let view = singleton(&contact);
        assert_eq!(view.primary_contact_id, ContactId(5));
        assert_eq!(view.emails, vec!["solo@x.io"]);
        assert!(view.phone_numbers.is_empty());
        assert!(view.secondary_contact_ids.is_empty());
    }
}
