//! Shared fixtures for integration tests and benches. Included from
//! `tests/` and `benches/` via `#[path]`, so imports go through the
//! library crate by name.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use idlink_rs::{Contact, ContactId, IdentifyRequest, LinkPrecedence};

#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn request(email: Option<&str>, phone: Option<&str>) -> IdentifyRequest {
    IdentifyRequest::new(email, phone)
}

/// Build a contact record directly, for seeding drifted store states.
#[allow(dead_code)]
pub fn contact(
    id: i64,
    email: Option<&str>,
    phone: Option<&str>,
    linked_id: Option<i64>,
    link_precedence: LinkPrecedence,
    created_at: i64,
) -> Contact {
    Contact {
        id: ContactId(id),
        email: email.map(str::to_string),
        phone_number: phone.map(str::to_string),
        linked_id: linked_id.map(ContactId),
        link_precedence,
        created_at,
        updated_at: created_at,
        deleted_at: None,
    }
}

/// Seeded identify workload drawing emails and phones from small pools, so
/// runs collide and bridge groups with realistic frequency. Roughly 80% of
/// requests carry both fields, the rest one field only.
#[allow(dead_code)]
pub fn generate_requests(
    count: usize,
    email_pool: usize,
    phone_pool: usize,
    seed: u64,
) -> Vec<IdentifyRequest> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut requests = Vec::with_capacity(count);
    for _ in 0..count {
        let email = format!("user{}@example.com", rng.random_range(0..email_pool));
        let phone = format!("555-{:04}", rng.random_range(0..phone_pool));
        let request = match rng.random_range(0..10) {
            0 => IdentifyRequest::new(Some(&email), None),
            1 => IdentifyRequest::new(None, Some(&phone)),
            _ => IdentifyRequest::new(Some(&email), Some(&phone)),
        };
        requests.push(request);
    }
    requests
}

/// Assert the structural invariants of the link model over a full store
/// dump: primary iff unlinked, links resolve one hop to a primary, every
/// connected group (by shared email or phone, transitively) has exactly one
/// primary and it is the oldest member (ties by smallest id).
#[allow(dead_code)]
pub fn assert_link_invariants(contacts: &[Contact]) {
    use std::collections::HashMap;

    let by_id: HashMap<ContactId, &Contact> = contacts.iter().map(|c| (c.id, c)).collect();

    for contact in contacts {
        match contact.link_precedence {
            LinkPrecedence::Primary => assert!(
                contact.linked_id.is_none(),
                "{} is primary but linked",
                contact.id
            ),
            LinkPrecedence::Secondary => {
                let linked = contact
                    .linked_id
                    .unwrap_or_else(|| panic!("{} is secondary but unlinked", contact.id));
                let target = by_id
                    .get(&linked)
                    .unwrap_or_else(|| panic!("{} links to missing {}", contact.id, linked));
                assert!(
                    target.linked_id.is_none(),
                    "{} links to non-primary {}",
                    contact.id,
                    linked
                );
            }
        }
    }

    // Union contacts transitively connected by shared email or phone.
    let mut dsu: Vec<usize> = (0..contacts.len()).collect();
    fn find(dsu: &mut Vec<usize>, i: usize) -> usize {
        if dsu[i] != i {
            let root = find(dsu, dsu[i]);
            dsu[i] = root;
        }
        dsu[i]
    }
    let mut by_email: HashMap<&str, usize> = HashMap::new();
    let mut by_phone: HashMap<&str, usize> = HashMap::new();
    for (i, contact) in contacts.iter().enumerate() {
        if let Some(email) = contact.email.as_deref() {
            if let Some(&j) = by_email.get(email) {
                let (a, b) = (find(&mut dsu, i), find(&mut dsu, j));
                dsu[a] = b;
            } else {
                by_email.insert(email, i);
            }
        }
        if let Some(phone) = contact.phone_number.as_deref() {
            if let Some(&j) = by_phone.get(phone) {
                let (a, b) = (find(&mut dsu, i), find(&mut dsu, j));
                dsu[a] = b;
            } else {
                by_phone.insert(phone, i);
            }
        }
        // Link edges connect too: a secondary belongs with its primary.
        if let Some(linked) = contact.linked_id {
            let j = contacts
                .iter()
                .position(|c| c.id == linked)
                .expect("link target present");
            let (a, b) = (find(&mut dsu, i), find(&mut dsu, j));
            dsu[a] = b;
        }
    }

    let mut groups: HashMap<usize, Vec<&Contact>> = HashMap::new();
    for (i, contact) in contacts.iter().enumerate() {
        let root = find(&mut dsu, i);
        groups.entry(root).or_default().push(contact);
    }

    for members in groups.values() {
        let primaries: Vec<&&Contact> = members.iter().filter(|c| c.is_primary()).collect();
        assert_eq!(
            primaries.len(),
            1,
            "group {:?} has {} primaries",
            members.iter().map(|c| c.id).collect::<Vec<_>>(),
            primaries.len()
        );
        let primary = primaries[0];

        let oldest = members
            .iter()
            .min_by_key(|c| (c.created_at, c.id))
            .expect("non-empty group");
        assert_eq!(
            primary.id, oldest.id,
            "primary {} is not the oldest member {}",
            primary.id, oldest.id
        );

        for member in members {
            if member.id != primary.id {
                assert_eq!(
                    member.linked_id,
                    Some(primary.id),
                    "{} does not point at its primary {}",
                    member.id,
                    primary.id
                );
            }
        }
    }
}
