#[path = "../src/test_support.rs"]
mod test_support;

use std::sync::Arc;

use idlink_rs::{ContactId, Idlink, LinkPrecedence, MemoryStore};
use test_support::{assert_link_invariants, contact, generate_requests, request};

#[test]
fn merged_groups_keep_exactly_one_primary() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let engine = Idlink::with_store(Arc::clone(&store));

    engine.identify(request(Some("george@hillvalley.edu"), Some("919191")))?;
    engine.identify(request(Some("biffsucks@hillvalley.edu"), Some("717171")))?;
    engine.identify(request(Some("george@hillvalley.edu"), Some("717171")))?;

    let contacts = store.snapshot();
    assert_link_invariants(&contacts);

    let demoted = contacts.iter().find(|c| c.id == ContactId(2)).unwrap();
    assert_eq!(demoted.link_precedence, LinkPrecedence::Secondary);
    assert_eq!(demoted.linked_id, Some(ContactId(1)));
    Ok(())
}

#[test]
fn consolidation_is_a_noop_on_a_correct_group() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let engine = Idlink::with_store(Arc::clone(&store));
    engine.identify(request(Some("lorraine@hillvalley.edu"), Some("123456")))?;
    engine.identify(request(Some("mcfly@hillvalley.edu"), Some("123456")))?;
    let before = store.snapshot();

    // Pure lookups over the same group must not touch a single row.
    engine.identify(request(None, Some("123456")))?;
    engine.identify(request(Some("mcfly@hillvalley.edu"), Some("123456")))?;

    assert_eq!(store.snapshot(), before);
    Ok(())
}

#[test]
fn drifted_second_hop_links_are_repaired() -> anyhow::Result<()> {
    // Seed a drifted state: contact 2 claims to be primary while linked to
    // 1, and contact 3 points at 2 (a non-primary). A single resolution
    // touching the group must restore the one-hop, single-primary shape.
    let store = Arc::new(MemoryStore::seeded(vec![
        contact(
            1,
            Some("doc@hillvalley.edu"),
            Some("555-4385"),
            None,
            LinkPrecedence::Primary,
            1_000,
        ),
        contact(
            2,
            Some("emmett@hillvalley.edu"),
            Some("555-4385"),
            Some(1),
            LinkPrecedence::Primary,
            2_000,
        ),
        contact(
            3,
            Some("brown@hillvalley.edu"),
            None,
            Some(2),
            LinkPrecedence::Secondary,
            3_000,
        ),
    ]));
    let engine = Idlink::with_store(Arc::clone(&store));

    let view = engine.identify(request(Some("emmett@hillvalley.edu"), None))?;

    assert_eq!(view.primary_contact_id, ContactId(1));
    let contacts = store.snapshot();
    assert_link_invariants(&contacts);
    let hop = contacts.iter().find(|c| c.id == ContactId(3)).unwrap();
    assert_eq!(hop.linked_id, Some(ContactId(1)));
    Ok(())
}

#[test]
fn oldest_wins_regardless_of_match_direction() -> anyhow::Result<()> {
    // Seed two disjoint primaries where the *newer* one is matched first by
    // the bridging request's email clause.
    let store = Arc::new(MemoryStore::seeded(vec![
        contact(
            1,
            Some("old@hillvalley.edu"),
            Some("111111"),
            None,
            LinkPrecedence::Primary,
            1_000,
        ),
        contact(
            2,
            Some("new@hillvalley.edu"),
            Some("222222"),
            None,
            LinkPrecedence::Primary,
            2_000,
        ),
    ]));
    let engine = Idlink::with_store(Arc::clone(&store));

    let view = engine.identify(request(Some("new@hillvalley.edu"), Some("111111")))?;

    assert_eq!(view.primary_contact_id, ContactId(1));
    let contacts = store.snapshot();
    assert_link_invariants(&contacts);
    let demoted = contacts.iter().find(|c| c.id == ContactId(2)).unwrap();
    assert_eq!(demoted.linked_id, Some(ContactId(1)));
    Ok(())
}

#[test]
fn created_at_tie_breaks_by_smaller_id() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::seeded(vec![
        contact(
            1,
            Some("a@hillvalley.edu"),
            Some("111111"),
            None,
            LinkPrecedence::Primary,
            5_000,
        ),
        contact(
            2,
            Some("b@hillvalley.edu"),
            Some("222222"),
            None,
            LinkPrecedence::Primary,
            5_000,
        ),
    ]));
    let engine = Idlink::with_store(Arc::clone(&store));

    let view = engine.identify(request(Some("b@hillvalley.edu"), Some("111111")))?;

    assert_eq!(view.primary_contact_id, ContactId(1));
    assert_link_invariants(&store.snapshot());
    Ok(())
}

#[test]
fn primary_values_lead_every_response() -> anyhow::Result<()> {
    let engine = Idlink::with_store(MemoryStore::new());
    engine.identify(request(Some("first@hillvalley.edu"), Some("999999")))?;
    engine.identify(request(Some("later@hillvalley.edu"), Some("999999")))?;

    let view = engine.identify(request(None, Some("999999")))?;
    assert_eq!(view.emails[0], "first@hillvalley.edu");
    assert_eq!(view.phone_numbers[0], "999999");
    Ok(())
}

#[test]
fn random_workload_preserves_invariants() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let engine = Idlink::with_store(Arc::clone(&store));

    for request in generate_requests(600, 40, 40, 42) {
        engine.identify(request)?;
    }

    let contacts = store.snapshot();
    assert!(!contacts.is_empty());
    assert_link_invariants(&contacts);
    Ok(())
}

#[test]
fn replaying_a_workload_is_idempotent() -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let engine = Idlink::with_store(Arc::clone(&store));
    let requests = generate_requests(200, 25, 25, 7);

    for request in requests.clone() {
        engine.identify(request)?;
    }
    let rows_after_first = store.snapshot().len();

    // Once every fragment is known, replays are pure lookups: no new rows,
    // and every pass returns the same views.
    let mut second_views = Vec::new();
    for request in requests.clone() {
        second_views.push(engine.identify(request)?);
    }
    assert_eq!(store.snapshot().len(), rows_after_first);

    for (request, second) in requests.into_iter().zip(second_views) {
        let third = engine.identify(request)?;
        assert_eq!(third, second);
    }
    assert_eq!(store.snapshot().len(), rows_after_first);
    Ok(())
}
