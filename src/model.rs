//! # Data Model
//!
//! Core data structures for contact identity reconciliation: contact records,
//! link precedence, the identify request/response surface, and timestamp helpers.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// A wall-clock instant as UTC epoch milliseconds.
///
/// Milliseconds rather than seconds because `created_at` is the ordering key
/// for primary selection and requests can land within the same second.
pub type Timestamp = i64;

/// Current UTC time as epoch milliseconds.
pub fn now_millis() -> Timestamp {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as Timestamp
}

/// Compact identifier for contacts, issued monotonically by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactId(pub i64);

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K{}", self.0)
    }
}

/// Whether a contact is the canonical representative of its link group
/// or a subordinate merged into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkPrecedence::Primary => "primary",
            LinkPrecedence::Secondary => "secondary",
        }
    }
}

impl fmt::Display for LinkPrecedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored contact record. The sole entity of the system.
///
/// Invariants maintained by the consolidator:
/// - `link_precedence == Primary` iff `linked_id` is `None`
/// - `linked_id` always points directly at the group's primary (one hop)
/// - the primary is the group member with the earliest `created_at`,
///   ties broken by smallest id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Soft-delete marker owned by an administrative path; never written
    /// or interpreted by this engine.
    pub deleted_at: Option<Timestamp>,
}

impl Contact {
    /// The root of this contact's link group: its primary's id, or its own
    /// id when it is itself a primary.
    pub fn root(&self) -> ContactId {
        self.linked_id.unwrap_or(self.id)
    }

    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }
}

/// Phone number as submitted by callers: either a string or a bare number.
/// Numeric input is normalized to its decimal string form before any
/// comparison or storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhoneNumber {
    Text(String),
    Digits(u64),
}

impl PhoneNumber {
    /// Normalized string form; empty strings and the bare number zero are
    /// treated as absent.
    pub fn normalized(&self) -> Option<String> {
        match self {
            PhoneNumber::Text(s) if s.is_empty() => None,
            PhoneNumber::Text(s) => Some(s.clone()),
            PhoneNumber::Digits(0) => None,
            PhoneNumber::Digits(n) => Some(n.to_string()),
        }
    }
}

impl From<&str> for PhoneNumber {
    fn from(s: &str) -> Self {
        PhoneNumber::Text(s.to_string())
    }
}

/// The identify operation's request surface. At least one of the two fields
/// must carry a non-empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    pub email: Option<String>,
    pub phone_number: Option<PhoneNumber>,
}

impl IdentifyRequest {
    pub fn new(email: Option<&str>, phone: Option<&str>) -> Self {
        Self {
            email: email.map(str::to_string),
            phone_number: phone.map(PhoneNumber::from),
        }
    }
}

/// A request after normalization: phone stringified, empty strings dropped,
/// at least one field guaranteed present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl NormalizedRequest {
    /// Logical lock keys for the concurrency guard, one per supplied field.
    /// Prefixed so an email can never collide with a phone of equal text.
    pub fn lock_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(email) = &self.email {
            keys.push(format!("e:{email}"));
        }
        if let Some(phone) = &self.phone {
            keys.push(format!("p:{phone}"));
        }
        keys
    }
}

/// The aggregate identity view returned by the identify operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityView {
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_digits_normalize_to_decimal_string() {
        assert_eq!(
            PhoneNumber::Digits(123456).normalized(),
            Some("123456".to_string())
        );
        assert_eq!(
            PhoneNumber::Text("555-1234".to_string()).normalized(),
            Some("555-1234".to_string())
        );
        assert_eq!(PhoneNumber::Text(String::new()).normalized(), None);
        assert_eq!(PhoneNumber::Digits(0).normalized(), None);
    }

    #[test]
    fn link_precedence_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&LinkPrecedence::Primary).unwrap(),
            "\"primary\""
        );
        assert_eq!(
            serde_json::from_str::<LinkPrecedence>("\"secondary\"").unwrap(),
            LinkPrecedence::Secondary
        );
    }

    #[test]
    fn request_accepts_numeric_phone() {
        let request: IdentifyRequest =
            serde_json::from_str(r#"{"email":"doc@hillvalley.edu","phoneNumber":123456}"#).unwrap();
        assert_eq!(request.phone_number, Some(PhoneNumber::Digits(123456)));

        let request: IdentifyRequest = serde_json::from_str(r#"{"phoneNumber":"123456"}"#).unwrap();
        assert_eq!(
            request.phone_number,
            Some(PhoneNumber::Text("123456".to_string()))
        );
    }

    #[test]
    fn root_is_linked_id_or_self() {
        let mut contact = Contact {
            id: ContactId(7),
            email: None,
            phone_number: None,
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        };
        assert_eq!(contact.root(), ContactId(7));
        contact.linked_id = Some(ContactId(3));
        assert_eq!(contact.root(), ContactId(3));
    }

    #[test]
    fn lock_keys_are_prefixed_per_field() {
        let normalized = NormalizedRequest {
            email: Some("a@b.c".to_string()),
            phone: Some("a@b.c".to_string()),
        };
        assert_eq!(normalized.lock_keys(), vec!["e:a@b.c", "p:a@b.c"]);
    }
}
