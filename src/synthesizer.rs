//! # Secondary Synthesizer
//!
//! Decides whether the submitted fragment carries information the group does
//! not already hold and, if so, materializes it as a new secondary contact.
//!
//! A new row is created only when both email and phone were supplied and at
//! least one of them is absent from the group. Single-field requests are
//! pure lookups even when the value is new, and a fully-known pair creates
//! nothing; re-submitting it is idempotent.

use crate::consolidator::ConsolidatedGroup;
use crate::error::StoreError;
use crate::model::{Contact, NormalizedRequest};
use crate::store::{ContactTx, NewContact};
use tracing::debug;

/// Create a secondary for genuinely new information, appending it to the
/// group's membership. Returns the created contact, if any.
pub fn synthesize(
    tx: &mut dyn ContactTx,
    group: &mut ConsolidatedGroup,
    request: &NormalizedRequest,
) -> Result<Option<Contact>, StoreError> {
    let (Some(email), Some(phone)) = (&request.email, &request.phone) else {
        return Ok(None);
    };

    let email_known = group
        .members
        .iter()
        .any(|member| member.email.as_deref() == Some(email.as_str()));
    let phone_known = group
        .members
        .iter()
        .any(|member| member.phone_number.as_deref() == Some(phone.as_str()));
    if email_known && phone_known {
        return Ok(None);
    }

    let created = tx.insert(NewContact::secondary(
        Some(email.clone()),
        Some(phone.clone()),
        group.primary.id,
    ))?;
    debug!(id = %created.id, primary = %group.primary.id, "created secondary contact");

    // The new row has the latest created_at and the highest id, so pushing
    // it keeps the membership order total.
    group.members.push(created.clone());
    Ok(Some(created))
}
