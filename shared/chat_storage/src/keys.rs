//! Key generation for the single chat table
//!
//! Pure functions producing partition, sort and index shadow keys. Timestamps in sort
//! keys are RFC 3339 with millisecond precision in UTC, so lexicographic order is
//! chronological order.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::store::Item;
use crate::table::TableAttribute;

pub const USER_PREFIX: &str = "USER#";
pub const TEAM_PREFIX: &str = "TEAM#";
pub const MESSAGE_PREFIX: &str = "MESSAGE#";
pub const CONVERSATION_PREFIX: &str = "CONVERSATION#";
pub const TEAM_MEMBERSHIP_PREFIX: &str = "TEAM_MEMBERSHIP#";

/// Full primary key of a record
#[must_use]
pub fn primary_key(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Item {
    HashMap::from([
        (
            TableAttribute::PartitionKey.to_string(),
            AttributeValue::S(partition_key.into()),
        ),
        (
            TableAttribute::SortKey.to_string(),
            AttributeValue::S(sort_key.into()),
        ),
    ])
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Pattern: `USER#<user_id>`, used as both partition and sort key of a user
#[must_use]
pub fn user_pk(user_id: Uuid) -> String {
    format!("{USER_PREFIX}{user_id}")
}

/// Pattern: `TEAM#<team_id>`, used as both partition and sort key of a team
#[must_use]
pub fn team_pk(team_id: Uuid) -> String {
    format!("{TEAM_PREFIX}{team_id}")
}

/// Pattern: `MESSAGE#<message_id>`
///
/// Partition and sort key of a message, and the reply-thread partition of index two.
#[must_use]
pub fn message_pk(message_id: Uuid) -> String {
    format!("{MESSAGE_PREFIX}{message_id}")
}

/// Pattern: `CONVERSATION#<conversation_id>`, the timeline partition of index one
#[must_use]
pub fn conversation_pk(conversation_id: Uuid) -> String {
    format!("{CONVERSATION_PREFIX}{conversation_id}")
}

/// Index one sort key of a membership, ordering a user's teams by join time
///
/// Pattern: `TEAM_MEMBERSHIP#<joined_at>`
#[must_use]
pub fn membership_index_sk(joined_at: DateTime<Utc>) -> String {
    format!("{TEAM_MEMBERSHIP_PREFIX}{}", timestamp(joined_at))
}

/// Timeline sort key of a message on both indexes
///
/// Pattern: `MESSAGE#<created_at>#<message_id>`; the id breaks ties between messages
/// created in the same millisecond.
#[must_use]
pub fn message_index_sk(created_at: DateTime<Utc>, message_id: Uuid) -> String {
    format!("{MESSAGE_PREFIX}{}#{message_id}", timestamp(created_at))
}
