//! Chat messages
//!
//! Index one holds the conversation timeline and index two the reply thread under a
//! parent message. Both are ordered by creation time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_dynamo::{to_attribute_value, to_item};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::keys::{conversation_pk, message_index_sk, message_pk, primary_key, MESSAGE_PREFIX};
use crate::repository::{Page, PageRequest, QueryParams, Repository};
use crate::store::{string_set, AttributeValue, Item, WriteCondition};
use crate::table::{EntityType, TableIndex};

/// Attribute holding the set of users that have seen a message
const SEEN_BY: &str = "seenBy";

/// A chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID (UUID v4)
    pub id: Uuid,
    /// Conversation the message belongs to
    pub conversation_id: Uuid,
    /// Author of the message
    pub author_id: Uuid,
    /// Message this one replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Message text
    pub body: String,
    /// Users that have seen the message, stored as a string set
    #[serde(default, skip_serializing)]
    pub seen_by: Vec<Uuid>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last edit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates a top-level message with a fresh ID
    #[must_use]
    pub fn new(conversation_id: Uuid, author_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            author_id,
            parent_id: None,
            body: body.into(),
            seen_by: Vec::new(),
            created_at: Utc::now(),
            edited_at: None,
        }
    }

    /// Creates a reply to `parent` in the same conversation
    #[must_use]
    pub fn reply(parent: &Self, author_id: Uuid, body: impl Into<String>) -> Self {
        Self {
            parent_id: Some(parent.id),
            ..Self::new(parent.conversation_id, author_id, body)
        }
    }
}

/// Stored form of a [`Message`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    partition_key: String,
    sort_key: String,
    entity_type: EntityType,
    index_one_partition_key: String,
    index_one_sort_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_two_partition_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_two_sort_key: Option<String>,
    #[serde(flatten)]
    message: Message,
}

impl From<&Message> for MessageRecord {
    fn from(message: &Message) -> Self {
        let timeline_sk = message_index_sk(message.created_at, message.id);

        Self {
            partition_key: message_pk(message.id),
            sort_key: message_pk(message.id),
            entity_type: EntityType::Message,
            index_one_partition_key: conversation_pk(message.conversation_id),
            index_one_sort_key: timeline_sk.clone(),
            index_two_partition_key: message.parent_id.map(message_pk),
            index_two_sort_key: message.parent_id.map(|_| timeline_sk),
            message: message.clone(),
        }
    }
}

impl MessageRecord {
    /// Converts the record into a raw item, storing `seenBy` as a string set
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationError` if the record cannot be serialized
    pub fn into_item(self) -> StorageResult<Item> {
        let seen_by = string_set(self.message.seen_by.iter().map(Uuid::to_string));
        let mut item: Item = to_item(self)?;

        if let Some(seen_by) = seen_by {
            item.insert(SEEN_BY.to_string(), seen_by);
        }

        Ok(item)
    }
}

/// Storage for chat messages
#[derive(Clone)]
pub struct MessageRepository {
    repository: Repository,
}

impl MessageRepository {
    /// Creates a new message repository
    #[must_use]
    pub const fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Stores a new message
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConditionalCheckFailed` if a message with the same ID exists
    pub async fn create(&self, message: &Message) -> StorageResult<()> {
        let item = MessageRecord::from(message).into_item()?;
        self.repository
            .put_item(item, Some(WriteCondition::ItemNotExists))
            .await
    }

    /// Retrieves a message by ID
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the message does not exist
    pub async fn get(&self, message_id: Uuid) -> StorageResult<Message> {
        self.repository
            .get(
                primary_key(message_pk(message_id), message_pk(message_id)),
                "Message",
            )
            .await
    }

    /// Lists the messages of a conversation, newest first
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MalformedCursor` for a bad cursor, or any store error
    pub async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        page: PageRequest,
    ) -> StorageResult<Page<Message>> {
        let params = QueryParams::new(TableIndex::IndexOne, conversation_pk(conversation_id))
            .begins_with(MESSAGE_PREFIX)
            .entity_type(EntityType::Message)
            .page(page)
            .descending();

        self.repository.query(params).await
    }

    /// Lists the replies to a message, oldest first
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MalformedCursor` for a bad cursor, or any store error
    pub async fn list_replies(
        &self,
        parent_id: Uuid,
        page: PageRequest,
    ) -> StorageResult<Page<Message>> {
        let params = QueryParams::new(TableIndex::IndexTwo, message_pk(parent_id))
            .begins_with(MESSAGE_PREFIX)
            .entity_type(EntityType::Message)
            .page(page);

        self.repository.query(params).await
    }

    /// Replaces the body of an existing message and returns the edited message
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the message does not exist
    pub async fn edit(&self, message_id: Uuid, body: &str) -> StorageResult<Message> {
        let document = Item::from([
            ("body".to_string(), AttributeValue::S(body.to_string())),
            ("editedAt".to_string(), to_attribute_value(Utc::now())?),
        ]);

        self.repository
            .update_existing(
                &message_pk(message_id),
                &message_pk(message_id),
                &document,
                "Message",
            )
            .await
    }
}
