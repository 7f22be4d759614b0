//! Error types for single-table storage operations

use std::time::Duration;

use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::{
    batch_get_item::BatchGetItemError, batch_write_item::BatchWriteItemError,
    delete_item::DeleteItemError, get_item::GetItemError, put_item::PutItemError,
    query::QueryError, update_item::UpdateItemError,
};
use strum::Display;
use thiserror::Error;

use crate::store::{Item, WriteOperation};

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Items a batch operation still had pending when it gave up
#[derive(Debug, Clone, PartialEq)]
pub enum Unprocessed {
    /// Keys of a batch read
    Keys(Vec<Item>),
    /// Put/delete operations of a batch write
    Writes(Vec<WriteOperation>),
}

impl Unprocessed {
    /// Number of pending items
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Keys(keys) => keys.len(),
            Self::Writes(writes) => writes.len(),
        }
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Discriminant of a [`StorageError`], for callers deciding retry or response policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StorageErrorKind {
    /// Single-item lookup miss
    NotFound,
    /// Pagination cursor could not be decoded into a key
    MalformedCursor,
    /// Batch backoff ceiling exceeded with items still unprocessed
    BatchRetryExhausted,
    /// Update document produced no assignments
    InvalidUpdate,
    /// Conditional write rejected by the store
    Conflict,
    /// Store or transport failure
    Store,
    /// Item could not be converted to or from its typed form
    Serialization,
}

/// Storage error types for single-table operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// No item exists under the requested key
    #[error("{entity} not found")]
    NotFound {
        /// Caller-supplied label of the entity that was looked up
        entity: String,
    },

    /// Pagination cursor is not a well-formed key
    #[error("Malformed pagination cursor: {0}")]
    MalformedCursor(String),

    /// Store kept throttling a batch past the backoff ceiling
    #[error("Batch retry exhausted after backing off {backoff:?}: {} items unprocessed", .unprocessed.len())]
    BatchRetryExhausted {
        /// Backoff that exceeded the ceiling
        backoff: Duration,
        /// Items the store never completed
        unprocessed: Unprocessed,
    },

    /// Update document had nothing to set
    #[error("Update document contains no attributes to set")]
    EmptyUpdate,

    /// Conditional write failed
    #[error("Conditional check failed for item in {0}")]
    ConditionalCheckFailed(String),

    /// Failed to get item from `DynamoDB`
    #[error("Failed to get item from DynamoDB: {0:?}")]
    DynamoDbGetError(#[from] SdkError<GetItemError>),

    /// Failed to query items from `DynamoDB`
    #[error("Failed to query items from DynamoDB: {0:?}")]
    DynamoDbQueryError(#[from] SdkError<QueryError>),

    /// Failed to batch get items from `DynamoDB`
    #[error("Failed to batch get items from DynamoDB: {0:?}")]
    DynamoDbBatchGetError(#[from] SdkError<BatchGetItemError>),

    /// Failed to put item into `DynamoDB`
    #[error("Failed to put item into DynamoDB: {0:?}")]
    DynamoDbPutError(#[from] SdkError<PutItemError>),

    /// Failed to update item in `DynamoDB`
    #[error("Failed to update item in DynamoDB: {0:?}")]
    DynamoDbUpdateError(#[from] SdkError<UpdateItemError>),

    /// Failed to delete item from `DynamoDB`
    #[error("Failed to delete item from DynamoDB: {0:?}")]
    DynamoDbDeleteError(#[from] SdkError<DeleteItemError>),

    /// Failed to batch write items to `DynamoDB`
    #[error("Failed to batch write items to DynamoDB: {0:?}")]
    DynamoDbBatchWriteError(#[from] SdkError<BatchWriteItemError>),

    /// Failed to convert an item
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StorageError {
    /// Returns the kind of this error
    #[must_use]
    pub const fn kind(&self) -> StorageErrorKind {
        match self {
            Self::NotFound { .. } => StorageErrorKind::NotFound,
            Self::MalformedCursor(_) => StorageErrorKind::MalformedCursor,
            Self::BatchRetryExhausted { .. } => StorageErrorKind::BatchRetryExhausted,
            Self::EmptyUpdate => StorageErrorKind::InvalidUpdate,
            Self::ConditionalCheckFailed(_) => StorageErrorKind::Conflict,
            Self::DynamoDbGetError(_)
            | Self::DynamoDbQueryError(_)
            | Self::DynamoDbBatchGetError(_)
            | Self::DynamoDbPutError(_)
            | Self::DynamoDbUpdateError(_)
            | Self::DynamoDbDeleteError(_)
            | Self::DynamoDbBatchWriteError(_) => StorageErrorKind::Store,
            Self::SerializationError(_) => StorageErrorKind::Serialization,
        }
    }

    /// Checks if this error is a single-item lookup miss
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_dynamo::Error> for StorageError {
    fn from(err: serde_dynamo::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
