//! Generic single-table repository
//!
//! Every domain repository is built on [`Repository`]. It owns the store handle and the
//! table layout, and composes the update builder, the batch executor, the cursor codec
//! and the cleanser so that no raw storage attribute ever reaches a caller.

use std::sync::Arc;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_dynamo::{from_item, to_item};
use tracing::{debug, error};

use crate::batch::{self, BatchConfig};
use crate::cleanse::cleanse;
use crate::cursor;
use crate::error::{StorageError, StorageResult};
use crate::keys::primary_key;
use crate::store::{
    DynamoDbStore, FilterCondition, Item, KeyCondition, KeyValueStore, QueryRequest,
    SortKeyCondition, WriteCondition, WriteOperation,
};
use crate::table::{EntityType, TableAttribute, TableConfig, TableIndex};
use crate::update_expression::build_update;

/// Parameters of an indexed range query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    /// Index to query
    pub index: TableIndex,
    /// Partition key value on the chosen index
    pub partition_key: String,
    /// Optional sort key restriction
    pub sort_key: Option<SortKeyCondition>,
    /// Only return records of this kind
    pub entity_type: Option<EntityType>,
    /// Maximum number of records to evaluate for this page
    pub limit: Option<i32>,
    /// Cursor returned with the previous page of the same query
    pub cursor: Option<String>,
    /// Descending sort key order
    pub descending: bool,
}

impl QueryParams {
    /// Query for one partition of an index
    #[must_use]
    pub fn new(index: TableIndex, partition_key: impl Into<String>) -> Self {
        Self {
            index,
            partition_key: partition_key.into(),
            ..Self::default()
        }
    }

    /// Restricts the sort key to a prefix
    #[must_use]
    pub fn begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.sort_key = Some(SortKeyCondition::BeginsWith(prefix.into()));
        self
    }

    /// Restricts the sort key to an inclusive range
    #[must_use]
    pub fn between(mut self, low: impl Into<String>, high: impl Into<String>) -> Self {
        self.sort_key = Some(SortKeyCondition::Between(low.into(), high.into()));
        self
    }

    /// Keeps only records of the given kind
    #[must_use]
    pub const fn entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Applies a page request
    #[must_use]
    pub fn page(mut self, page: PageRequest) -> Self {
        self.limit = page.limit;
        self.cursor = page.cursor;
        self
    }

    /// Returns records in descending sort key order
    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.descending = true;
        self
    }
}

/// Page size and position requested by a caller
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Maximum number of records to evaluate
    pub limit: Option<i32>,
    /// Cursor of the previous page
    pub cursor: Option<String>,
}

impl PageRequest {
    /// First page with the given size
    #[must_use]
    pub const fn first(limit: i32) -> Self {
        Self {
            limit: Some(limit),
            cursor: None,
        }
    }

    /// Next page after `cursor` with the given size
    #[must_use]
    pub const fn after(limit: i32, cursor: String) -> Self {
        Self {
            limit: Some(limit),
            cursor: Some(cursor),
        }
    }
}

/// One page of cleansed records
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Records in index order
    pub items: Vec<T>,
    /// Cursor for the next page, `None` when the query is exhausted
    pub cursor: Option<String>,
}

/// Logs a failed operation with its context
fn report(operation: &'static str, table: &str, subject: &str, err: &StorageError) {
    if err.is_not_found() {
        debug!(operation, table, subject, error = %err, "Item not found");
    } else {
        error!(
            operation,
            table,
            subject,
            kind = %err.kind(),
            error = %err,
            "Storage operation failed"
        );
    }
}

fn into_entity<T: DeserializeOwned>(item: Item) -> StorageResult<T> {
    Ok(from_item(cleanse(item))?)
}

fn partition_of(key: &Item) -> &str {
    match key.get(&TableAttribute::PartitionKey.to_string()) {
        Some(AttributeValue::S(value)) => value.as_str(),
        _ => "",
    }
}

/// Storage façade shared by all domain repositories
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn KeyValueStore>,
    table: TableConfig,
    batch: BatchConfig,
}

impl Repository {
    /// Creates a new repository
    ///
    /// # Arguments
    ///
    /// * `store` - Key-value store holding the table
    /// * `table` - Table and index names
    /// * `batch` - Chunking and backoff settings for batch operations
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, table: TableConfig, batch: BatchConfig) -> Self {
        Self {
            store,
            table,
            batch,
        }
    }

    /// Creates a repository backed by `DynamoDB`
    ///
    /// # Arguments
    ///
    /// * `dynamodb_client` - Pre-configured `DynamoDB` client
    /// * `table` - Table and index names
    /// * `batch` - Chunking and backoff settings for batch operations
    #[must_use]
    pub fn dynamodb(
        dynamodb_client: Arc<DynamoDbClient>,
        table: TableConfig,
        batch: BatchConfig,
    ) -> Self {
        Self::new(Arc::new(DynamoDbStore::new(dynamodb_client)), table, batch)
    }

    /// Reads a single record by its full key
    ///
    /// # Arguments
    ///
    /// * `key` - Partition and sort key of the record
    /// * `entity` - Label used in the not-found error, e.g. `"User"`
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record exists under the key, or any store
    /// or deserialization error
    pub async fn get<T: DeserializeOwned>(&self, key: Item, entity: &str) -> StorageResult<T> {
        let table = self.table.table_name.as_str();

        let result = match self.store.get_item(table, key).await {
            Ok(Some(item)) => into_entity(item),
            Ok(None) => Err(StorageError::NotFound {
                entity: entity.to_string(),
            }),
            Err(e) => Err(e),
        };

        result.inspect_err(|e| report("get", table, entity, e))
    }

    /// Runs a range query and returns one page of cleansed records
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MalformedCursor` if the cursor does not decode, before any
    /// store call is made, or any store or deserialization error
    pub async fn query<T: DeserializeOwned>(&self, params: QueryParams) -> StorageResult<Page<T>> {
        let table = self.table.table_name.as_str();
        let partition_key = params.partition_key.clone();

        self.run_query(params)
            .await
            .inspect_err(|e| report("query", table, &partition_key, e))
    }

    async fn run_query<T: DeserializeOwned>(&self, params: QueryParams) -> StorageResult<Page<T>> {
        let exclusive_start_key = params.cursor.as_deref().map(cursor::decode).transpose()?;

        let request = QueryRequest {
            index_name: self.table.index_name(params.index).map(str::to_string),
            key_condition: KeyCondition {
                partition_attribute: params.index.partition_attribute().to_string(),
                partition_value: params.partition_key,
                sort_attribute: params.index.sort_attribute().to_string(),
                sort: params.sort_key,
            },
            filters: params
                .entity_type
                .map(|entity_type| FilterCondition::Equals {
                    attribute: TableAttribute::EntityType.to_string(),
                    value: AttributeValue::S(entity_type.to_string()),
                })
                .into_iter()
                .collect(),
            exclusive_start_key,
            scan_forward: !params.descending,
            limit: params.limit,
        };

        let output = self.store.query(&self.table.table_name, request).await?;

        let items = output
            .items
            .into_iter()
            .map(into_entity)
            .collect::<StorageResult<Vec<T>>>()?;
        let cursor = output
            .last_evaluated_key
            .as_ref()
            .map(cursor::encode)
            .transpose()?;

        Ok(Page { items, cursor })
    }

    /// Applies a partial update to a record and returns the record after the update
    ///
    /// Nested maps in `update` address paths inside the stored document; any other value
    /// replaces the attribute at its path, and every map above it must already be stored.
    /// No existence check is made: updating a missing record creates it from the key and
    /// the updated attributes. Use [`Repository::update_existing`] for domain records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::EmptyUpdate` if `update` sets nothing, or any store or
    /// deserialization error
    pub async fn partial_update<T: DeserializeOwned>(
        &self,
        partition_key: &str,
        sort_key: &str,
        update: &Item,
    ) -> StorageResult<T> {
        self.apply_update(partition_key, sort_key, update, None)
            .await
            .inspect_err(|e| report("partial_update", &self.table.table_name, partition_key, e))
    }

    /// Applies a partial update to a record that must already exist
    ///
    /// The existence check is part of the store write, so a record deleted concurrently
    /// is never recreated from the update alone.
    ///
    /// # Arguments
    ///
    /// * `partition_key` - Partition key of the record
    /// * `sort_key` - Sort key of the record
    /// * `update` - Partial document, as for [`Repository::partial_update`]
    /// * `entity` - Label used in the not-found error, e.g. `"User"`
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record exists under the key,
    /// `StorageError::EmptyUpdate` if `update` sets nothing, or any store or
    /// deserialization error
    pub async fn update_existing<T: DeserializeOwned>(
        &self,
        partition_key: &str,
        sort_key: &str,
        update: &Item,
        entity: &str,
    ) -> StorageResult<T> {
        self.apply_update(
            partition_key,
            sort_key,
            update,
            Some(WriteCondition::ItemExists),
        )
        .await
        .map_err(|e| match e {
            StorageError::ConditionalCheckFailed(_) => StorageError::NotFound {
                entity: entity.to_string(),
            },
            e => e,
        })
        .inspect_err(|e| report("update_existing", &self.table.table_name, partition_key, e))
    }

    async fn apply_update<T: DeserializeOwned>(
        &self,
        partition_key: &str,
        sort_key: &str,
        update: &Item,
        condition: Option<WriteCondition>,
    ) -> StorageResult<T> {
        let table = self.table.table_name.as_str();

        let mut mutation = build_update(primary_key(partition_key, sort_key), update)?;
        if let Some(condition) = condition {
            mutation = mutation.with_condition(condition);
        }
        debug!(
            table,
            partition_key,
            expression = %mutation.update_expression,
            "Applying partial update"
        );

        let item = self.store.update_item(table, mutation).await?;
        into_entity(item)
    }

    /// Reads many records by key, retrying keys the store leaves unprocessed
    ///
    /// Result order is unrelated to key order and missing records are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BatchRetryExhausted` if the store keeps throttling, or any
    /// store or deserialization error
    pub async fn batch_get<T: DeserializeOwned>(&self, keys: Vec<Item>) -> StorageResult<Vec<T>> {
        let table = self.table.table_name.as_str();
        let count = keys.len().to_string();

        let result = async {
            batch::batch_get(self.store.as_ref(), table, keys, &self.batch)
                .await?
                .into_iter()
                .map(|item| from_item(item).map_err(StorageError::from))
                .collect::<StorageResult<Vec<T>>>()
        }
        .await;

        result.inspect_err(|e| report("batch_get", table, &count, e))
    }

    /// Applies many puts and deletes, retrying operations the store leaves unprocessed
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BatchRetryExhausted` if the store keeps throttling, or any
    /// store error
    pub async fn batch_write(&self, operations: Vec<WriteOperation>) -> StorageResult<()> {
        let table = self.table.table_name.as_str();
        let count = operations.len().to_string();

        batch::batch_write(self.store.as_ref(), table, operations, &self.batch)
            .await
            .inspect_err(|e| report("batch_write", table, &count, e))
    }

    /// Serializes a storage record and writes it
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConditionalCheckFailed` if `condition` does not hold, or any
    /// store or serialization error
    pub async fn put<R: Serialize>(
        &self,
        record: &R,
        condition: Option<WriteCondition>,
    ) -> StorageResult<()> {
        let item = to_item(record).map_err(StorageError::from).inspect_err(|e| {
            report("put", &self.table.table_name, "", e);
        })?;

        self.put_item(item, condition).await
    }

    /// Writes a raw record
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConditionalCheckFailed` if `condition` does not hold, or any
    /// store error
    pub async fn put_item(&self, item: Item, condition: Option<WriteCondition>) -> StorageResult<()> {
        let table = self.table.table_name.as_str();
        let partition_key = partition_of(&item).to_string();

        self.store
            .put_item(table, item, condition)
            .await
            .inspect_err(|e| report("put", table, &partition_key, e))
    }

    /// Deletes a record by its full key; deleting a missing record succeeds
    ///
    /// # Errors
    ///
    /// Returns any store error
    pub async fn delete(&self, partition_key: &str, sort_key: &str) -> StorageResult<()> {
        let table = self.table.table_name.as_str();

        self.store
            .delete_item(table, primary_key(partition_key, sort_key))
            .await
            .inspect_err(|e| report("delete", table, partition_key, e))
    }
}
