//! `DynamoDB` implementation of the key-value store

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{DeleteRequest, KeysAndAttributes, PutRequest, ReturnValue, WriteRequest},
    Client as DynamoDbClient,
};
use tracing::debug;

use super::{
    BatchGetOutput, BatchWriteOutput, Item, KeyValueStore, QueryOutput, QueryRequest,
    WriteCondition, WriteOperation,
};
use crate::error::{StorageError, StorageResult};
use crate::table::TableAttribute;
use crate::update_expression::UpdateMutation;

/// Key-value store backed by a `DynamoDB` client
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    dynamodb_client: Arc<DynamoDbClient>,
}

impl DynamoDbStore {
    /// Creates a new store
    ///
    /// # Arguments
    ///
    /// * `dynamodb_client` - Pre-configured `DynamoDB` client
    #[must_use]
    pub const fn new(dynamodb_client: Arc<DynamoDbClient>) -> Self {
        Self { dynamodb_client }
    }

    /// Builds the store-side request for a write operation
    fn build_write_request(operation: WriteOperation) -> StorageResult<WriteRequest> {
        let request = match operation {
            WriteOperation::Put(item) => WriteRequest::builder().put_request(
                PutRequest::builder()
                    .set_item(Some(item))
                    .build()
                    .map_err(|e| {
                        StorageError::SerializationError(format!(
                            "Failed to build put request: {e:?}"
                        ))
                    })?,
            ),
            WriteOperation::Delete(key) => WriteRequest::builder().delete_request(
                DeleteRequest::builder()
                    .set_key(Some(key))
                    .build()
                    .map_err(|e| {
                        StorageError::SerializationError(format!(
                            "Failed to build delete request: {e:?}"
                        ))
                    })?,
            ),
        };

        Ok(request.build())
    }

    /// Maps a store-side write request back to a write operation
    fn from_write_request(request: WriteRequest) -> Option<WriteOperation> {
        match (request.put_request, request.delete_request) {
            (Some(put), _) => Some(WriteOperation::Put(put.item)),
            (None, Some(delete)) => Some(WriteOperation::Delete(delete.key)),
            (None, None) => None,
        }
    }
}

#[async_trait]
impl KeyValueStore for DynamoDbStore {
    async fn get_item(&self, table: &str, key: Item) -> StorageResult<Option<Item>> {
        let response = self
            .dynamodb_client
            .get_item()
            .table_name(table)
            .set_key(Some(key))
            .send()
            .await?;

        Ok(response.item)
    }

    async fn query(&self, table: &str, request: QueryRequest) -> StorageResult<QueryOutput> {
        let rendered = request.render();
        debug!(
            table,
            index = ?request.index_name,
            key_condition = %rendered.key_condition_expression,
            "Querying DynamoDB"
        );

        let response = self
            .dynamodb_client
            .query()
            .table_name(table)
            .set_index_name(request.index_name)
            .key_condition_expression(rendered.key_condition_expression)
            .set_filter_expression(rendered.filter_expression)
            .set_expression_attribute_names(Some(rendered.names))
            .set_expression_attribute_values(Some(rendered.values))
            .set_exclusive_start_key(request.exclusive_start_key)
            .scan_index_forward(request.scan_forward)
            .set_limit(request.limit)
            .send()
            .await?;

        Ok(QueryOutput {
            items: response.items.unwrap_or_default(),
            last_evaluated_key: response.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }

    async fn batch_get_items(&self, table: &str, keys: Vec<Item>) -> StorageResult<BatchGetOutput> {
        let keys_and_attributes = KeysAndAttributes::builder()
            .set_keys(Some(keys))
            .build()
            .map_err(|e| {
                StorageError::SerializationError(format!("Failed to build batch get keys: {e:?}"))
            })?;

        let response = self
            .dynamodb_client
            .batch_get_item()
            .request_items(table, keys_and_attributes)
            .send()
            .await?;

        let items = response
            .responses
            .and_then(|mut responses| responses.remove(table))
            .unwrap_or_default();
        let unprocessed_keys = response
            .unprocessed_keys
            .and_then(|mut unprocessed| unprocessed.remove(table))
            .map(|keys_and_attributes| keys_and_attributes.keys)
            .unwrap_or_default();

        Ok(BatchGetOutput {
            items,
            unprocessed_keys,
        })
    }

    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<WriteCondition>,
    ) -> StorageResult<()> {
        let mut request = self
            .dynamodb_client
            .put_item()
            .table_name(table)
            .set_item(Some(item));

        if let Some(condition) = condition {
            request = request
                .condition_expression(condition.expression())
                .expression_attribute_names(
                    WriteCondition::PARTITION_KEY_ALIAS,
                    TableAttribute::PartitionKey.to_string(),
                );
        }

        request.send().await.map_err(|err| {
            if matches!(
                err,
                SdkError::ServiceError(ref svc) if svc.err().is_conditional_check_failed_exception()
            ) {
                StorageError::ConditionalCheckFailed(table.to_string())
            } else {
                err.into()
            }
        })?;

        Ok(())
    }

    async fn update_item(&self, table: &str, mutation: UpdateMutation) -> StorageResult<Item> {
        let mut names = mutation.expression_attribute_names;
        if mutation.condition.is_some() {
            names.insert(
                WriteCondition::PARTITION_KEY_ALIAS.to_string(),
                TableAttribute::PartitionKey.to_string(),
            );
        }

        let response = self
            .dynamodb_client
            .update_item()
            .table_name(table)
            .set_key(Some(mutation.key))
            .update_expression(mutation.update_expression)
            .set_condition_expression(mutation.condition.map(WriteCondition::expression))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(mutation.expression_attribute_values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|err| {
                if matches!(
                    err,
                    SdkError::ServiceError(ref svc) if svc.err().is_conditional_check_failed_exception()
                ) {
                    StorageError::ConditionalCheckFailed(table.to_string())
                } else {
                    err.into()
                }
            })?;

        Ok(response.attributes.unwrap_or_default())
    }

    async fn delete_item(&self, table: &str, key: Item) -> StorageResult<()> {
        self.dynamodb_client
            .delete_item()
            .table_name(table)
            .set_key(Some(key))
            .send()
            .await?;

        Ok(())
    }

    async fn batch_write_items(
        &self,
        table: &str,
        operations: Vec<WriteOperation>,
    ) -> StorageResult<BatchWriteOutput> {
        let write_requests = operations
            .into_iter()
            .map(Self::build_write_request)
            .collect::<Result<Vec<_>, _>>()?;

        let response = self
            .dynamodb_client
            .batch_write_item()
            .request_items(table, write_requests)
            .send()
            .await?;

        let unprocessed = response
            .unprocessed_items
            .and_then(|mut unprocessed| unprocessed.remove(table))
            .unwrap_or_default()
            .into_iter()
            .filter_map(Self::from_write_request)
            .collect();

        Ok(BatchWriteOutput { unprocessed })
    }
}
