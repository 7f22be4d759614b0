//! Key-value store boundary of the storage core
//!
//! The repository façade only talks to a [`KeyValueStore`]. [`DynamoDbStore`] is the
//! production implementation; the `mock` module provides an in-memory one for tests.

mod dynamodb;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

use std::collections::HashMap;
use std::fmt::Display;

use async_trait::async_trait;
pub use aws_sdk_dynamodb::types::AttributeValue;
pub use dynamodb::DynamoDbStore;

use crate::error::StorageResult;
use crate::update_expression::UpdateMutation;

/// A stored record, or a key addressing one
pub type Item = HashMap<String, AttributeValue>;

/// Unit of work of a batch write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    /// Create or replace the item
    Put(Item),
    /// Delete the item under this key
    Delete(Item),
}

/// Precondition of a single put or update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Only create; fail if an item already exists under the key
    ItemNotExists,
    /// Only modify; fail if no item exists under the key
    ItemExists,
}

impl WriteCondition {
    /// Alias the condition expression uses for the partition key attribute
    pub const PARTITION_KEY_ALIAS: &'static str = "#cond_pk";

    /// `ConditionExpression` of the condition
    #[must_use]
    pub fn expression(self) -> String {
        match self {
            Self::ItemNotExists => format!("attribute_not_exists({})", Self::PARTITION_KEY_ALIAS),
            Self::ItemExists => format!("attribute_exists({})", Self::PARTITION_KEY_ALIAS),
        }
    }

    /// Whether the condition holds for a key that does or does not hold an item
    #[must_use]
    pub const fn holds(self, exists: bool) -> bool {
        match self {
            Self::ItemNotExists => !exists,
            Self::ItemExists => exists,
        }
    }
}

/// Condition on the sort key of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    /// Sort key equals the value
    Equals(String),
    /// Sort key starts with the prefix
    BeginsWith(String),
    /// Sort key lies in the inclusive range
    Between(String, String),
}

impl SortKeyCondition {
    /// Whether a sort key value satisfies this condition
    #[must_use]
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            Self::Equals(value) => sort_key == value,
            Self::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
            Self::Between(low, high) => low.as_str() <= sort_key && sort_key <= high.as_str(),
        }
    }
}

/// Key condition of a query
#[derive(Debug, Clone, PartialEq)]
pub struct KeyCondition {
    /// Attribute holding the partition key of the queried index
    pub partition_attribute: String,
    /// Partition to read
    pub partition_value: String,
    /// Attribute holding the sort key of the queried index
    pub sort_attribute: String,
    /// Optional range restriction on the sort key
    pub sort: Option<SortKeyCondition>,
}

/// Post-read filter applied by the store
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    /// Attribute equals the value
    Equals {
        /// Attribute name
        attribute: String,
        /// Expected value
        value: AttributeValue,
    },
}

/// Range query against the table or one of its indexes
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// Secondary index to query, `None` for the primary key
    pub index_name: Option<String>,
    /// Partition and sort key restriction
    pub key_condition: KeyCondition,
    /// Filters evaluated after the key condition
    pub filters: Vec<FilterCondition>,
    /// Key to continue after
    pub exclusive_start_key: Option<Item>,
    /// Ascending sort key order when true
    pub scan_forward: bool,
    /// Maximum number of items to evaluate
    pub limit: Option<i32>,
}

/// Query expressions in `DynamoDB` syntax
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    /// `KeyConditionExpression`
    pub key_condition_expression: String,
    /// `FilterExpression`, if any filter was requested
    pub filter_expression: Option<String>,
    /// `ExpressionAttributeNames`
    pub names: HashMap<String, String>,
    /// `ExpressionAttributeValues`
    pub values: HashMap<String, AttributeValue>,
}

impl QueryRequest {
    /// Renders the key condition and filters into expression strings and alias maps
    #[must_use]
    pub fn render(&self) -> RenderedQuery {
        let condition = &self.key_condition;
        let mut names = HashMap::from([(
            "#pk".to_string(),
            condition.partition_attribute.clone(),
        )]);
        let mut values = HashMap::from([(
            ":pk".to_string(),
            AttributeValue::S(condition.partition_value.clone()),
        )]);
        let mut key_condition_expression = "#pk = :pk".to_string();

        if let Some(sort) = &condition.sort {
            names.insert("#sk".to_string(), condition.sort_attribute.clone());
            let clause = match sort {
                SortKeyCondition::Equals(value) => {
                    values.insert(":sk".to_string(), AttributeValue::S(value.clone()));
                    "#sk = :sk"
                }
                SortKeyCondition::BeginsWith(prefix) => {
                    values.insert(":sk".to_string(), AttributeValue::S(prefix.clone()));
                    "begins_with(#sk, :sk)"
                }
                SortKeyCondition::Between(low, high) => {
                    values.insert(":sk_low".to_string(), AttributeValue::S(low.clone()));
                    values.insert(":sk_high".to_string(), AttributeValue::S(high.clone()));
                    "#sk BETWEEN :sk_low AND :sk_high"
                }
            };
            key_condition_expression.push_str(" AND ");
            key_condition_expression.push_str(clause);
        }

        let filter_expression = (!self.filters.is_empty()).then(|| {
            self.filters
                .iter()
                .enumerate()
                .map(|(index, filter)| match filter {
                    FilterCondition::Equals { attribute, value } => {
                        names.insert(format!("#f{index}"), attribute.clone());
                        values.insert(format!(":f{index}"), value.clone());
                        format!("#f{index} = :f{index}")
                    }
                })
                .collect::<Vec<_>>()
                .join(" AND ")
        });

        RenderedQuery {
            key_condition_expression,
            filter_expression,
            names,
            values,
        }
    }
}

/// One page of query results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Items in index order
    pub items: Vec<Item>,
    /// Key to continue from, present when more items may follow
    pub last_evaluated_key: Option<Item>,
}

/// Result of one batch get call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    /// Items found
    pub items: Vec<Item>,
    /// Keys the store did not process in this call
    pub unprocessed_keys: Vec<Item>,
}

/// Result of one batch write call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutput {
    /// Operations the store did not process in this call
    pub unprocessed: Vec<WriteOperation>,
}

/// Operations the storage core needs from a wide-column key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a single item by its full key
    async fn get_item(&self, table: &str, key: Item) -> StorageResult<Option<Item>>;

    /// Runs a range query against the table or a secondary index
    async fn query(&self, table: &str, request: QueryRequest) -> StorageResult<QueryOutput>;

    /// Reads up to 100 items by key in one call
    async fn batch_get_items(&self, table: &str, keys: Vec<Item>) -> StorageResult<BatchGetOutput>;

    /// Creates or replaces an item
    async fn put_item(
        &self,
        table: &str,
        item: Item,
        condition: Option<WriteCondition>,
    ) -> StorageResult<()>;

    /// Applies an update expression and returns the item as it is after the update
    ///
    /// A mutation carrying a condition that does not hold fails with
    /// `StorageError::ConditionalCheckFailed` and leaves the item untouched.
    async fn update_item(&self, table: &str, mutation: UpdateMutation) -> StorageResult<Item>;

    /// Deletes an item by its full key
    async fn delete_item(&self, table: &str, key: Item) -> StorageResult<()>;

    /// Applies up to 25 puts/deletes in one call
    async fn batch_write_items(
        &self,
        table: &str,
        operations: Vec<WriteOperation>,
    ) -> StorageResult<BatchWriteOutput>;
}

/// Builds a string set attribute
///
/// Returns `None` for an empty collection since the store cannot hold empty sets.
pub fn string_set<I, S>(values: I) -> Option<AttributeValue>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut members: Vec<String> = values.into_iter().map(Into::into).collect();
    members.sort();
    members.dedup();

    (!members.is_empty()).then_some(AttributeValue::Ss(members))
}

/// Builds a number set attribute
///
/// Returns `None` for an empty collection since the store cannot hold empty sets.
pub fn number_set<I, N>(values: I) -> Option<AttributeValue>
where
    I: IntoIterator<Item = N>,
    N: Display,
{
    let mut members: Vec<String> = values.into_iter().map(|n| n.to_string()).collect();
    members.sort();
    members.dedup();

    (!members.is_empty()).then_some(AttributeValue::Ns(members))
}
