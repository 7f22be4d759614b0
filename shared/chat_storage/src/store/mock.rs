//! In-memory key-value store for tests
//!
//! Evaluates structured queries the way `DynamoDB` does for this table layout, applies
//! the `SET` expressions produced by the update builder, and can be told to leave part
//! of every batch unprocessed or to fail specific batch calls.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::{
    batch_get_item::BatchGetItemError, batch_write_item::BatchWriteItemError,
    update_item::UpdateItemError,
};
use aws_sdk_dynamodb::types::AttributeValue;

use super::{
    BatchGetOutput, BatchWriteOutput, FilterCondition, Item, KeyValueStore, QueryOutput,
    QueryRequest, WriteCondition, WriteOperation,
};
use crate::error::{StorageError, StorageResult};
use crate::table::TableAttribute;
use crate::update_expression::UpdateMutation;

type PrimaryKey = (String, String);
type Table = BTreeMap<PrimaryKey, Item>;

/// How many items each batch call leaves unprocessed
#[derive(Debug, Default)]
struct ThrottlePlan {
    /// Per-call counts, consumed front to back
    scripted: VecDeque<usize>,
    /// Count used once the script is exhausted
    steady: usize,
}

impl ThrottlePlan {
    fn next(&mut self) -> usize {
        self.scripted.pop_front().unwrap_or(self.steady)
    }
}

/// In-memory [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct MockStore {
    tables: Mutex<HashMap<String, Table>>,
    read_throttle: Mutex<ThrottlePlan>,
    write_throttle: Mutex<ThrottlePlan>,
    failing_batch_get_calls: HashSet<usize>,
    failing_batch_write_calls: HashSet<usize>,
    batch_get_calls: AtomicUsize,
    batch_write_calls: AtomicUsize,
    batch_get_chunk_sizes: Mutex<Vec<usize>>,
    batch_write_chunk_sizes: Mutex<Vec<usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn string_attribute<'a>(item: &'a Item, attribute: &str) -> Option<&'a str> {
    match item.get(attribute) {
        Some(AttributeValue::S(value)) => Some(value),
        _ => None,
    }
}

fn primary_key(item: &Item) -> StorageResult<PrimaryKey> {
    let partition = string_attribute(item, &TableAttribute::PartitionKey.to_string());
    let sort = string_attribute(item, &TableAttribute::SortKey.to_string());

    match (partition, sort) {
        (Some(partition), Some(sort)) => Ok((partition.to_string(), sort.to_string())),
        _ => Err(StorageError::SerializationError(
            "item is missing partitionKey or sortKey".to_string(),
        )),
    }
}

fn key_of(item: &Item, attributes: &[String]) -> Item {
    attributes
        .iter()
        .filter_map(|name| item.get(name).map(|value| (name.clone(), value.clone())))
        .collect()
}

/// Sets `value` at a dotted path of attribute names
///
/// Every segment above the last must already hold a map, as the store rejects document
/// paths through missing or non-map attributes.
fn set_path(item: &mut Item, path: &[String], value: AttributeValue) -> StorageResult<()> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(());
    };

    if rest.is_empty() {
        item.insert(head.clone(), value);
        return Ok(());
    }

    match item.get_mut(head) {
        Some(AttributeValue::M(nested)) => set_path(nested, rest, value),
        _ => Err(SdkError::<UpdateItemError>::construction_failure(format!(
            "The document path provided in the update expression is invalid for update: {}",
            path.join(".")
        ))
        .into()),
    }
}

impl MockStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leaves `counts[n]` keys unprocessed on the n-th batch get call, then none
    #[must_use]
    pub fn with_read_throttle(self, counts: Vec<usize>) -> Self {
        *lock(&self.read_throttle) = ThrottlePlan {
            scripted: counts.into(),
            steady: 0,
        };
        self
    }

    /// Leaves `count` keys unprocessed on every batch get call
    #[must_use]
    pub fn with_steady_read_throttle(self, count: usize) -> Self {
        lock(&self.read_throttle).steady = count;
        self
    }

    /// Leaves `counts[n]` operations unprocessed on the n-th batch write call, then none
    #[must_use]
    pub fn with_write_throttle(self, counts: Vec<usize>) -> Self {
        *lock(&self.write_throttle) = ThrottlePlan {
            scripted: counts.into(),
            steady: 0,
        };
        self
    }

    /// Leaves `count` operations unprocessed on every batch write call
    #[must_use]
    pub fn with_steady_write_throttle(self, count: usize) -> Self {
        lock(&self.write_throttle).steady = count;
        self
    }

    /// Fails the n-th batch get call (1-based) with a transport error
    #[must_use]
    pub fn with_failing_batch_get_call(mut self, call: usize) -> Self {
        self.failing_batch_get_calls.insert(call);
        self
    }

    /// Fails the n-th batch write call (1-based) with a transport error
    #[must_use]
    pub fn with_failing_batch_write_call(mut self, call: usize) -> Self {
        self.failing_batch_write_calls.insert(call);
        self
    }

    /// Stores an item directly, bypassing conditions
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationError` if the item has no primary key
    pub fn insert(&self, table: &str, item: Item) -> StorageResult<()> {
        let key = primary_key(&item)?;
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    /// Raw stored items of a table, in primary key order
    #[must_use]
    pub fn items(&self, table: &str) -> Vec<Item> {
        lock(&self.tables)
            .get(table)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of batch get calls received
    #[must_use]
    pub fn batch_get_calls(&self) -> usize {
        self.batch_get_calls.load(Ordering::SeqCst)
    }

    /// Number of batch write calls received
    #[must_use]
    pub fn batch_write_calls(&self) -> usize {
        self.batch_write_calls.load(Ordering::SeqCst)
    }

    /// Key count of every batch get call, in arrival order
    #[must_use]
    pub fn batch_get_chunk_sizes(&self) -> Vec<usize> {
        lock(&self.batch_get_chunk_sizes).clone()
    }

    /// Operation count of every batch write call, in arrival order
    #[must_use]
    pub fn batch_write_chunk_sizes(&self) -> Vec<usize> {
        lock(&self.batch_write_chunk_sizes).clone()
    }

    fn apply_update(item: &mut Item, mutation: &UpdateMutation) -> StorageResult<()> {
        let clauses = mutation
            .update_expression
            .strip_prefix("SET ")
            .ok_or_else(|| {
                StorageError::SerializationError("only SET expressions are supported".to_string())
            })?;

        for clause in clauses.split(", ") {
            let (path, value_alias) = clause.split_once(" = ").ok_or_else(|| {
                StorageError::SerializationError(format!("invalid SET clause: {clause}"))
            })?;
            let path = path
                .split('.')
                .map(|alias| {
                    mutation
                        .expression_attribute_names
                        .get(alias)
                        .cloned()
                        .ok_or_else(|| {
                            StorageError::SerializationError(format!("unknown name alias {alias}"))
                        })
                })
                .collect::<StorageResult<Vec<_>>>()?;
            let value = mutation
                .expression_attribute_values
                .get(value_alias)
                .cloned()
                .ok_or_else(|| {
                    StorageError::SerializationError(format!("unknown value alias {value_alias}"))
                })?;

            set_path(item, &path, value)?;
        }

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MockStore {
    async fn get_item(&self, table: &str, key: Item) -> StorageResult<Option<Item>> {
        let key = primary_key(&key)?;
        Ok(lock(&self.tables)
            .get(table)
            .and_then(|items| items.get(&key))
            .cloned())
    }

    async fn query(&self, table: &str, request: QueryRequest) -> StorageResult<QueryOutput> {
        let condition = &request.key_condition;
        let tables = lock(&self.tables);

        let mut candidates: Vec<&Item> = tables
            .get(table)
            .map(|items| {
                items
                    .values()
                    .filter(|item| {
                        string_attribute(item, &condition.partition_attribute)
                            == Some(condition.partition_value.as_str())
                    })
                    .filter(|item| {
                        string_attribute(item, &condition.sort_attribute).is_some_and(|sort| {
                            condition.sort.as_ref().map_or(true, |sort_condition| {
                                sort_condition.matches(sort)
                            })
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Items come out of the BTreeMap in primary key order, so a stable sort keeps
        // ties on an index sort key deterministic
        candidates.sort_by(|a, b| {
            string_attribute(a, &condition.sort_attribute)
                .cmp(&string_attribute(b, &condition.sort_attribute))
        });
        if !request.scan_forward {
            candidates.reverse();
        }

        if let Some(start_key) = &request.exclusive_start_key {
            let start = primary_key(start_key)?;
            if let Some(position) = candidates
                .iter()
                .position(|item| primary_key(item).is_ok_and(|key| key == start))
            {
                candidates.drain(..=position);
            }
        }

        let limit = request
            .limit
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(usize::MAX);
        let has_more = candidates.len() > limit;
        candidates.truncate(limit);

        let mut key_attributes = vec![
            TableAttribute::PartitionKey.to_string(),
            TableAttribute::SortKey.to_string(),
        ];
        if request.index_name.is_some() {
            key_attributes.push(condition.partition_attribute.clone());
            key_attributes.push(condition.sort_attribute.clone());
        }
        let last_evaluated_key = has_more
            .then(|| candidates.last().map(|item| key_of(item, &key_attributes)))
            .flatten();

        let items = candidates
            .into_iter()
            .filter(|item| {
                request.filters.iter().all(|filter| match filter {
                    FilterCondition::Equals { attribute, value } => item.get(attribute) == Some(value),
                })
            })
            .cloned()
            .collect();

        Ok(QueryOutput {
            items,
            last_evaluated_key,
        })
    }

    async fn batch_get_items(&self, table: &str, keys: Vec<Item>) -> StorageResult<BatchGetOutput> {
        let call = self.batch_get_calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.batch_get_chunk_sizes).push(keys.len());

        if self.failing_batch_get_calls.contains(&call) {
            return Err(SdkError::<BatchGetItemError>::timeout_error("injected failure").into());
        }
        if keys.len() > 100 {
            return Err(StorageError::SerializationError(
                "too many keys in one batch get".to_string(),
            ));
        }

        let withheld = lock(&self.read_throttle).next().min(keys.len());
        let mut keys = keys;
        let unprocessed_keys = keys.split_off(keys.len() - withheld);

        let tables = lock(&self.tables);
        let items = keys
            .iter()
            .map(primary_key)
            .collect::<StorageResult<Vec<_>>>()?
            .into_iter()
            .filter_map(|key| tables.get(table).and_then(|items| items.get(&key)).cloned())
            .collect();

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
        let key = primary_key(&item)?;
        let mut tables = lock(&self.tables);
        let items = tables.entry(table.to_string()).or_default();

        if let Some(condition) = condition {
            if !condition.holds(items.contains_key(&key)) {
                return Err(StorageError::ConditionalCheckFailed(table.to_string()));
            }
        }

        items.insert(key, item);
        Ok(())
    }

    async fn update_item(&self, table: &str, mutation: UpdateMutation) -> StorageResult<Item> {
        let key = primary_key(&mutation.key)?;
        let mut tables = lock(&self.tables);
        let items = tables.entry(table.to_string()).or_default();

        let existing = items.get(&key);
        if let Some(condition) = mutation.condition {
            if !condition.holds(existing.is_some()) {
                return Err(StorageError::ConditionalCheckFailed(table.to_string()));
            }
        }

        // Applied to a copy so a rejected clause leaves the stored item untouched
        let mut item = existing.cloned().unwrap_or_else(|| mutation.key.clone());
        Self::apply_update(&mut item, &mutation)?;
        items.insert(key, item.clone());
        Ok(item)
    }

    async fn delete_item(&self, table: &str, key: Item) -> StorageResult<()> {
        let key = primary_key(&key)?;
        if let Some(items) = lock(&self.tables).get_mut(table) {
            items.remove(&key);
        }
        Ok(())
    }

    async fn batch_write_items(
        &self,
        table: &str,
        operations: Vec<WriteOperation>,
    ) -> StorageResult<BatchWriteOutput> {
        let call = self.batch_write_calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.batch_write_chunk_sizes).push(operations.len());

        if self.failing_batch_write_calls.contains(&call) {
            return Err(SdkError::<BatchWriteItemError>::timeout_error("injected failure").into());
        }
        if operations.len() > 25 {
            return Err(StorageError::SerializationError(
                "too many operations in one batch write".to_string(),
            ));
        }

        let withheld = lock(&self.write_throttle).next().min(operations.len());
        let mut operations = operations;
        let unprocessed = operations.split_off(operations.len() - withheld);

        let mut tables = lock(&self.tables);
        let items = tables.entry(table.to_string()).or_default();
        for operation in operations {
            match operation {
                WriteOperation::Put(item) => {
                    items.insert(primary_key(&item)?, item);
                }
                WriteOperation::Delete(key) => {
                    items.remove(&primary_key(&key)?);
                }
            }
        }

        Ok(BatchWriteOutput { unprocessed })
    }
}
