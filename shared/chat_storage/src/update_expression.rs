//! Partial-update expression builder
//!
//! Turns a partial, possibly nested update document into a `DynamoDB` `SET` expression.
//! Nested maps address paths inside the stored document; every other value, lists and
//! `NULL` included, replaces the attribute at its path as a whole.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::error::{StorageError, StorageResult};
use crate::store::{Item, WriteCondition};

/// Mutation ready to be sent as an `UpdateItem` call
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateMutation {
    /// Full key of the target record
    pub key: Item,
    /// `SET` expression
    pub update_expression: String,
    /// `ExpressionAttributeNames`
    pub expression_attribute_names: HashMap<String, String>,
    /// `ExpressionAttributeValues`
    pub expression_attribute_values: HashMap<String, AttributeValue>,
    /// Precondition on the target record, checked before any assignment applies
    pub condition: Option<WriteCondition>,
}

impl UpdateMutation {
    /// Only applies the mutation if `condition` holds for the target record
    #[must_use]
    pub fn with_condition(mut self, condition: WriteCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// Aliases and clauses accumulated while walking one update document
#[derive(Debug, Default)]
struct PendingMutation {
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
    clauses: Vec<String>,
}

/// A document position already aliased: its alias token and its `#a.#b` path
struct Parent<'a> {
    alias: &'a str,
    path: &'a str,
}

impl PendingMutation {
    fn walk(&mut self, parent: Option<&Parent<'_>>, fields: &Item, skip: &Item) {
        let mut names: Vec<&String> = fields
            .keys()
            .filter(|name| !skip.contains_key(*name))
            .collect();
        names.sort();

        for (position, name) in names.into_iter().enumerate() {
            let (alias, path) = match parent {
                Some(parent) => {
                    let alias = format!("{}_{position}", parent.alias);
                    let path = format!("{}.#{alias}", parent.path);
                    (alias, path)
                }
                None => {
                    let alias = format!("f{position}");
                    let path = format!("#{alias}");
                    (alias, path)
                }
            };
            let name_alias = format!("#{alias}");
            self.names.insert(name_alias.clone(), name.clone());

            match &fields[name] {
                AttributeValue::M(nested) => {
                    let before = self.clauses.len();
                    let parent = Parent {
                        alias: &alias,
                        path: &path,
                    };
                    self.walk(Some(&parent), nested, &Item::new());

                    // Nothing below this map was set; an unused alias is rejected by the store
                    if self.clauses.len() == before {
                        self.names.remove(&name_alias);
                    }
                }
                value => {
                    let value_alias = format!(":{alias}");
                    self.values.insert(value_alias.clone(), value.clone());
                    self.clauses.push(format!("{path} = {value_alias}"));
                }
            }
        }
    }
}

/// Builds the `SET` mutation for a partial update of the record under `key`
///
/// Top-level fields that name a key attribute are skipped, since primary key attributes
/// cannot be updated in place. Fields are visited in name order, so identical documents
/// produce identical expressions.
///
/// # Errors
///
/// Returns `StorageError::EmptyUpdate` if the document yields no assignment
pub fn build_update(key: Item, document: &Item) -> StorageResult<UpdateMutation> {
    let mut pending = PendingMutation::default();
    pending.walk(None, document, &key);

    if pending.clauses.is_empty() {
        return Err(StorageError::EmptyUpdate);
    }

    Ok(UpdateMutation {
        key,
        update_expression: format!("SET {}", pending.clauses.join(", ")),
        expression_attribute_names: pending.names,
        expression_attribute_values: pending.values,
        condition: None,
    })
}
