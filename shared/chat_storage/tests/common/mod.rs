//! Test setup utilities

#![allow(dead_code)]

use std::sync::Arc;

use chat_storage::batch::BatchConfig;
use chat_storage::keys::primary_key;
use chat_storage::store::mock::MockStore;
use chat_storage::store::{AttributeValue, Item};
use chat_storage::table::TableConfig;
use chat_storage::Repository;

/// Table name used by every mock-backed test
pub const TABLE: &str = "chat-test";

/// Wraps a configured mock store into a repository with default batch settings
pub fn mock_repository(store: MockStore) -> (Arc<MockStore>, Repository) {
    mock_repository_with(store, BatchConfig::default())
}

/// Wraps a configured mock store into a repository with the given batch settings
pub fn mock_repository_with(store: MockStore, batch: BatchConfig) -> (Arc<MockStore>, Repository) {
    let store = Arc::new(store);
    let repository = Repository::new(store.clone(), TableConfig::new(TABLE), batch);
    (store, repository)
}

pub fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

/// Key of the n-th seeded note
pub fn note_key(n: usize) -> Item {
    primary_key(format!("NOTE#{n:04}"), format!("NOTE#{n:04}"))
}

/// Raw stored note with storage attributes
pub fn raw_note(n: usize) -> Item {
    let mut item = note_key(n);
    item.insert("entityType".to_string(), s("Note"));
    item.insert("indexOnePartitionKey".to_string(), s("NOTEBOOK#1"));
    item.insert("indexOneSortKey".to_string(), s(&format!("NOTE#{n:04}")));
    item.insert("position".to_string(), AttributeValue::N(n.to_string()));
    item
}

/// Stores `count` notes directly in the mock table
pub fn seed_notes(store: &MockStore, count: usize) {
    for n in 0..count {
        store.insert(TABLE, raw_note(n)).expect("seeded note has a key");
    }
}
