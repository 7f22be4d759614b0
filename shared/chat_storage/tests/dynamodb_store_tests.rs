//! Tests against `DynamoDB` running in `LocalStack`
//!
//! Run with `cargo test -- --ignored` while `LocalStack` listens on port 4566.

use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
    ProjectionType, ScalarAttributeType,
};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chat_storage::batch::BatchConfig;
use chat_storage::error::StorageErrorKind;
use chat_storage::message::{Message, MessageRepository};
use chat_storage::table::{TableAttribute, TableConfig};
use chat_storage::team::{Team, TeamRepository};
use chat_storage::team_membership::{TeamMembership, TeamMembershipRepository, TeamRole};
use chat_storage::user::{User, UserRepository, UserUpdate};
use chat_storage::{PageRequest, Repository};
use pretty_assertions::assert_eq;
use tokio::time::sleep;
use uuid::Uuid;

/// Test configuration for LocalStack
const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";
const TEST_REGION: &str = "us-east-1";

/// Test context that automatically cleans up the table on drop
struct TestContext {
    repository: Repository,
    table_name: String,
    dynamodb_client: Arc<DynamoDbClient>,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Clean up the table
        let client = self.dynamodb_client.clone();
        let table = self.table_name.clone();

        // Use tokio runtime to delete table
        let handle = tokio::runtime::Handle::try_current();
        if let Ok(handle) = handle {
            handle.spawn(async move {
                let _ = client.delete_table().table_name(&table).send().await;
            });
        }
    }
}

fn key_schema(attribute: TableAttribute, key_type: KeyType) -> KeySchemaElement {
    KeySchemaElement::builder()
        .attribute_name(attribute.to_string())
        .key_type(key_type)
        .build()
        .expect("Failed to build key schema")
}

fn string_attribute(attribute: TableAttribute) -> AttributeDefinition {
    AttributeDefinition::builder()
        .attribute_name(attribute.to_string())
        .attribute_type(ScalarAttributeType::S)
        .build()
        .expect("Failed to build attribute definition")
}

fn index(name: &str, partition: TableAttribute, sort: TableAttribute) -> GlobalSecondaryIndex {
    GlobalSecondaryIndex::builder()
        .index_name(name)
        .key_schema(key_schema(partition, KeyType::Hash))
        .key_schema(key_schema(sort, KeyType::Range))
        .projection(
            Projection::builder()
                .projection_type(ProjectionType::All)
                .build(),
        )
        .build()
        .expect("Failed to build GSI")
}

/// Creates a test setup with a unique table
async fn setup_test() -> TestContext {
    // Create unique table name
    let table_name = format!("test-chat-{}", Uuid::new_v4());
    let table = TableConfig::new(&table_name);

    // Configure AWS SDK for LocalStack
    let credentials = Credentials::from_keys(
        "test", // AWS_ACCESS_KEY_ID
        "test", // AWS_SECRET_ACCESS_KEY
        None,   // no session token
    );
    let config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(LOCALSTACK_ENDPOINT)
        .region(Region::new(TEST_REGION))
        .credentials_provider(credentials)
        .load()
        .await;

    let dynamodb_client = Arc::new(DynamoDbClient::new(&config));

    let mut request = dynamodb_client
        .create_table()
        .table_name(&table_name)
        .billing_mode(BillingMode::PayPerRequest)
        // Primary key
        .key_schema(key_schema(TableAttribute::PartitionKey, KeyType::Hash))
        .key_schema(key_schema(TableAttribute::SortKey, KeyType::Range))
        // Secondary indexes
        .global_secondary_indexes(index(
            &table.index_one_name,
            TableAttribute::IndexOnePartitionKey,
            TableAttribute::IndexOneSortKey,
        ))
        .global_secondary_indexes(index(
            &table.index_two_name,
            TableAttribute::IndexTwoPartitionKey,
            TableAttribute::IndexTwoSortKey,
        ));
    for attribute in [
        TableAttribute::PartitionKey,
        TableAttribute::SortKey,
        TableAttribute::IndexOnePartitionKey,
        TableAttribute::IndexOneSortKey,
        TableAttribute::IndexTwoPartitionKey,
        TableAttribute::IndexTwoSortKey,
    ] {
        request = request.attribute_definitions(string_attribute(attribute));
    }
    request.send().await.expect("Failed to create test table");

    // Wait for table to be ready
    sleep(Duration::from_millis(100)).await;

    let repository = Repository::dynamodb(dynamodb_client.clone(), table, BatchConfig::default());

    TestContext {
        repository,
        table_name,
        dynamodb_client,
    }
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_user_round_trip() {
    let ctx = setup_test().await;
    let users = UserRepository::new(ctx.repository.clone());

    let user = User::new("Ada", "ada@example.com");
    users.create(&user).await.unwrap();
    assert_eq!(users.get(user.id).await.unwrap(), user);

    let err = users.create(&user).await.unwrap_err();
    assert_eq!(err.kind(), StorageErrorKind::Conflict);

    let updated = users
        .update(
            user.id,
            &UserUpdate {
                display_name: Some("Ada L.".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.display_name, "Ada L.");

    let err = users.get(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), StorageErrorKind::NotFound);
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_batch_get_across_chunks() {
    let ctx = setup_test().await;
    let users = UserRepository::new(ctx.repository.clone());

    let mut ids = Vec::new();
    for n in 0..120 {
        let user = User::new(format!("user {n}"), format!("user{n}@example.com"));
        users.create(&user).await.unwrap();
        ids.push(user.id);
    }

    let found = users.get_many(&ids).await.unwrap();
    assert_eq!(found.len(), 120);
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_teams_for_user_via_index() {
    let ctx = setup_test().await;
    let teams = TeamRepository::new(ctx.repository.clone());
    let memberships = TeamMembershipRepository::new(ctx.repository.clone());
    let user_id = Uuid::new_v4();

    let mut created = Vec::new();
    for name in ["first", "second", "third"] {
        let team = Team::new(name, user_id);
        teams.create(&team).await.unwrap();
        memberships
            .add_member(&TeamMembership::new(team.id, user_id, TeamRole::Member))
            .await
            .unwrap();
        created.push(team);
        sleep(Duration::from_millis(5)).await;
    }

    let first = memberships
        .list_teams_for_user(user_id, PageRequest::first(2))
        .await
        .unwrap();
    let names: Vec<&str> = first.items.iter().map(|team| team.name.as_str()).collect();
    assert_eq!(names, vec!["third", "second"]);

    let cursor = first.cursor.expect("one more team");
    let rest = memberships
        .list_teams_for_user(user_id, PageRequest::after(2, cursor))
        .await
        .unwrap();
    assert_eq!(rest.items, vec![created[0].clone()]);

    teams.delete(created[0].id).await.unwrap();
    assert!(!memberships.is_member(created[0].id, user_id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_message_replies_and_edit() {
    let ctx = setup_test().await;
    let messages = MessageRepository::new(ctx.repository.clone());

    let mut question = Message::new(Uuid::new_v4(), Uuid::new_v4(), "Deploy today?");
    question.seen_by = vec![question.author_id];
    messages.create(&question).await.unwrap();

    let reply = Message::reply(&question, Uuid::new_v4(), "Yes");
    messages.create(&reply).await.unwrap();

    let replies = messages
        .list_replies(question.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(replies.items, vec![reply]);

    let edited = messages.edit(question.id, "Deploy tomorrow?").await.unwrap();
    assert_eq!(edited.body, "Deploy tomorrow?");
    assert_eq!(edited.seen_by, question.seen_by);
}
