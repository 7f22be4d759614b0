mod common;

use chat_storage::error::StorageErrorKind;
use chat_storage::message::{Message, MessageRepository};
use chat_storage::store::mock::MockStore;
use chat_storage::team::{Team, TeamRepository, TeamUpdate};
use chat_storage::team_membership::{TeamMembership, TeamMembershipRepository, TeamRole};
use chat_storage::user::{User, UserPreferencesUpdate, UserRepository, UserUpdate};
use chat_storage::PageRequest;
use chrono::{Duration, Utc};
use common::{mock_repository, TABLE};
use pretty_assertions::assert_eq;
use uuid::Uuid;

#[tokio::test]
async fn test_user_lifecycle() {
    let (_, repository) = mock_repository(MockStore::new());
    let users = UserRepository::new(repository);

    let mut user = User::new("Ada", "ada@example.com");
    user.preferences.theme = Some("light".to_string());
    users.create(&user).await.unwrap();

    assert_eq!(users.get(user.id).await.unwrap(), user);

    let err = users.create(&user).await.unwrap_err();
    assert_eq!(err.kind(), StorageErrorKind::Conflict);

    let updated = users
        .update(
            user.id,
            &UserUpdate {
                display_name: Some("Ada L.".to_string()),
                preferences: Some(UserPreferencesUpdate {
                    timezone: Some("Europe/London".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.display_name, "Ada L.");
    assert_eq!(updated.email, user.email);
    assert_eq!(updated.preferences.timezone.as_deref(), Some("Europe/London"));
    // Sibling fields of the nested document survive the update
    assert_eq!(updated.preferences.theme.as_deref(), Some("light"));
    assert!(updated.updated_at >= user.updated_at);
}

#[tokio::test]
async fn test_get_many_users_skips_unknown_ids() {
    let (store, repository) = mock_repository(MockStore::new());
    let users = UserRepository::new(repository);

    let ada = User::new("Ada", "ada@example.com");
    let grace = User::new("Grace", "grace@example.com");
    users.create(&ada).await.unwrap();
    users.create(&grace).await.unwrap();

    let mut found = users
        .get_many(&[ada.id, Uuid::new_v4(), grace.id])
        .await
        .unwrap();
    found.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    assert_eq!(found, vec![ada, grace]);
    assert_eq!(store.batch_get_calls(), 1);
}

#[tokio::test]
async fn test_missing_user_is_not_found() {
    let (_, repository) = mock_repository(MockStore::new());
    let users = UserRepository::new(repository);

    let err = users.get(Uuid::new_v4()).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "User not found");
}

#[tokio::test]
async fn test_update_missing_user_is_not_found() {
    let (store, repository) = mock_repository(MockStore::new());
    let users = UserRepository::new(repository);

    let err = users
        .update(
            Uuid::new_v4(),
            &UserUpdate {
                display_name: Some("Ghost".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), StorageErrorKind::NotFound);
    assert_eq!(err.to_string(), "User not found");
    assert!(store.items(TABLE).is_empty());
}

#[tokio::test]
async fn test_update_missing_team_is_not_found() {
    let (store, repository) = mock_repository(MockStore::new());
    let teams = TeamRepository::new(repository);
    let existing = Team::new("Platform", Uuid::new_v4());
    teams.create(&existing).await.unwrap();
    let before = store.items(TABLE);

    let err = teams
        .update(
            Uuid::new_v4(),
            &TeamUpdate {
                name: Some("Ghost".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), StorageErrorKind::NotFound);
    assert_eq!(err.to_string(), "Team not found");
    assert_eq!(store.items(TABLE), before);
}

#[tokio::test]
async fn test_team_membership_flow() {
    let (_, repository) = mock_repository(MockStore::new());
    let teams = TeamRepository::new(repository.clone());
    let memberships = TeamMembershipRepository::new(repository);

    let owner = Uuid::new_v4();
    let member = Uuid::new_v4();
    let team = Team::new("Platform", owner);
    teams.create(&team).await.unwrap();

    memberships
        .add_member(&TeamMembership::new(team.id, owner, TeamRole::Admin))
        .await
        .unwrap();
    memberships
        .add_member(&TeamMembership::new(team.id, member, TeamRole::Member))
        .await
        .unwrap();

    let err = memberships
        .add_member(&TeamMembership::new(team.id, member, TeamRole::Admin))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), StorageErrorKind::Conflict);

    assert!(memberships.is_member(team.id, member).await.unwrap());
    assert!(!memberships.is_member(team.id, Uuid::new_v4()).await.unwrap());
    assert_eq!(
        memberships.get_membership(team.id, owner).await.unwrap().role,
        TeamRole::Admin
    );

    let page = memberships
        .list_members(team.id, PageRequest::default())
        .await
        .unwrap();
    let mut listed: Vec<Uuid> = page.items.iter().map(|m| m.user_id).collect();
    listed.sort();
    let mut expected = vec![owner, member];
    expected.sort();
    assert_eq!(listed, expected);
    assert_eq!(page.cursor, None);

    memberships.remove_member(team.id, member).await.unwrap();
    assert!(!memberships.is_member(team.id, member).await.unwrap());
}

#[tokio::test]
async fn test_list_members_paginates() {
    let (_, repository) = mock_repository(MockStore::new());
    let memberships = TeamMembershipRepository::new(repository);
    let team_id = Uuid::new_v4();

    for _ in 0..5 {
        memberships
            .add_member(&TeamMembership::new(team_id, Uuid::new_v4(), TeamRole::Member))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut page = PageRequest::first(2);
    loop {
        let result = memberships.list_members(team_id, page).await.unwrap();
        assert!(result.items.len() <= 2);
        seen.extend(result.items.into_iter().map(|m| m.user_id));
        match result.cursor {
            Some(cursor) => page = PageRequest::after(2, cursor),
            None => break,
        }
    }

    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn test_list_teams_for_user_newest_first() {
    let (_, repository) = mock_repository(MockStore::new());
    let teams = TeamRepository::new(repository.clone());
    let memberships = TeamMembershipRepository::new(repository);
    let user_id = Uuid::new_v4();

    let now = Utc::now();
    let mut created = Vec::new();
    for (index, name) in ["first", "second", "third"].into_iter().enumerate() {
        let team = Team::new(name, user_id);
        teams.create(&team).await.unwrap();

        let mut membership = TeamMembership::new(team.id, user_id, TeamRole::Member);
        membership.joined_at = now + Duration::minutes(i64::try_from(index).unwrap());
        memberships.add_member(&membership).await.unwrap();
        created.push(team);
    }

    let first = memberships
        .list_teams_for_user(user_id, PageRequest::first(2))
        .await
        .unwrap();
    let names: Vec<&str> = first.items.iter().map(|team| team.name.as_str()).collect();
    assert_eq!(names, vec!["third", "second"]);

    let rest = memberships
        .list_teams_for_user(user_id, PageRequest::after(2, first.cursor.unwrap()))
        .await
        .unwrap();
    assert_eq!(rest.items, vec![created[0].clone()]);
    assert_eq!(rest.cursor, None);
}

#[tokio::test]
async fn test_team_update_and_delete() {
    let (store, repository) = mock_repository(MockStore::new());
    let teams = TeamRepository::new(repository.clone());
    let memberships = TeamMembershipRepository::new(repository);

    let team = Team::new("Platform", Uuid::new_v4());
    teams.create(&team).await.unwrap();
    for _ in 0..30 {
        memberships
            .add_member(&TeamMembership::new(team.id, Uuid::new_v4(), TeamRole::Member))
            .await
            .unwrap();
    }

    let updated = teams
        .update(
            team.id,
            &TeamUpdate {
                description: Some("Infra and tooling".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Platform");
    assert_eq!(updated.description.as_deref(), Some("Infra and tooling"));

    teams.delete(team.id).await.unwrap();

    assert!(teams.get(team.id).await.unwrap_err().is_not_found());
    assert!(store.items(TABLE).is_empty());
    // Team record plus 30 memberships in chunks of 25
    assert_eq!(store.batch_write_chunk_sizes(), vec![25, 6]);
}

#[tokio::test]
async fn test_message_timeline_and_replies() {
    let (_, repository) = mock_repository(MockStore::new());
    let messages = MessageRepository::new(repository);
    let conversation_id = Uuid::new_v4();
    let author = Uuid::new_v4();

    let mut question = Message::new(conversation_id, author, "Deploy today?");
    question.created_at = Utc::now() - Duration::minutes(10);
    question.seen_by = vec![author];
    messages.create(&question).await.unwrap();

    let mut answers = Vec::new();
    for minute in 1..=3 {
        let mut reply = Message::reply(&question, Uuid::new_v4(), format!("answer {minute}"));
        reply.created_at = question.created_at + Duration::minutes(minute);
        messages.create(&reply).await.unwrap();
        answers.push(reply);
    }

    assert_eq!(messages.get(question.id).await.unwrap(), question);

    let timeline = messages
        .list_by_conversation(conversation_id, PageRequest::default())
        .await
        .unwrap();
    let bodies: Vec<&str> = timeline.items.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(
        bodies,
        vec!["answer 3", "answer 2", "answer 1", "Deploy today?"]
    );

    let replies = messages
        .list_replies(question.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(replies.items, answers);
}

#[tokio::test]
async fn test_message_edit() {
    let (store, repository) = mock_repository(MockStore::new());
    let messages = MessageRepository::new(repository);

    let message = Message::new(Uuid::new_v4(), Uuid::new_v4(), "helo");
    messages.create(&message).await.unwrap();

    let edited = messages.edit(message.id, "hello").await.unwrap();
    assert_eq!(edited.body, "hello");
    assert_eq!(edited.created_at, message.created_at);
    assert!(edited.edited_at.is_some());

    let err = messages.edit(Uuid::new_v4(), "ghost").await.unwrap_err();
    assert_eq!(err.kind(), StorageErrorKind::NotFound);
    assert_eq!(err.to_string(), "Message not found");
    assert_eq!(store.items(TABLE).len(), 1);
}
