//! Teams

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_dynamo::{to_attribute_value, to_item};
use tracing::info;
use uuid::Uuid;

use crate::error::StorageResult;
use crate::keys::{primary_key, team_pk, user_pk};
use crate::repository::{PageRequest, Repository};
use crate::store::{Item, WriteCondition, WriteOperation};
use crate::table::EntityType;
use crate::team_membership::TeamMembershipRepository;

/// Members read per page while deleting a team
const DELETE_PAGE_SIZE: i32 = 100;

/// A team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    /// Unique team ID (UUID v4)
    pub id: Uuid,
    /// Team name
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// User that created the team
    pub created_by: Uuid,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Team {
    /// Creates a team with a fresh ID
    #[must_use]
    pub fn new(name: impl Into<String>, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored form of a [`Team`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    partition_key: String,
    sort_key: String,
    entity_type: EntityType,
    #[serde(flatten)]
    team: Team,
}

impl From<&Team> for TeamRecord {
    fn from(team: &Team) -> Self {
        Self {
            partition_key: team_pk(team.id),
            sort_key: team_pk(team.id),
            entity_type: EntityType::Team,
            team: team.clone(),
        }
    }
}

/// Partial update of a team; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamUpdate {
    /// New name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Storage for teams
#[derive(Clone)]
pub struct TeamRepository {
    repository: Repository,
}

impl TeamRepository {
    /// Creates a new team repository
    #[must_use]
    pub const fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Stores a new team
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConditionalCheckFailed` if a team with the same ID exists
    pub async fn create(&self, team: &Team) -> StorageResult<()> {
        self.repository
            .put(&TeamRecord::from(team), Some(WriteCondition::ItemNotExists))
            .await
    }

    /// Retrieves a team by ID
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the team does not exist
    pub async fn get(&self, team_id: Uuid) -> StorageResult<Team> {
        self.repository
            .get(primary_key(team_pk(team_id), team_pk(team_id)), "Team")
            .await
    }

    /// Applies a partial update and returns the updated team
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the team does not exist, or any store or
    /// serialization error
    pub async fn update(&self, team_id: Uuid, update: &TeamUpdate) -> StorageResult<Team> {
        let mut document: Item = to_item(update)?;
        document.insert("updatedAt".to_string(), to_attribute_value(Utc::now())?);

        self.repository
            .update_existing(&team_pk(team_id), &team_pk(team_id), &document, "Team")
            .await
    }

    /// Deletes a team together with all of its membership records
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BatchRetryExhausted` if the store keeps throttling the
    /// deletes, or any store error
    pub async fn delete(&self, team_id: Uuid) -> StorageResult<()> {
        let memberships = TeamMembershipRepository::new(self.repository.clone());
        let mut operations = vec![WriteOperation::Delete(primary_key(
            team_pk(team_id),
            team_pk(team_id),
        ))];

        let mut page = PageRequest::first(DELETE_PAGE_SIZE);
        loop {
            let members = memberships.list_members(team_id, page).await?;
            operations.extend(members.items.iter().map(|membership| {
                WriteOperation::Delete(primary_key(
                    team_pk(team_id),
                    user_pk(membership.user_id),
                ))
            }));

            match members.cursor {
                Some(cursor) => page = PageRequest::after(DELETE_PAGE_SIZE, cursor),
                None => break,
            }
        }

        info!(
            team_id = %team_id,
            records = operations.len(),
            "Deleting team and memberships"
        );
        self.repository.batch_write(operations).await
    }
}
