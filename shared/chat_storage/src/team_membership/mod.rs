//! Team memberships
//!
//! A membership is a relationship record in the team's partition, keyed by the member's
//! user key. Index one mirrors it into the user's partition, ordered by join time, so a
//! user's teams can be listed without a scan.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::keys::{
    membership_index_sk, primary_key, team_pk, user_pk, TEAM_MEMBERSHIP_PREFIX, USER_PREFIX,
};
use crate::repository::{Page, PageRequest, QueryParams, Repository};
use crate::store::WriteCondition;
use crate::table::{EntityType, TableIndex};
use crate::team::Team;

/// Role of a member within a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    /// Manages the team and its members
    Admin,
    /// Regular member
    Member,
}

/// Membership of a user in a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMembership {
    /// Team the user belongs to
    pub team_id: Uuid,
    /// Member
    pub user_id: Uuid,
    /// Role in the team
    pub role: TeamRole,
    /// When the user joined
    pub joined_at: DateTime<Utc>,
}

impl TeamMembership {
    /// Membership starting now
    #[must_use]
    pub fn new(team_id: Uuid, user_id: Uuid, role: TeamRole) -> Self {
        Self {
            team_id,
            user_id,
            role,
            joined_at: Utc::now(),
        }
    }
}

/// Stored form of a [`TeamMembership`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMembershipRecord {
    partition_key: String,
    sort_key: String,
    entity_type: EntityType,
    index_one_partition_key: String,
    index_one_sort_key: String,
    #[serde(flatten)]
    membership: TeamMembership,
}

impl From<&TeamMembership> for TeamMembershipRecord {
    fn from(membership: &TeamMembership) -> Self {
        Self {
            partition_key: team_pk(membership.team_id),
            sort_key: user_pk(membership.user_id),
            entity_type: EntityType::TeamUserRelationship,
            index_one_partition_key: user_pk(membership.user_id),
            index_one_sort_key: membership_index_sk(membership.joined_at),
            membership: membership.clone(),
        }
    }
}

/// Storage for team memberships
#[derive(Clone)]
pub struct TeamMembershipRepository {
    repository: Repository,
}

impl TeamMembershipRepository {
    /// Creates a new membership repository
    #[must_use]
    pub const fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Adds a user to a team
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConditionalCheckFailed` if the user is already a member
    pub async fn add_member(&self, membership: &TeamMembership) -> StorageResult<()> {
        self.repository
            .put(
                &TeamMembershipRecord::from(membership),
                Some(WriteCondition::ItemNotExists),
            )
            .await
    }

    /// Retrieves the membership of a user in a team
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user is not a member
    pub async fn get_membership(
        &self,
        team_id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<TeamMembership> {
        self.repository
            .get(
                primary_key(team_pk(team_id), user_pk(user_id)),
                "TeamMembership",
            )
            .await
    }

    /// Checks whether a user is a member of a team
    ///
    /// # Errors
    ///
    /// Returns any store error other than a missing membership
    pub async fn is_member(&self, team_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        match self.get_membership(team_id, user_id).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lists the members of a team, one page at a time
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MalformedCursor` for a bad cursor, or any store error
    pub async fn list_members(
        &self,
        team_id: Uuid,
        page: PageRequest,
    ) -> StorageResult<Page<TeamMembership>> {
        let params = QueryParams::new(TableIndex::Primary, team_pk(team_id))
            .begins_with(USER_PREFIX)
            .entity_type(EntityType::TeamUserRelationship)
            .page(page);

        self.repository.query(params).await
    }

    /// Lists the teams of a user, most recently joined first
    ///
    /// The page cursor is the cursor of the underlying membership query. Teams whose
    /// record no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::MalformedCursor` for a bad cursor, or any store error
    pub async fn list_teams_for_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> StorageResult<Page<Team>> {
        let params = QueryParams::new(TableIndex::IndexOne, user_pk(user_id))
            .begins_with(TEAM_MEMBERSHIP_PREFIX)
            .entity_type(EntityType::TeamUserRelationship)
            .page(page)
            .descending();
        let memberships: Page<TeamMembership> = self.repository.query(params).await?;

        let keys = memberships
            .items
            .iter()
            .map(|membership| {
                primary_key(team_pk(membership.team_id), team_pk(membership.team_id))
            })
            .collect();
        let mut teams: HashMap<Uuid, Team> = self
            .repository
            .batch_get::<Team>(keys)
            .await?
            .into_iter()
            .map(|team| (team.id, team))
            .collect();

        // Batch reads do not keep key order; restore the membership order
        Ok(Page {
            items: memberships
                .items
                .iter()
                .filter_map(|membership| teams.remove(&membership.team_id))
                .collect(),
            cursor: memberships.cursor,
        })
    }

    /// Removes a user from a team; removing a non-member succeeds
    ///
    /// # Errors
    ///
    /// Returns any store error
    pub async fn remove_member(&self, team_id: Uuid, user_id: Uuid) -> StorageResult<()> {
        self.repository
            .delete(&team_pk(team_id), &user_pk(user_id))
            .await
    }
}
