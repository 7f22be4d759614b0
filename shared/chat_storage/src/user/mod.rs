//! User profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_dynamo::{to_attribute_value, to_item};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::keys::{primary_key, user_pk};
use crate::repository::Repository;
use crate::store::{Item, WriteCondition};
use crate::table::EntityType;

/// A user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,
    /// Name shown to other users
    pub display_name: String,
    /// Contact email
    pub email: String,
    /// Client preferences
    #[serde(default)]
    pub preferences: UserPreferences,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Client preferences stored as a nested document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    /// Whether push notifications are delivered
    #[serde(default)]
    pub notifications_enabled: bool,
    /// IANA timezone name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// UI theme name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

impl User {
    /// Creates a user with a fresh ID and default preferences
    #[must_use]
    pub fn new(display_name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            email: email.into(),
            preferences: UserPreferences::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Stored form of a [`User`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    partition_key: String,
    sort_key: String,
    entity_type: EntityType,
    #[serde(flatten)]
    user: User,
}

impl From<&User> for UserRecord {
    fn from(user: &User) -> Self {
        Self {
            partition_key: user_pk(user.id),
            sort_key: user_pk(user.id),
            entity_type: EntityType::User,
            user: user.clone(),
        }
    }
}

/// Partial update of a user; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// New email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Preference fields to change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences: Option<UserPreferencesUpdate>,
}

/// Partial update of the nested preferences; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferencesUpdate {
    /// New notification setting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
    /// New timezone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// New theme
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

/// Storage for user profiles
#[derive(Clone)]
pub struct UserRepository {
    repository: Repository,
}

impl UserRepository {
    /// Creates a new user repository
    #[must_use]
    pub const fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Stores a new user
    ///
    /// # Errors
    ///
    /// Returns `StorageError::ConditionalCheckFailed` if a user with the same ID exists
    pub async fn create(&self, user: &User) -> StorageResult<()> {
        self.repository
            .put(&UserRecord::from(user), Some(WriteCondition::ItemNotExists))
            .await
    }

    /// Retrieves a user by ID
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist
    pub async fn get(&self, user_id: Uuid) -> StorageResult<User> {
        self.repository
            .get(primary_key(user_pk(user_id), user_pk(user_id)), "User")
            .await
    }

    /// Retrieves many users by ID; unknown IDs are skipped and order is not preserved
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BatchRetryExhausted` if the store keeps throttling the read
    pub async fn get_many(&self, user_ids: &[Uuid]) -> StorageResult<Vec<User>> {
        let keys = user_ids
            .iter()
            .map(|id| primary_key(user_pk(*id), user_pk(*id)))
            .collect();

        self.repository.batch_get(keys).await
    }

    /// Applies a partial update and returns the updated user
    ///
    /// Nested preference fields are updated individually, so an update carrying only a
    /// timezone keeps the stored theme. `updatedAt` is always refreshed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user does not exist, or any store or
    /// serialization error
    pub async fn update(&self, user_id: Uuid, update: &UserUpdate) -> StorageResult<User> {
        let mut document: Item = to_item(update)?;
        document.insert("updatedAt".to_string(), to_attribute_value(Utc::now())?);

        self.repository
            .update_existing(&user_pk(user_id), &user_pk(user_id), &document, "User")
            .await
    }
}
