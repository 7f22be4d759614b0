//! Physical layout of the single chat table
//!
//! Every logical entity and relationship shares one table. Records are told apart by
//! their key prefixes and the `entityType` discriminator; alternate access patterns go
//! through two generic secondary indexes whose keys are shadow attributes on the record.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Storage-only attribute names present on every stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "camelCase")]
pub enum TableAttribute {
    /// Partition key (Primary Key)
    PartitionKey,
    /// Sort key (Primary Key)
    SortKey,
    /// Discriminator of the record kind
    EntityType,
    /// Partition key of the first secondary index
    IndexOnePartitionKey,
    /// Sort key of the first secondary index
    IndexOneSortKey,
    /// Partition key of the second secondary index
    IndexTwoPartitionKey,
    /// Sort key of the second secondary index
    IndexTwoSortKey,
}

impl TableAttribute {
    /// All storage-only attributes, in the order they are stripped from read results
    pub const ALL: [Self; 7] = [
        Self::EntityType,
        Self::PartitionKey,
        Self::SortKey,
        Self::IndexOnePartitionKey,
        Self::IndexOneSortKey,
        Self::IndexTwoPartitionKey,
        Self::IndexTwoSortKey,
    ];
}

/// Index a query runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableIndex {
    /// The table's own primary key
    #[default]
    Primary,
    /// First global secondary index
    IndexOne,
    /// Second global secondary index
    IndexTwo,
}

impl TableIndex {
    /// Attribute holding this index's partition key
    #[must_use]
    pub const fn partition_attribute(self) -> TableAttribute {
        match self {
            Self::Primary => TableAttribute::PartitionKey,
            Self::IndexOne => TableAttribute::IndexOnePartitionKey,
            Self::IndexTwo => TableAttribute::IndexTwoPartitionKey,
        }
    }

    /// Attribute holding this index's sort key
    #[must_use]
    pub const fn sort_attribute(self) -> TableAttribute {
        match self {
            Self::Primary => TableAttribute::SortKey,
            Self::IndexOne => TableAttribute::IndexOneSortKey,
            Self::IndexTwo => TableAttribute::IndexTwoSortKey,
        }
    }
}

/// Discriminator stored in `entityType`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum EntityType {
    /// A user profile
    User,
    /// A team
    Team,
    /// Membership of a user in a team
    TeamUserRelationship,
    /// A chat message
    Message,
}

/// Names of the physical table and its secondary indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    /// `DynamoDB` table name
    pub table_name: String,
    /// Name of the GSI keyed on `indexOnePartitionKey`/`indexOneSortKey`
    pub index_one_name: String,
    /// Name of the GSI keyed on `indexTwoPartitionKey`/`indexTwoSortKey`
    pub index_two_name: String,
}

impl TableConfig {
    /// Default GSI name for index one
    pub const DEFAULT_INDEX_ONE_NAME: &'static str = "indexOne";
    /// Default GSI name for index two
    pub const DEFAULT_INDEX_TWO_NAME: &'static str = "indexTwo";

    /// Creates a table configuration with the default index names
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            index_one_name: Self::DEFAULT_INDEX_ONE_NAME.to_string(),
            index_two_name: Self::DEFAULT_INDEX_TWO_NAME.to_string(),
        }
    }

    /// Physical index name for a query, `None` for the primary key
    #[must_use]
    pub fn index_name(&self, index: TableIndex) -> Option<&str> {
        match index {
            TableIndex::Primary => None,
            TableIndex::IndexOne => Some(&self.index_one_name),
            TableIndex::IndexTwo => Some(&self.index_two_name),
        }
    }
}
