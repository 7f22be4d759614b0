//! Strips storage plumbing from raw records before they leave the storage layer

use crate::store::Item;
use crate::table::TableAttribute;

/// Removes the discriminator, primary key and index shadow keys from a raw record
///
/// Missing attributes are ignored, so cleansing an already clean record is a no-op.
#[must_use]
pub fn cleanse(mut item: Item) -> Item {
    for attribute in TableAttribute::ALL {
        item.remove(&attribute.to_string());
    }
    item
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use aws_sdk_dynamodb::types::AttributeValue;
    use pretty_assertions::assert_eq;

    use super::*;

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.to_string())
    }

    fn raw_membership() -> Item {
        HashMap::from([
            ("partitionKey".to_string(), s("TEAM#1")),
            ("sortKey".to_string(), s("USER#2")),
            ("entityType".to_string(), s("TeamUserRelationship")),
            ("indexOnePartitionKey".to_string(), s("USER#2")),
            ("indexOneSortKey".to_string(), s("TEAM_MEMBERSHIP#2024")),
            ("teamId".to_string(), s("1")),
            ("userId".to_string(), s("2")),
        ])
    }

    #[test]
    fn test_cleanse_removes_storage_attributes() {
        let cleansed = cleanse(raw_membership());

        assert_eq!(
            cleansed,
            HashMap::from([
                ("teamId".to_string(), s("1")),
                ("userId".to_string(), s("2")),
            ])
        );
    }

    #[test]
    fn test_cleanse_is_idempotent() {
        let once = cleanse(raw_membership());
        let twice = cleanse(once.clone());

        assert_eq!(once, twice);
    }

    #[test]
    fn test_cleanse_handles_both_index_pairs() {
        let mut item = raw_membership();
        item.insert("indexTwoPartitionKey".to_string(), s("MESSAGE#9"));
        item.insert("indexTwoSortKey".to_string(), s("2024"));

        let cleansed = cleanse(item);

        assert_eq!(cleansed.len(), 2);
        assert!(!cleansed.contains_key("indexTwoSortKey"));
    }

    #[test]
    fn test_cleanse_keeps_domain_only_record() {
        let item = HashMap::from([("name".to_string(), s("Ada"))]);
        assert_eq!(cleanse(item.clone()), item);
    }
}
