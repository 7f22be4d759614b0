//! Single-table storage for the team-chat backend
//!
//! Users, teams, memberships and messages share one `DynamoDB` table. The generic
//! [`repository::Repository`] implements partial updates of nested documents, chunked
//! batch reads and writes with retry of unprocessed items, opaque pagination cursors and
//! removal of storage attributes from everything it returns. The domain repositories are
//! thin layers on top of it.

pub mod batch;
pub mod cleanse;
pub mod config;
pub mod cursor;
pub mod error;
pub mod keys;
pub mod logging;
pub mod message;
pub mod repository;
pub mod store;
pub mod table;
pub mod team;
pub mod team_membership;
pub mod update_expression;
pub mod user;

pub use error::{StorageError, StorageErrorKind, StorageResult};
pub use repository::{Page, PageRequest, QueryParams, Repository};
