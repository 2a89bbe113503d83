//! Tabular store abstraction.

use actorstore_core::error::DomainError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One row in a logical table.
///
/// Rows are addressed by `(partition_key, row_key)` and every committed row
/// carries a store-assigned `etag`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableEntity {
    /// Partition the row belongs to. Transactions never span partitions.
    pub partition_key: String,
    /// Row key, unique and ordered within the partition.
    pub row_key: String,
    /// Store-assigned time of the last write.
    pub timestamp: Option<DateTime<Utc>>,
    /// Store-assigned concurrency tag.
    pub etag: Option<String>,
    /// Serialized payload.
    pub data: Option<String>,
    /// `major.minor` schema version of the payload's defining crate.
    pub data_version: Option<String>,
    /// Type identity of the payload.
    pub type_name: Option<String>,
    /// Stream version this row reflects.
    pub version: Option<u64>,
}

impl TableEntity {
    /// Creates an empty row at the given key.
    #[must_use]
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            ..Self::default()
        }
    }
}

/// A single operation inside an atomic transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableAction {
    /// Insert a row; conflicts if the row already exists.
    Insert(TableEntity),
    /// Replace a row. With `if_match` the existing row's tag must match;
    /// without it the row is inserted or overwritten unconditionally.
    UpsertReplace {
        /// The new row.
        entity: TableEntity,
        /// Required tag of the existing row.
        if_match: Option<String>,
    },
    /// Delete a row. With `if_match` the row must exist with that tag;
    /// without it a missing row is ignored.
    Delete {
        /// Partition of the row.
        partition_key: String,
        /// Key of the row.
        row_key: String,
        /// Required tag of the existing row.
        if_match: Option<String>,
    },
}

impl TableAction {
    /// Returns the `(partition_key, row_key)` the action targets.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        match self {
            Self::Insert(entity) | Self::UpsertReplace { entity, .. } => {
                (&entity.partition_key, &entity.row_key)
            }
            Self::Delete {
                partition_key,
                row_key,
                ..
            } => (partition_key, row_key),
        }
    }
}

/// Errors raised by a tabular store.
#[derive(Debug, Error)]
pub enum TableError {
    /// A precondition failed: duplicate insert or tag mismatch.
    #[error("conflict on {table}/{partition_key}/{row_key}: {reason}")]
    Conflict {
        /// Logical table name.
        table: String,
        /// Partition of the conflicting row.
        partition_key: String,
        /// Key of the conflicting row.
        row_key: String,
        /// What failed.
        reason: String,
    },

    /// The logical table has not been provisioned.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// The transaction is malformed.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The backend failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for TableError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<TableError> for DomainError {
    fn from(err: TableError) -> Self {
        DomainError::Infrastructure(err.to_string())
    }
}

/// Partitioned tabular store with single-partition atomic transactions.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Provision a logical table. Provisioning an existing table is a no-op.
    async fn create_table_if_not_exists(&self, table: &str) -> Result<(), TableError>;

    /// Point lookup of one row.
    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, TableError>;

    /// All rows of a partition, ordered by row key.
    async fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> Result<Vec<TableEntity>, TableError>;

    /// Apply `actions` atomically. Every action must target the same
    /// partition. Returns the written rows (inserts and upserts, in order)
    /// with their new tags and timestamps.
    async fn submit_transaction(
        &self,
        table: &str,
        actions: Vec<TableAction>,
    ) -> Result<Vec<TableEntity>, TableError>;
}

/// Generates a fresh opaque concurrency tag.
#[must_use]
pub fn new_etag() -> String {
    format!("W/\"{}\"", uuid::Uuid::now_v7())
}

/// Checks that `actions` is non-empty, targets one partition and touches
/// every row at most once. Returns the shared partition key.
///
/// # Errors
///
/// Returns `TableError::InvalidTransaction` otherwise.
pub fn validate_transaction(actions: &[TableAction]) -> Result<&str, TableError> {
    let Some(first) = actions.first() else {
        return Err(TableError::InvalidTransaction("transaction is empty".into()));
    };
    let partition = first.key().0;
    let mut seen = std::collections::HashSet::new();
    for action in actions {
        let (partition_key, row_key) = action.key();
        if partition_key != partition {
            return Err(TableError::InvalidTransaction(format!(
                "transaction spans partitions {partition} and {partition_key}"
            )));
        }
        if !seen.insert(row_key) {
            return Err(TableError::InvalidTransaction(format!(
                "row {row_key} appears more than once"
            )));
        }
    }
    Ok(partition)
}
