//! In-memory implementation of the `TableStore` trait.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use actorstore_core::clock::{Clock, SharedClock, SystemClock};
use async_trait::async_trait;

use crate::entity::{
    TableAction, TableEntity, TableError, TableStore, new_etag, validate_transaction,
};

type RowKey = (String, String);
type Rows = BTreeMap<RowKey, TableEntity>;

/// Process-local table store for tests and development.
///
/// Transactions are serialized by a single lock, so they are atomic and
/// isolated exactly like the backing service's single-partition batches.
pub struct InMemoryTableStore {
    tables: Mutex<HashMap<String, Rows>>,
    clock: SharedClock,
}

impl fmt::Debug for InMemoryTableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTableStore").finish_non_exhaustive()
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTableStore {
    /// Creates an empty store stamping rows with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Creates an empty store stamping rows with `clock`.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Rows>>, TableError> {
        self.tables
            .lock()
            .map_err(|_| TableError::Backend("in-memory table lock poisoned".into()))
    }
}

fn conflict(table: &str, key: &RowKey, reason: &str) -> TableError {
    TableError::Conflict {
        table: table.to_owned(),
        partition_key: key.0.clone(),
        row_key: key.1.clone(),
        reason: reason.to_owned(),
    }
}

fn check_tag(
    table: &str,
    key: &RowKey,
    existing: Option<&TableEntity>,
    if_match: &str,
) -> Result<(), TableError> {
    match existing {
        None => Err(conflict(table, key, "row does not exist")),
        Some(row) if row.etag.as_deref() != Some(if_match) => {
            Err(conflict(table, key, "etag mismatch"))
        }
        Some(_) => Ok(()),
    }
}

fn check_precondition(table: &str, rows: &Rows, action: &TableAction) -> Result<(), TableError> {
    let (partition_key, row_key) = action.key();
    let key = (partition_key.to_owned(), row_key.to_owned());
    let existing = rows.get(&key);
    match action {
        TableAction::Insert(_) if existing.is_some() => {
            Err(conflict(table, &key, "row already exists"))
        }
        TableAction::UpsertReplace {
            if_match: Some(tag),
            ..
        }
        | TableAction::Delete {
            if_match: Some(tag),
            ..
        } => check_tag(table, &key, existing, tag),
        _ => Ok(()),
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn create_table_if_not_exists(&self, table: &str) -> Result<(), TableError> {
        self.lock()?.entry(table.to_owned()).or_default();
        Ok(())
    }

    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, TableError> {
        let tables = self.lock()?;
        let rows = tables
            .get(table)
            .ok_or_else(|| TableError::TableNotFound(table.to_owned()))?;
        Ok(rows
            .get(&(partition_key.to_owned(), row_key.to_owned()))
            .cloned())
    }

    async fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> Result<Vec<TableEntity>, TableError> {
        let tables = self.lock()?;
        let rows = tables
            .get(table)
            .ok_or_else(|| TableError::TableNotFound(table.to_owned()))?;
        Ok(rows
            .range((partition_key.to_owned(), String::new())..)
            .take_while(|((partition, _), _)| partition == partition_key)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn submit_transaction(
        &self,
        table: &str,
        actions: Vec<TableAction>,
    ) -> Result<Vec<TableEntity>, TableError> {
        validate_transaction(&actions)?;
        let now = self.clock.now();

        let mut tables = self.lock()?;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| TableError::TableNotFound(table.to_owned()))?;

        // Rows are unique within a transaction, so every precondition can be
        // checked against the committed state before anything is written.
        for action in &actions {
            check_precondition(table, rows, action)?;
        }

        let mut written = Vec::new();
        for action in actions {
            match action {
                TableAction::Insert(mut entity) | TableAction::UpsertReplace { mut entity, .. } => {
                    entity.etag = Some(new_etag());
                    entity.timestamp = Some(now);
                    rows.insert(
                        (entity.partition_key.clone(), entity.row_key.clone()),
                        entity.clone(),
                    );
                    written.push(entity);
                }
                TableAction::Delete {
                    partition_key,
                    row_key,
                    ..
                } => {
                    rows.remove(&(partition_key, row_key));
                }
            }
        }
        Ok(written)
    }
}
