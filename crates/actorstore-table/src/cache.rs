//! Lazily provisioned table handles.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::entity::{TableAction, TableEntity, TableError, TableStore};

/// Handle to a provisioned logical table.
pub struct Table<S: ?Sized> {
    name: Arc<str>,
    store: Arc<S>,
}

impl<S: ?Sized> Clone for Table<S> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ?Sized> fmt::Debug for Table<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("name", &self.name).finish()
    }
}

impl<S: TableStore + ?Sized> Table<S> {
    /// Returns the logical table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Point lookup of one row.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn get_entity(
        &self,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, TableError> {
        self.store.get_entity(&self.name, partition_key, row_key).await
    }

    /// All rows of a partition, ordered by row key.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn query_partition(&self, partition_key: &str) -> Result<Vec<TableEntity>, TableError> {
        self.store.query_partition(&self.name, partition_key).await
    }

    /// Applies `actions` atomically.
    ///
    /// # Errors
    ///
    /// Returns `TableError::Conflict` if a precondition fails; nothing is
    /// written in that case.
    pub async fn submit(&self, actions: Vec<TableAction>) -> Result<Vec<TableEntity>, TableError> {
        self.store.submit_transaction(&self.name, actions).await
    }
}

/// Memoizes table handles per logical table name so each table is
/// provisioned at most once per cache.
///
/// Concurrent first accesses to the same name share a single provisioning
/// call. A failed provisioning is not cached and is retried on next access.
pub struct TableCache<S: ?Sized> {
    store: Arc<S>,
    tables: DashMap<String, Arc<OnceCell<Table<S>>>>,
}

impl<S: ?Sized> fmt::Debug for TableCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("TableCache").field("tables", &names).finish()
    }
}

impl<S: TableStore + ?Sized> TableCache<S> {
    /// Creates an empty cache over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            tables: DashMap::new(),
        }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the handle for `name`, provisioning the table on first use.
    ///
    /// # Errors
    ///
    /// Propagates provisioning failures.
    pub async fn get(&self, name: &str) -> Result<Table<S>, TableError> {
        if let Some(table) = self.tables.get(name).and_then(|cell| cell.value().get().cloned()) {
            return Ok(table);
        }

        let cell = Arc::clone(self.tables.entry(name.to_owned()).or_default().value());
        let table = cell
            .get_or_try_init(|| async {
                tracing::debug!(table = name, "provisioning table");
                self.store.create_table_if_not_exists(name).await?;
                Ok::<_, TableError>(Table {
                    name: Arc::from(name),
                    store: Arc::clone(&self.store),
                })
            })
            .await?;
        Ok(table.clone())
    }

    /// Returns how many table names have been requested.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns whether no table has been requested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
