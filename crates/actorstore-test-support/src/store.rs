//! Test stores: mock `TableStore` implementations for tests.

use std::sync::Mutex;

use actorstore_core::clock::SharedClock;
use actorstore_table::entity::{TableAction, TableEntity, TableError, TableStore};
use actorstore_table::memory::InMemoryTableStore;
use async_trait::async_trait;

/// A table store that keeps rows in memory and records every submitted
/// transaction, so tests can assert on exactly what was written.
#[derive(Debug, Default)]
pub struct RecordingTableStore {
    inner: InMemoryTableStore,
    submitted: Mutex<Vec<(String, Vec<TableAction>)>>,
    provisioned: Mutex<Vec<String>>,
}

impl RecordingTableStore {
    /// Create an empty recording store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty recording store stamping rows with `clock`.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            inner: InMemoryTableStore::with_clock(clock),
            ..Self::default()
        }
    }

    /// Returns every transaction submitted so far, with its table name, in
    /// submission order. Rejected transactions are included.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn submitted(&self) -> Vec<(String, Vec<TableAction>)> {
        self.submitted.lock().unwrap().clone()
    }

    /// Returns every `create_table_if_not_exists` call, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned.lock().unwrap().clone()
    }
}

#[async_trait]
impl TableStore for RecordingTableStore {
    async fn create_table_if_not_exists(&self, table: &str) -> Result<(), TableError> {
        self.provisioned.lock().unwrap().push(table.to_owned());
        self.inner.create_table_if_not_exists(table).await
    }

    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, TableError> {
        self.inner.get_entity(table, partition_key, row_key).await
    }

    async fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> Result<Vec<TableEntity>, TableError> {
        self.inner.query_partition(table, partition_key).await
    }

    async fn submit_transaction(
        &self,
        table: &str,
        actions: Vec<TableAction>,
    ) -> Result<Vec<TableEntity>, TableError> {
        self.submitted
            .lock()
            .unwrap()
            .push((table.to_owned(), actions.clone()));
        self.inner.submit_transaction(table, actions).await
    }
}

/// A table store that always returns a backend error. Useful for testing
/// error-handling paths.
#[derive(Debug)]
pub struct FailingTableStore;

#[async_trait]
impl TableStore for FailingTableStore {
    async fn create_table_if_not_exists(&self, _table: &str) -> Result<(), TableError> {
        Err(TableError::Backend("connection refused".into()))
    }

    async fn get_entity(
        &self,
        _table: &str,
        _partition_key: &str,
        _row_key: &str,
    ) -> Result<Option<TableEntity>, TableError> {
        Err(TableError::Backend("connection refused".into()))
    }

    async fn query_partition(
        &self,
        _table: &str,
        _partition_key: &str,
    ) -> Result<Vec<TableEntity>, TableError> {
        Err(TableError::Backend("connection refused".into()))
    }

    async fn submit_transaction(
        &self,
        _table: &str,
        _actions: Vec<TableAction>,
    ) -> Result<Vec<TableEntity>, TableError> {
        Err(TableError::Backend("connection refused".into()))
    }
}
