//! `PostgreSQL` implementation of the `TableStore` trait.
//!
//! Logical tables share one physical `actor_rows` table keyed by
//! `(table_name, partition_key, row_key)`; `actor_tables` records which
//! logical tables have been provisioned.

use std::fmt;

use actorstore_core::clock::{SharedClock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};

use crate::entity::{
    TableAction, TableEntity, TableError, TableStore, new_etag, validate_transaction,
};
use crate::schema::CREATE_TABLE_STORE;

/// PostgreSQL-backed table store.
#[derive(Clone)]
pub struct PgTableStore {
    pool: PgPool,
    clock: SharedClock,
}

impl fmt::Debug for PgTableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgTableStore")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl PgTableStore {
    /// Creates a new `PgTableStore` stamping rows with the system clock.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, SystemClock::shared())
    }

    /// Creates a new `PgTableStore` stamping rows with `clock`.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: SharedClock) -> Self {
        Self { pool, clock }
    }

    /// Connects a pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns `TableError::Backend` if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, TableError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Creates the backing tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `TableError::Backend` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), TableError> {
        sqlx::raw_sql(CREATE_TABLE_STORE).execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_table(conn: &mut PgConnection, table: &str) -> Result<(), TableError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM actor_tables WHERE table_name = $1)")
                .bind(table)
                .fetch_one(conn)
                .await?;
        if exists {
            Ok(())
        } else {
            Err(TableError::TableNotFound(table.to_owned()))
        }
    }
}

#[derive(sqlx::FromRow)]
struct RowRecord {
    partition_key: String,
    row_key: String,
    etag: String,
    data: Option<String>,
    data_version: Option<String>,
    type_name: Option<String>,
    version: Option<i64>,
    updated_at: DateTime<Utc>,
}

impl RowRecord {
    fn into_entity(self) -> Result<TableEntity, TableError> {
        let version = self
            .version
            .map(u64::try_from)
            .transpose()
            .map_err(|e| TableError::Backend(format!("negative stream version: {e}")))?;
        Ok(TableEntity {
            partition_key: self.partition_key,
            row_key: self.row_key,
            timestamp: Some(self.updated_at),
            etag: Some(self.etag),
            data: self.data,
            data_version: self.data_version,
            type_name: self.type_name,
            version,
        })
    }
}

fn db_version(entity: &TableEntity) -> Result<Option<i64>, TableError> {
    entity
        .version
        .map(i64::try_from)
        .transpose()
        .map_err(|e| TableError::Backend(format!("stream version out of range: {e}")))
}

fn conflict(table: &str, partition_key: &str, row_key: &str, reason: &str) -> TableError {
    TableError::Conflict {
        table: table.to_owned(),
        partition_key: partition_key.to_owned(),
        row_key: row_key.to_owned(),
        reason: reason.to_owned(),
    }
}

const INSERT_ROW: &str = r"
INSERT INTO actor_rows
    (table_name, partition_key, row_key, etag, data, data_version, type_name, version, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (table_name, partition_key, row_key) DO NOTHING
RETURNING partition_key, row_key, etag, data, data_version, type_name, version, updated_at
";

const UPSERT_ROW: &str = r"
INSERT INTO actor_rows
    (table_name, partition_key, row_key, etag, data, data_version, type_name, version, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (table_name, partition_key, row_key) DO UPDATE SET
    etag = EXCLUDED.etag,
    data = EXCLUDED.data,
    data_version = EXCLUDED.data_version,
    type_name = EXCLUDED.type_name,
    version = EXCLUDED.version,
    updated_at = EXCLUDED.updated_at
RETURNING partition_key, row_key, etag, data, data_version, type_name, version, updated_at
";

const REPLACE_ROW_IF_MATCH: &str = r"
UPDATE actor_rows SET
    etag = $4,
    data = $5,
    data_version = $6,
    type_name = $7,
    version = $8,
    updated_at = $9
WHERE table_name = $1 AND partition_key = $2 AND row_key = $3 AND etag = $10
RETURNING partition_key, row_key, etag, data, data_version, type_name, version, updated_at
";

const DELETE_ROW: &str = r"
DELETE FROM actor_rows
WHERE table_name = $1 AND partition_key = $2 AND row_key = $3
    AND ($4::VARCHAR IS NULL OR etag = $4)
";

async fn write_row(
    conn: &mut PgConnection,
    sql: &'static str,
    table: &str,
    entity: &TableEntity,
    now: DateTime<Utc>,
    if_match: Option<&str>,
) -> Result<Option<RowRecord>, TableError> {
    let mut query = sqlx::query_as::<_, RowRecord>(sql)
        .bind(table)
        .bind(&entity.partition_key)
        .bind(&entity.row_key)
        .bind(new_etag())
        .bind(&entity.data)
        .bind(&entity.data_version)
        .bind(&entity.type_name)
        .bind(db_version(entity)?)
        .bind(now);
    if let Some(tag) = if_match {
        query = query.bind(tag);
    }
    Ok(query.fetch_optional(conn).await?)
}

#[async_trait]
impl TableStore for PgTableStore {
    async fn create_table_if_not_exists(&self, table: &str) -> Result<(), TableError> {
        sqlx::query("INSERT INTO actor_tables (table_name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(table)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> Result<Option<TableEntity>, TableError> {
        let mut conn = self.pool.acquire().await?;
        let record: Option<RowRecord> = sqlx::query_as(
            r"
            SELECT partition_key, row_key, etag, data, data_version, type_name, version, updated_at
            FROM actor_rows
            WHERE table_name = $1 AND partition_key = $2 AND row_key = $3
            ",
        )
        .bind(table)
        .bind(partition_key)
        .bind(row_key)
        .fetch_optional(&mut *conn)
        .await?;

        match record {
            Some(record) => record.into_entity().map(Some),
            None => {
                Self::ensure_table(&mut conn, table).await?;
                Ok(None)
            }
        }
    }

    async fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> Result<Vec<TableEntity>, TableError> {
        let mut conn = self.pool.acquire().await?;
        let records: Vec<RowRecord> = sqlx::query_as(
            r#"
            SELECT partition_key, row_key, etag, data, data_version, type_name, version, updated_at
            FROM actor_rows
            WHERE table_name = $1 AND partition_key = $2
            ORDER BY row_key COLLATE "C"
            "#,
        )
        .bind(table)
        .bind(partition_key)
        .fetch_all(&mut *conn)
        .await?;

        if records.is_empty() {
            Self::ensure_table(&mut conn, table).await?;
        }
        records.into_iter().map(RowRecord::into_entity).collect()
    }

    async fn submit_transaction(
        &self,
        table: &str,
        actions: Vec<TableAction>,
    ) -> Result<Vec<TableEntity>, TableError> {
        validate_transaction(&actions)?;

        // Dropping `tx` on any early return rolls the whole batch back.
        let mut tx = self.pool.begin().await?;
        Self::ensure_table(&mut tx, table).await?;

        let now = self.clock.now();
        let mut written = Vec::new();
        for action in &actions {
            match action {
                TableAction::Insert(entity) => {
                    let record = write_row(&mut tx, INSERT_ROW, table, entity, now, None)
                        .await?
                        .ok_or_else(|| {
                            conflict(table, &entity.partition_key, &entity.row_key, "row already exists")
                        })?;
                    written.push(record.into_entity()?);
                }
                TableAction::UpsertReplace {
                    entity,
                    if_match: Some(tag),
                } => {
                    let record = write_row(&mut tx, REPLACE_ROW_IF_MATCH, table, entity, now, Some(tag.as_str()))
                        .await?
                        .ok_or_else(|| {
                            conflict(table, &entity.partition_key, &entity.row_key, "etag mismatch")
                        })?;
                    written.push(record.into_entity()?);
                }
                TableAction::UpsertReplace {
                    entity,
                    if_match: None,
                } => {
                    let record = write_row(&mut tx, UPSERT_ROW, table, entity, now, None)
                        .await?
                        .ok_or_else(|| TableError::Backend("upsert returned no row".into()))?;
                    written.push(record.into_entity()?);
                }
                TableAction::Delete {
                    partition_key,
                    row_key,
                    if_match,
                } => {
                    let result = sqlx::query(DELETE_ROW)
                        .bind(table)
                        .bind(partition_key)
                        .bind(row_key)
                        .bind(if_match.as_deref())
                        .execute(&mut *tx)
                        .await?;
                    if if_match.is_some() && result.rows_affected() == 0 {
                        return Err(conflict(table, partition_key, row_key, "etag mismatch"));
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(written)
    }
}
