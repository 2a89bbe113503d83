//! Append-only event streams, one per partition.
//!
//! A stream lives in a single partition of a table: a header row holding the
//! current version, one row per event keyed by its zero-padded sequence
//! number, and any number of caller-supplied rows (snapshots) that are
//! upserted in the same transaction as each append.

use actorstore_core::codec::EncodedEvent;
use actorstore_core::error::DomainError;

use crate::cache::Table;
use crate::entity::{TableAction, TableEntity, TableError, TableStore};

/// Row key of the stream header.
pub const HEADER_ROW_KEY: &str = "SS-HEAD";

/// Row key prefix of event rows.
pub const EVENT_ROW_PREFIX: &str = "SS-SE-";

/// Row key of the event that advances a stream to `sequence`.
#[must_use]
pub fn event_row_key(sequence: u64) -> String {
    format!("{EVENT_ROW_PREFIX}{sequence:010}")
}

/// An opened stream and the header tag it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    /// Partition key (aggregate identity).
    pub partition: String,
    /// Number of committed events.
    pub version: u64,
    etag: Option<String>,
}

impl Stream {
    /// Returns the header row's concurrency tag, if the stream exists.
    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

/// Result of opening a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOpen {
    /// The stream has at least one committed event.
    Found(Stream),
    /// Nothing has been written to this partition yet.
    NotFound,
}

impl StreamOpen {
    /// Returns the committed version, zero when not found.
    #[must_use]
    pub fn version(&self) -> u64 {
        match self {
            Self::Found(stream) => stream.version,
            Self::NotFound => 0,
        }
    }
}

/// One stored event row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Stream version this event advanced to.
    pub sequence: u64,
    /// Serialized payload.
    pub data: String,
    /// Type tag of the payload.
    pub type_tag: String,
    /// Schema version the payload was written with.
    pub data_version: Option<String>,
}

/// All events of a stream, in append order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSlice {
    /// Committed events.
    pub events: Vec<RecordedEvent>,
    /// Stream version from the header.
    pub version: u64,
}

/// One stream: a partition of a table.
pub struct Partition<'a, S: ?Sized> {
    table: &'a Table<S>,
    key: &'a str,
}

impl<'a, S: TableStore + ?Sized> Partition<'a, S> {
    /// Addresses the stream stored under `key` in `table`.
    #[must_use]
    pub fn new(table: &'a Table<S>, key: &'a str) -> Self {
        Self { table, key }
    }

    /// Returns the partition key.
    #[must_use]
    pub fn key(&self) -> &str {
        self.key
    }

    /// Returns the table holding the stream.
    #[must_use]
    pub fn table(&self) -> &Table<S> {
        self.table
    }

    /// Opens the stream by reading its header.
    ///
    /// # Errors
    ///
    /// Propagates store failures as `DomainError::Infrastructure`.
    pub async fn open(&self) -> Result<StreamOpen, DomainError> {
        let header = self.table.get_entity(self.key, HEADER_ROW_KEY).await?;
        Ok(header.map_or(StreamOpen::NotFound, |row| {
            StreamOpen::Found(self.stream_from_header(row))
        }))
    }

    fn stream_from_header(&self, header: TableEntity) -> Stream {
        Stream {
            partition: self.key.to_owned(),
            version: header.version.unwrap_or_default(),
            etag: header.etag,
        }
    }

    /// Reads every event of the stream in append order. An absent stream
    /// reads as empty at version zero.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DecodeFailure` for a malformed event row and
    /// propagates store failures.
    pub async fn read(&self) -> Result<StreamSlice, DomainError> {
        let rows = self.table.query_partition(self.key).await?;

        let mut slice = StreamSlice::default();
        for row in rows {
            if row.row_key == HEADER_ROW_KEY {
                slice.version = row.version.unwrap_or_default();
            } else if row.row_key.starts_with(EVENT_ROW_PREFIX) {
                slice.events.push(recorded_event(row)?);
            }
        }
        slice.events.sort_by_key(|e| e.sequence);
        Ok(slice)
    }

    /// Appends `events` at `expected_version` and upserts `includes` in the
    /// same atomic transaction.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stream is not at
    /// `expected_version`, in which case nothing is written. Propagates
    /// other store failures.
    pub async fn write(
        &self,
        expected_version: u64,
        events: Vec<EncodedEvent>,
        includes: Vec<TableEntity>,
    ) -> Result<Stream, DomainError> {
        let current = self.open().await?;
        if current.version() != expected_version {
            return Err(self.conflict(expected_version, current.version()));
        }

        let header_tag = match current {
            StreamOpen::Found(stream) if events.is_empty() && includes.is_empty() => {
                return Ok(stream);
            }
            StreamOpen::Found(stream) => stream.etag,
            StreamOpen::NotFound if events.is_empty() && includes.is_empty() => {
                return Ok(Stream {
                    partition: self.key.to_owned(),
                    version: 0,
                    etag: None,
                });
            }
            StreamOpen::NotFound => None,
        };

        let new_version = expected_version + events.len() as u64;
        let header = TableEntity {
            version: Some(new_version),
            ..TableEntity::new(self.key, HEADER_ROW_KEY)
        };

        let mut actions = Vec::with_capacity(1 + events.len() + includes.len());
        actions.push(match header_tag {
            Some(tag) => TableAction::UpsertReplace {
                entity: header,
                if_match: Some(tag),
            },
            None => TableAction::Insert(header),
        });
        for (offset, event) in (1u64..).zip(events) {
            let sequence = expected_version + offset;
            actions.push(TableAction::Insert(TableEntity {
                data: Some(event.data),
                data_version: Some(event.schema_version.to_string()),
                type_name: Some(event.type_tag),
                version: Some(sequence),
                ..TableEntity::new(self.key, event_row_key(sequence))
            }));
        }
        actions.extend(includes.into_iter().map(|entity| TableAction::UpsertReplace {
            entity,
            if_match: None,
        }));

        match self.table.submit(actions).await {
            Ok(written) => Ok(Stream {
                partition: self.key.to_owned(),
                version: new_version,
                etag: written.into_iter().next().and_then(|header| header.etag),
            }),
            Err(TableError::Conflict { reason, .. }) => {
                tracing::debug!(stream = self.key, reason = %reason, "append lost a race");
                let actual = self.open().await?.version();
                Err(self.conflict(expected_version, actual))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every row of the stream, including included rows.
    ///
    /// With an `expected_version` the stream must still be at that version;
    /// the header is deleted under its concurrency tag so a concurrent append
    /// also fails the delete.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stream moved past
    /// `expected_version`, in which case nothing is deleted. Propagates
    /// other store failures.
    pub async fn delete(&self, expected_version: Option<u64>) -> Result<(), DomainError> {
        let rows = self.table.query_partition(self.key).await?;
        let header = rows
            .iter()
            .find(|row| row.row_key == HEADER_ROW_KEY)
            .map(|row| (row.version.unwrap_or_default(), row.etag.clone()));
        let Some((current, header_tag)) = header else {
            if rows.is_empty() {
                return Ok(());
            }
            return self.delete_rows(rows).await;
        };
        if let Some(expected) = expected_version.filter(|&expected| expected != current) {
            return Err(self.conflict(expected, current));
        }

        let actions = rows
            .into_iter()
            .map(|row| {
                let if_match = if row.row_key == HEADER_ROW_KEY {
                    header_tag.clone()
                } else {
                    None
                };
                TableAction::Delete {
                    partition_key: row.partition_key,
                    row_key: row.row_key,
                    if_match,
                }
            })
            .collect();
        match self.table.submit(actions).await {
            Ok(_) => Ok(()),
            Err(TableError::Conflict { reason, .. }) => {
                tracing::debug!(stream = self.key, reason = %reason, "delete lost a race");
                let actual = self.open().await?.version();
                Err(self.conflict(expected_version.unwrap_or(current), actual))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_rows(&self, rows: Vec<TableEntity>) -> Result<(), DomainError> {
        let actions = rows
            .into_iter()
            .map(|row| TableAction::Delete {
                partition_key: row.partition_key,
                row_key: row.row_key,
                if_match: None,
            })
            .collect();
        self.table.submit(actions).await?;
        Ok(())
    }

    fn conflict(&self, expected: u64, actual: u64) -> DomainError {
        DomainError::ConcurrencyConflict {
            stream: self.key.to_owned(),
            expected,
            actual,
        }
    }
}

fn recorded_event(row: TableEntity) -> Result<RecordedEvent, DomainError> {
    let malformed = |what: &str| DomainError::DecodeFailure {
        type_tag: row.type_name.clone().unwrap_or_default(),
        reason: format!("event row {} has no {what}", row.row_key),
    };
    let sequence = row.version.ok_or_else(|| malformed("version"))?;
    let data = row.data.ok_or_else(|| malformed("data"))?;
    let type_tag = row.type_name.clone().ok_or_else(|| malformed("type"))?;
    Ok(RecordedEvent {
        sequence,
        data,
        type_tag,
        data_version: row.data_version,
    })
}
