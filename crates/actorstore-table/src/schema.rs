//! Table store database schema.

/// SQL to create the logical table registry and the shared row table.
pub const CREATE_TABLE_STORE: &str = r"
CREATE TABLE IF NOT EXISTS actor_tables (
    table_name  VARCHAR(255) PRIMARY KEY,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS actor_rows (
    table_name      VARCHAR(255) NOT NULL REFERENCES actor_tables (table_name),
    partition_key   VARCHAR(1024) NOT NULL,
    row_key         VARCHAR(1024) NOT NULL,
    etag            VARCHAR(64) NOT NULL,
    data            TEXT,
    data_version    VARCHAR(32),
    type_name       VARCHAR(1024),
    version         BIGINT,
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (table_name, partition_key, row_key)
);
";
