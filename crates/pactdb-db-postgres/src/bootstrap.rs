//! Schema bootstrap.
//!
//! Creates the tables, composite types, helper functions and indexes the
//! query compiler depends on. Concurrent starters coordinate through a
//! row-level lock on the one-row `db_migrations` table: whoever wins runs
//! the DDL, everyone else waits on the lock, observes `db_version` at or
//! above its own and no-ops. Index creation additionally takes an
//! `EXCLUSIVE MODE` lock on the `indexes` bookkeeping table and runs with
//! `statement_timeout = 0`, since index builds legitimately outlive the
//! query timeout.

use sqlx_core::executor::Executor;
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::error::{is_ignorable_init_error, map_db_error, PostgresError, Result};

/// Version of the baseline schema.
const DB_VERSION: i32 = 1;

const TABLE_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS cards (
        id uuid PRIMARY KEY,
        slug text NOT NULL,
        version_major integer NOT NULL DEFAULT 1,
        version_minor integer NOT NULL DEFAULT 0,
        version_patch integer NOT NULL DEFAULT 0,
        version_prerelease text NOT NULL DEFAULT '',
        version_build text NOT NULL DEFAULT '',
        type text NOT NULL,
        name text,
        tags text[] NOT NULL DEFAULT '{}',
        markers text[] NOT NULL DEFAULT '{}',
        created_at timestamptz NOT NULL DEFAULT now(),
        updated_at timestamptz,
        active boolean NOT NULL DEFAULT true,
        requires jsonb[] NOT NULL DEFAULT '{}',
        capabilities jsonb[] NOT NULL DEFAULT '{}',
        linked_at jsonb NOT NULL DEFAULT '{}',
        links jsonb NOT NULL DEFAULT '{}',
        data jsonb NOT NULL DEFAULT '{}',
        UNIQUE (slug, version_major, version_minor, version_patch,
                version_prerelease, version_build)
    )",
    "CREATE TABLE IF NOT EXISTS strings (
        id serial PRIMARY KEY,
        string text UNIQUE NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS links (
        id uuid NOT NULL,
        forward boolean NOT NULL,
        from_id uuid NOT NULL,
        to_id uuid NOT NULL,
        name integer NOT NULL REFERENCES strings (id),
        PRIMARY KEY (id, forward)
    )",
    "CREATE TABLE IF NOT EXISTS db_migrations (
        id integer PRIMARY KEY DEFAULT 0 CHECK (id = 0),
        db_version integer NOT NULL DEFAULT 0,
        updated_at timestamptz NOT NULL DEFAULT now()
    )",
    "CREATE TABLE IF NOT EXISTS indexes (
        name text PRIMARY KEY,
        created_at timestamptz NOT NULL DEFAULT now()
    )",
];

const TYPE_DDL: &[&str] = &[
    // CREATE TYPE has no IF NOT EXISTS; the DO block keeps a duplicate
    // from a concurrent starter from aborting the migration transaction.
    "DO $do$ BEGIN
         CREATE TYPE linkedge AS (source uuid, idx integer, sink uuid);
     EXCEPTION WHEN duplicate_object THEN NULL;
     END $do$",
    // Plain array_to_string is only stable; full-text expression indexes
    // need an immutable wrapper.
    "CREATE OR REPLACE FUNCTION immutable_array_to_string(arr text[], sep text)
         RETURNS text AS $$ SELECT array_to_string(arr, sep) $$
         LANGUAGE sql IMMUTABLE",
];

const INDEX_DDL: &[(&str, &str)] = &[
    (
        "cards_slug_version_idx",
        "CREATE INDEX IF NOT EXISTS cards_slug_version_idx ON cards (slug,
         version_major DESC, version_minor DESC, version_patch DESC,
         version_prerelease, version_build)",
    ),
    (
        "cards_type_idx",
        "CREATE INDEX IF NOT EXISTS cards_type_idx ON cards (type)",
    ),
    (
        "cards_data_idx",
        "CREATE INDEX IF NOT EXISTS cards_data_idx ON cards USING gin (data)",
    ),
    (
        "cards_tags_idx",
        "CREATE INDEX IF NOT EXISTS cards_tags_idx ON cards USING gin (tags)",
    ),
    (
        "cards_markers_idx",
        "CREATE INDEX IF NOT EXISTS cards_markers_idx ON cards USING gin (markers)",
    ),
    (
        "links_from_idx",
        "CREATE INDEX IF NOT EXISTS links_from_idx ON links (from_id, name, to_id)",
    ),
    (
        "links_to_idx",
        "CREATE INDEX IF NOT EXISTS links_to_idx ON links (to_id, name, from_id)",
    ),
];

/// Run the bootstrap to completion.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> Result<()> {
    create_tables(pool).await?;

    let mut tx = pool.begin().await?;
    tx.execute("INSERT INTO db_migrations (id) VALUES (0) ON CONFLICT (id) DO NOTHING")
        .await?;
    let row = sqlx_core::query::query("SELECT db_version FROM db_migrations WHERE id = 0 FOR UPDATE")
        .fetch_one(&mut *tx)
        .await?;
    let version: i32 = sqlx_core::row::Row::try_get(&row, 0)?;
    if version >= DB_VERSION {
        debug!(version, "schema already current, skipping bootstrap");
        tx.rollback().await?;
    } else {
        for ddl in TYPE_DDL {
            tx.execute(*ddl).await?;
        }
        sqlx_core::query::query("UPDATE db_migrations SET db_version = $1, updated_at = now() WHERE id = 0")
            .bind(DB_VERSION)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(version = DB_VERSION, "schema bootstrap applied");
    }

    create_indexes(pool).await
}

async fn create_tables(pool: &PgPool) -> Result<()> {
    for ddl in TABLE_DDL {
        if let Err(err) = pool.execute(*ddl).await {
            if !is_ignorable_init_error(&err) {
                return Err(PostgresError::Storage(map_db_error(err)));
            }
        }
    }
    Ok(())
}

async fn create_indexes(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await?;
    tx.execute("LOCK TABLE indexes IN EXCLUSIVE MODE").await?;
    // Index builds may exceed the session's statement timeout.
    tx.execute("SET LOCAL statement_timeout = 0").await?;
    for (name, ddl) in INDEX_DDL {
        let seen =
            sqlx_core::query::query("SELECT 1 FROM indexes WHERE name = $1")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?;
        if seen.is_some() {
            continue;
        }
        tx.execute(*ddl).await?;
        sqlx_core::query::query(
            "INSERT INTO indexes (name) VALUES ($1) ON CONFLICT (name) DO NOTHING",
        )
        .bind(name)
        .execute(&mut *tx)
        .await?;
        debug!(index = name, "index ensured");
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_covers_compiler_dependencies() {
        let all_tables = TABLE_DDL.join("\n");
        for table in ["cards", "links", "strings", "db_migrations", "indexes"] {
            assert!(all_tables.contains(table), "missing table {table}");
        }
        let all_types = TYPE_DDL.join("\n");
        assert!(all_types.contains("linkedge"));
        assert!(all_types.contains("immutable_array_to_string"));
    }

    #[test]
    fn link_indexes_cover_both_directions() {
        let names: Vec<&str> = INDEX_DDL.iter().map(|(name, _)| *name).collect();
        assert!(names.contains(&"links_from_idx"));
        assert!(names.contains(&"links_to_idx"));
        let ddl: Vec<&str> = INDEX_DDL.iter().map(|(_, ddl)| *ddl).collect();
        assert!(ddl.iter().any(|d| d.contains("(from_id, name, to_id)")));
        assert!(ddl.iter().any(|d| d.contains("(to_id, name, from_id)")));
    }
}
