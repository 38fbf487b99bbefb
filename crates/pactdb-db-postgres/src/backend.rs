//! The contract backend.
//!
//! Ties the pieces together: reads consult the lookup cache before the
//! database, writes upsert by `(slug, version)` and materialize link edges
//! in both directions, and `query` runs the full pipeline — mask
//! composition, schema merge, compilation, execution, row post-processing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow};
use tracing::{debug, instrument};
use uuid::Uuid;

use pactdb_auth::{ContractReader, SessionMask};
use pactdb_core::{validate_slug, Contract, Version};
use pactdb_storage::{
    CacheLookup, ContractCache, Database, QueryOptions, ScopedWork, StorageError,
    TransactionOptions,
};

use crate::config::PostgresConfig;
use crate::error::{map_db_error, Result};
use crate::intern::StringInterner;
use crate::pool::create_pool;
use crate::transaction;

const CONTRACTS_TABLE: &str = "cards";

/// A cache that remembers nothing; used when no shared cache is wired in.
#[derive(Debug, Default)]
pub struct NoCache;

#[async_trait]
impl ContractCache for NoCache {
    async fn get_by_id(&self, _table: &str, _id: Uuid) -> CacheLookup {
        CacheLookup::unknown()
    }

    async fn get_by_slug(&self, _table: &str, _slug: &str, _version: &Version) -> CacheLookup {
        CacheLookup::unknown()
    }

    async fn set(&self, _table: &str, _contract: &Contract) {}

    async fn set_missing_id(&self, _table: &str, _id: Uuid) {}

    async fn set_missing_slug(&self, _table: &str, _slug: &str, _version: &Version) {}

    async fn unset(&self, _contract: &Contract) {}

    async fn reset(&self) {}
}

/// PostgreSQL-backed contract store.
pub struct PostgresBackend {
    pool: PgPool,
    cache: Arc<dyn ContractCache>,
    interner: StringInterner,
}

impl PostgresBackend {
    /// Connect and (optionally) bootstrap the schema.
    pub async fn new(config: PostgresConfig) -> Result<Self> {
        let pool = create_pool(&config).await?;
        if config.run_bootstrap {
            crate::bootstrap::run(&pool).await?;
        }
        Ok(Self {
            pool,
            cache: Arc::new(NoCache),
            interner: StringInterner::new(),
        })
    }

    /// Use a shared lookup cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ContractCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a statement through the ambient transaction scope when one is
    /// active, the pool otherwise.
    async fn fetch_rows(
        &self,
        sql: &str,
        values: &[Value],
    ) -> std::result::Result<Vec<PgRow>, StorageError> {
        match transaction::current() {
            Some(shared) => {
                let mut guard = shared.lock().await;
                let tx = guard.as_mut().ok_or_else(|| {
                    StorageError::transaction_error("transaction already completed")
                })?;
                bind_values(sqlx_core::query::query(sql), values)
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(map_db_error)
            }
            None => bind_values(sqlx_core::query::query(sql), values)
                .fetch_all(&self.pool)
                .await
                .map_err(map_db_error),
        }
    }

    async fn fetch_json(
        &self,
        sql: &str,
        values: &[Value],
    ) -> std::result::Result<Vec<Value>, StorageError> {
        let wrapped = format!("SELECT row_to_json(q.*)::jsonb AS row FROM ({sql}) AS q");
        let rows = self.fetch_rows(&wrapped, values).await?;
        rows.into_iter()
            .map(|row| {
                row.try_get::<Value, _>("row")
                    .map_err(|e| StorageError::internal(e.to_string()))
            })
            .collect()
    }

    /// Fetch a contract by id, consulting the cache first and recording
    /// negative results.
    pub async fn get_by_id(
        &self,
        id: Uuid,
    ) -> std::result::Result<Option<Contract>, StorageError> {
        let lookup = self.cache.get_by_id(CONTRACTS_TABLE, id).await;
        if lookup.hit {
            return Ok(lookup.element);
        }
        let rows = self
            .fetch_json(
                "SELECT cards.* FROM cards WHERE id = $1::uuid",
                &[json!(id.to_string())],
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => {
                let contract = contract_from_row(row)?;
                self.cache.set(CONTRACTS_TABLE, &contract).await;
                Ok(Some(contract))
            }
            None => {
                self.cache.set_missing_id(CONTRACTS_TABLE, id).await;
                Ok(None)
            }
        }
    }

    /// Fetch a contract by slug and version; `latest` resolves to the
    /// highest version, preferring releases over prereleases.
    pub async fn get_by_slug(
        &self,
        slug: &str,
        version: &Version,
    ) -> std::result::Result<Option<Contract>, StorageError> {
        let lookup = self.cache.get_by_slug(CONTRACTS_TABLE, slug, version).await;
        if lookup.hit {
            return Ok(lookup.element);
        }
        let rows = if version.latest {
            self.fetch_json(
                "SELECT cards.* FROM cards WHERE slug = $1
                 ORDER BY version_prerelease ASC, version_major DESC,
                          version_minor DESC, version_patch DESC, version_build DESC
                 LIMIT 1",
                &[json!(slug)],
            )
            .await?
        } else {
            self.fetch_json(
                "SELECT cards.* FROM cards WHERE slug = $1
                   AND version_major = $2 AND version_minor = $3 AND version_patch = $4
                   AND version_prerelease = $5 AND version_build = $6",
                &[
                    json!(slug),
                    json!(version.major),
                    json!(version.minor),
                    json!(version.patch),
                    json!(version.prerelease),
                    json!(version.build),
                ],
            )
            .await?
        };
        match rows.into_iter().next() {
            Some(row) => {
                let contract = contract_from_row(row)?;
                self.cache.set(CONTRACTS_TABLE, &contract).await;
                Ok(Some(contract))
            }
            None => {
                self.cache
                    .set_missing_slug(CONTRACTS_TABLE, slug, version)
                    .await;
                Ok(None)
            }
        }
    }

    /// Insert or replace a contract, keyed by `(slug, version)`. Link
    /// contracts additionally materialize both directed edges.
    #[instrument(skip(self, contract), fields(slug = %contract.slug))]
    pub async fn insert(&self, contract: &Contract) -> Result<Contract> {
        validate_slug(&contract.slug).map_err(StorageError::from)?;
        let stored = transaction::with_transaction(&self.pool, async {
            let row = self.upsert_card(contract).await?;
            let stored = contract_from_row(row)?;
            if contract.is_link() {
                let link = contract
                    .as_link()
                    .map_err(|e| StorageError::internal(e.to_string()))?;
                self.write_link_edges(stored.id, &link).await?;
            }
            Ok(stored)
        })
        .await?;
        self.cache.unset(&stored).await;
        self.cache.set(CONTRACTS_TABLE, &stored).await;
        Ok(stored)
    }

    async fn upsert_card(
        &self,
        contract: &Contract,
    ) -> std::result::Result<Value, StorageError> {
        // Data-modifying statements cannot appear in a FROM subquery, so
        // the row_to_json wrapping happens through a CTE here.
        let rows = self
            .fetch_rows(
                "WITH upserted AS (
                 INSERT INTO cards (id, slug, version_major, version_minor, version_patch,
                        version_prerelease, version_build, type, name, tags, markers,
                        created_at, updated_at, active, requires, capabilities,
                        linked_at, links, data)
                 SELECT $1::uuid, $2, $3, $4, $5, $6, $7, $8, $9,
                        coalesce((SELECT array_agg(value #>> '{}') FROM jsonb_array_elements($10::jsonb)), '{}'),
                        coalesce((SELECT array_agg(value #>> '{}') FROM jsonb_array_elements($11::jsonb)), '{}'),
                        $12::timestamptz, NULL, $13,
                        coalesce((SELECT array_agg(value) FROM jsonb_array_elements($14::jsonb)), '{}'),
                        coalesce((SELECT array_agg(value) FROM jsonb_array_elements($15::jsonb)), '{}'),
                        $16::jsonb, $17::jsonb, $18::jsonb
                 ON CONFLICT (slug, version_major, version_minor, version_patch,
                              version_prerelease, version_build)
                 DO UPDATE SET
                        type = EXCLUDED.type,
                        name = EXCLUDED.name,
                        tags = EXCLUDED.tags,
                        markers = EXCLUDED.markers,
                        updated_at = now(),
                        active = EXCLUDED.active,
                        requires = EXCLUDED.requires,
                        capabilities = EXCLUDED.capabilities,
                        links = EXCLUDED.links,
                        data = EXCLUDED.data
                 RETURNING *
                 )
                 SELECT row_to_json(upserted.*)::jsonb AS row FROM upserted",
                &[
                    json!(contract.id.to_string()),
                    json!(contract.slug),
                    json!(contract.version.major),
                    json!(contract.version.minor),
                    json!(contract.version.patch),
                    json!(contract.version.prerelease),
                    json!(contract.version.build),
                    json!(contract.contract_type),
                    json!(contract.name),
                    json!(contract.tags),
                    json!(contract.markers),
                    json!(contract.created_at.to_rfc3339()),
                    json!(contract.active),
                    json!(contract.requires),
                    json!(contract.capabilities),
                    Value::Object(contract.linked_at.clone()),
                    Value::Object(contract.links.clone()),
                    Value::Object(contract.data.clone()),
                ],
            )
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::internal("upsert returned no row"))?;
        row.try_get::<Value, _>("row")
            .map_err(|e| StorageError::internal(e.to_string()))
    }

    /// Write both directed edges of a link. The primary key `(id, forward)`
    /// makes re-insertion idempotent.
    async fn write_link_edges(
        &self,
        link_id: Uuid,
        link: &pactdb_core::LinkReference,
    ) -> std::result::Result<(), StorageError> {
        let name_id = self.interner.get_or_intern(&self.pool, &link.name).await?;
        let inverse_id = self
            .interner
            .get_or_intern(&self.pool, &link.inverse_name)
            .await?;
        self.fetch_rows(
            "INSERT INTO links (id, forward, from_id, to_id, name) VALUES
                 ($1::uuid, true, $2::uuid, $3::uuid, $4),
                 ($1::uuid, false, $3::uuid, $2::uuid, $5)
             ON CONFLICT (id, forward) DO UPDATE SET
                 from_id = EXCLUDED.from_id,
                 to_id = EXCLUDED.to_id,
                 name = EXCLUDED.name",
            &[
                json!(link_id.to_string()),
                json!(link.from.id.to_string()),
                json!(link.to.id.to_string()),
                json!(name_id),
                json!(inverse_id),
            ],
        )
        .await?;
        let now = Utc::now().to_rfc3339();
        self.fetch_rows(
            "UPDATE cards SET linked_at = linked_at || jsonb_build_object($2::text, $3::text)
             WHERE id = $1::uuid",
            &[
                json!(link.from.id.to_string()),
                json!(link.name),
                json!(now),
            ],
        )
        .await?;
        self.fetch_rows(
            "UPDATE cards SET linked_at = linked_at || jsonb_build_object($2::text, $3::text)
             WHERE id = $1::uuid",
            &[
                json!(link.to.id.to_string()),
                json!(link.inverse_name),
                json!(now),
            ],
        )
        .await?;
        Ok(())
    }

    /// Compose the session's permission mask.
    pub async fn mask_for(&self, session_id: Uuid) -> Result<SessionMask> {
        Ok(pactdb_auth::compose(self, session_id).await?)
    }

    /// Run a caller query under a session: compose the mask, merge it into
    /// the schema (and every `$$links` subtree), compile, execute, and
    /// post-process the returned payloads.
    #[instrument(skip(self, select, schema, options))]
    pub async fn query(
        &self,
        session_id: Uuid,
        select: &Value,
        schema: &Value,
        options: &QueryOptions,
    ) -> Result<Vec<Value>> {
        options.validate()?;
        let mask = self.mask_for(session_id).await?;
        let effective = mask.apply(schema);
        let compiled = pactdb_query::compile(select, &effective, options)?;
        let rows = self.fetch_json(&compiled.sql, &[]).await?;
        let payloads = rows
            .into_iter()
            .filter_map(|row| row.get("payload").cloned())
            .map(|mut payload| {
                postprocess_payload(&mut payload);
                payload
            })
            .collect::<Vec<_>>();
        debug!(rows = payloads.len(), "query executed");
        Ok(payloads)
    }
}

#[async_trait]
impl Database for PostgresBackend {
    async fn any(
        &self,
        sql: &str,
        values: &[Value],
    ) -> std::result::Result<Vec<Value>, StorageError> {
        self.fetch_json(sql, values).await
    }

    async fn one(&self, sql: &str, values: &[Value]) -> std::result::Result<Value, StorageError> {
        self.fetch_json(sql, values)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::no_element("row", sql.chars().take(64).collect::<String>()))
    }

    async fn task(&self, work: ScopedWork) -> std::result::Result<Value, StorageError> {
        work.await
    }

    async fn tx(
        &self,
        options: TransactionOptions,
        work: ScopedWork,
    ) -> std::result::Result<Value, StorageError> {
        transaction::with_transaction(&self.pool, async move {
            if options.read_only {
                self.fetch_rows("SET TRANSACTION READ ONLY", &[]).await?;
            }
            work.await
        })
        .await
    }
}

#[async_trait]
impl ContractReader for PostgresBackend {
    async fn get_by_id(&self, id: Uuid) -> std::result::Result<Option<Contract>, StorageError> {
        PostgresBackend::get_by_id(self, id).await
    }

    async fn get_by_slug(
        &self,
        slug: &str,
        version: &Version,
    ) -> std::result::Result<Option<Contract>, StorageError> {
        PostgresBackend::get_by_slug(self, slug, version).await
    }

    async fn organizations_of(
        &self,
        actor: &Contract,
    ) -> std::result::Result<Vec<Contract>, StorageError> {
        let rows = self
            .fetch_json(
                "SELECT cards.* FROM cards
                 JOIN links ON links.from_id = cards.id
                  AND links.name = (SELECT id FROM strings WHERE string = 'has member')
                  AND links.to_id = $1::uuid
                 WHERE cards.type LIKE 'org@%' AND cards.active",
                &[json!(actor.id.to_string())],
            )
            .await?;
        rows.into_iter().map(contract_from_row).collect()
    }
}

/// Bind JSON values positionally, choosing native bindings for scalars.
fn bind_values<'q>(
    mut query: sqlx_core::query::Query<'q, sqlx_postgres::Postgres, sqlx_postgres::PgArguments>,
    values: &[Value],
) -> sqlx_core::query::Query<'q, sqlx_postgres::Postgres, sqlx_postgres::PgArguments> {
    for value in values {
        query = match value {
            Value::String(s) => query.bind(s.clone()),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) if n.is_i64() => query.bind(n.as_i64().unwrap_or_default()),
            Value::Number(n) => query.bind(n.as_f64().unwrap_or_default()),
            Value::Null => query.bind(Option::<String>::None),
            other => query.bind(other.clone()),
        };
    }
    query
}

/// Turn a `row_to_json(cards)` object back into a typed contract,
/// recomposing the version from its five columns.
pub fn contract_from_row(row: Value) -> std::result::Result<Contract, StorageError> {
    let mut row = match row {
        Value::Object(obj) => obj,
        other => {
            return Err(StorageError::internal(format!(
                "expected a row object, got {other}"
            )));
        }
    };
    let version = version_from_fields(&row);
    let mut value = Map::new();
    value.insert(
        "version".to_string(),
        serde_json::to_value(&version).map_err(|e| StorageError::internal(e.to_string()))?,
    );
    for key in [
        "id",
        "slug",
        "type",
        "name",
        "tags",
        "markers",
        "created_at",
        "updated_at",
        "active",
        "requires",
        "capabilities",
        "linked_at",
        "links",
        "data",
    ] {
        if let Some(field) = row.remove(key) {
            if !field.is_null() {
                value.insert(key.to_string(), field);
            }
        }
    }
    serde_json::from_value(Value::Object(value))
        .map_err(|e| StorageError::internal(format!("malformed contract row: {e}")))
}

fn version_from_fields(row: &Map<String, Value>) -> Version {
    let int = |key: &str| row.get(key).and_then(Value::as_i64).unwrap_or(0) as i32;
    let text = |key: &str| {
        row.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Version {
        major: int("version_major"),
        minor: int("version_minor"),
        patch: int("version_patch"),
        prerelease: text("version_prerelease"),
        build: text("version_build"),
        latest: false,
    }
}

/// Post-process a query payload: recompose the rendered `version` from the
/// five version columns, there and in every materialized link.
pub fn postprocess_payload(payload: &mut Value) {
    let Some(obj) = payload.as_object_mut() else {
        return;
    };
    if obj.contains_key("version_major") {
        let version = version_from_fields(obj);
        for key in [
            "version_major",
            "version_minor",
            "version_patch",
            "version_prerelease",
            "version_build",
        ] {
            obj.remove(key);
        }
        obj.insert("version".to_string(), json!(version.to_string()));
    }
    if let Some(links) = obj.get_mut("links").and_then(Value::as_object_mut) {
        for (_, linked) in links.iter_mut() {
            if let Some(items) = linked.as_array_mut() {
                for item in items {
                    postprocess_payload(item);
                }
            }
        }
    }
}
