//! Postgres-backed event store.
//!
//! Streams live in a single `events` table keyed by
//! `(tenant_id, aggregate_id, sequence_number)`. A concurrent writer that
//! slips past the version check trips the unique constraint, which surfaces
//! as [`EventStoreError::Concurrency`].
//!
//! | SQLx error | Postgres code | `EventStoreError` |
//! |------------|---------------|-------------------|
//! | unique violation | `23505` | `Concurrency` |
//! | check violation | `23514` | `InvalidAppend` |
//! | anything else | - | `Backend` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use ironbooks_core::{AggregateId, ExpectedVersion, TenantId};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_batch};

const SCHEMA: &str = include_str!("../../migrations/0001_events.sql");

const SELECT_COLUMNS: &str = r#"
    SELECT
        event_id,
        tenant_id,
        aggregate_id,
        aggregate_type,
        sequence_number,
        event_type,
        event_version,
        occurred_at,
        payload
    FROM events
"#;

#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply the schema. Safe to call on an initialised database.
    pub async fn connect(database_url: &str) -> Result<Self, EventStoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, events), fields(event_count = events.len()), err)]
    async fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let (tenant_id, aggregate_id, aggregate_type) = validate_batch(&events)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_type) =
            check_stream_version(&mut tx, tenant_id, aggregate_id).await?;

        if let Some(existing) = existing_type {
            if existing != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        if !expected_version.matches(current_version) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        for (event, sequence_number) in events.into_iter().zip(current_version + 1..) {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id,
                    tenant_id,
                    aggregate_id,
                    aggregate_type,
                    sequence_number,
                    event_type,
                    event_version,
                    occurred_at,
                    payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.event_id)
            .bind(*tenant_id.as_uuid())
            .bind(*aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(sequence_number as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                tenant_id: event.tenant_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
        }

        // Dropping the transaction on any early return above rolls it back.
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }

    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, aggregate_id = %aggregate_id),
        err
    )]
    async fn load_stream(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE tenant_id = $1 AND aggregate_id = $2 ORDER BY sequence_number ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(*tenant_id.as_uuid())
            .bind(*aggregate_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_stream", e))?;

        rows.iter().map(stored_event_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY global_position ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_all", e))?;

        rows.iter().map(stored_event_from_row).collect()
    }
}

/// `(current_version, aggregate_type)`; version 0 and `None` for a new stream.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) AS current_version,
            MAX(aggregate_type) AS aggregate_type
        FROM events
        WHERE tenant_id = $1 AND aggregate_id = $2
        "#,
    )
    .bind(*tenant_id.as_uuid())
    .bind(*aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current_version: i64 = row
        .try_get("current_version")
        .map_err(|e| map_sqlx_error("check_stream_version", e))?;
    let aggregate_type: Option<String> = row
        .try_get("aggregate_type")
        .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    Ok((current_version as u64, aggregate_type))
}

fn stored_event_from_row(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let decode = |e: sqlx::Error| EventStoreError::Backend(format!("failed to decode event row: {e}"));

    let sequence_number: i64 = row.try_get("sequence_number").map_err(decode)?;
    let event_version: i32 = row.try_get("event_version").map_err(decode)?;
    let occurred_at: DateTime<Utc> = row.try_get("occurred_at").map_err(decode)?;

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(decode)?,
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode)?),
        aggregate_id: AggregateId::from_uuid(row.try_get("aggregate_id").map_err(decode)?),
        aggregate_type: row.try_get("aggregate_type").map_err(decode)?,
        sequence_number: sequence_number as u64,
        event_type: row.try_get("event_type").map_err(decode)?,
        event_version: event_version as u32,
        occurred_at,
        payload: row.try_get("payload").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
