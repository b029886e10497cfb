//! # Offline Mutation Repository
//!
//! The durable half of the offline queue.
//!
//! ## Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  add()            INSERT ... synced = 0                                │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  list_unsynced()  SELECT ... WHERE synced = 0                          │
//! │    │              ORDER BY created_at_ms, seq                          │
//! │    │                                                                    │
//! │    ├── replay ok ───► mark_synced()  synced = 1                        │
//! │    │                      │                                             │
//! │    │                      ▼                                             │
//! │    │                  delete()       row gone                          │
//! │    │                                                                    │
//! │    ├── replay failed ► record_failure()  attempts += 1, last_error     │
//! │    │                   (row stays for the next drain)                  │
//! │    │                                                                    │
//! │    └── create accepted ► retarget_unsynced()  temp _id ──► server _id  │
//! │                          in later rows of the same entity type        │
//! │                                                                         │
//! │  purge_synced()   clears rows a crash left between mark and delete     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tindahan_core::{EntityType, MutationAction, QueuedMutation};

const SELECT_COLUMNS: &str = "SELECT id, entity_type, action, payload, temp_id, cache_scope, \
     created_at_ms, synced, attempts, last_error FROM offline_mutations";

#[derive(Debug, FromRow)]
struct MutationRow {
    id: String,
    entity_type: EntityType,
    action: MutationAction,
    payload: String,
    temp_id: Option<String>,
    cache_scope: Option<String>,
    created_at_ms: i64,
    synced: bool,
    attempts: i64,
    last_error: Option<String>,
}

impl TryFrom<MutationRow> for QueuedMutation {
    type Error = DbError;

    fn try_from(row: MutationRow) -> DbResult<Self> {
        let payload = serde_json::from_str(&row.payload).map_err(|e| DbError::CorruptRecord {
            id: row.id.clone(),
            reason: e.to_string(),
        })?;
        let created_at =
            DateTime::<Utc>::from_timestamp_millis(row.created_at_ms).ok_or_else(|| {
                DbError::CorruptRecord {
                    id: row.id.clone(),
                    reason: format!("invalid timestamp {}", row.created_at_ms),
                }
            })?;

        Ok(QueuedMutation {
            id: row.id,
            entity_type: row.entity_type,
            action: row.action,
            payload,
            temp_id: row.temp_id,
            cache_scope: row.cache_scope,
            created_at,
            synced: row.synced,
            attempts: row.attempts,
            last_error: row.last_error,
        })
    }
}

fn into_mutations(rows: Vec<MutationRow>) -> DbResult<Vec<QueuedMutation>> {
    rows.into_iter().map(QueuedMutation::try_from).collect()
}

/// Repository for the `offline_mutations` table.
#[derive(Debug, Clone)]
pub struct OfflineMutationRepository {
    pool: SqlitePool,
}

impl OfflineMutationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OfflineMutationRepository { pool }
    }

    /// Inserts a new queued mutation.
    ///
    /// Fails with [`DbError::UniqueViolation`] if the id is already stored.
    pub async fn add(&self, mutation: &QueuedMutation) -> DbResult<()> {
        let payload = serde_json::to_string(&mutation.payload).map_err(|e| {
            DbError::CorruptRecord {
                id: mutation.id.clone(),
                reason: e.to_string(),
            }
        })?;

        debug!(
            id = %mutation.id,
            entity_type = %mutation.entity_type,
            action = %mutation.action,
            "Adding offline mutation"
        );

        sqlx::query(
            r#"
            INSERT INTO offline_mutations (
                id, entity_type, action, payload, temp_id, cache_scope,
                created_at_ms, synced, attempts, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&mutation.id)
        .bind(mutation.entity_type)
        .bind(mutation.action)
        .bind(payload)
        .bind(&mutation.temp_id)
        .bind(&mutation.cache_scope)
        .bind(mutation.created_at.timestamp_millis())
        .bind(mutation.synced)
        .bind(mutation.attempts)
        .bind(&mutation.last_error)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &mutation.id),
            other => other,
        })?;

        Ok(())
    }

    /// Gets one queued mutation by id.
    pub async fn get(&self, id: &str) -> DbResult<Option<QueuedMutation>> {
        let row = sqlx::query_as::<_, MutationRow>(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueuedMutation::try_from).transpose()
    }

    /// Gets every stored mutation, synced or not, in insertion order.
    pub async fn get_all(&self) -> DbResult<Vec<QueuedMutation>> {
        let rows = sqlx::query_as::<_, MutationRow>(&format!("{SELECT_COLUMNS} ORDER BY seq ASC"))
            .fetch_all(&self.pool)
            .await?;

        into_mutations(rows)
    }

    /// Lists unsynced mutations of one entity type, oldest first.
    ///
    /// Mutations enqueued in the same millisecond keep their insertion
    /// order through `seq`.
    pub async fn list_unsynced(&self, entity_type: EntityType) -> DbResult<Vec<QueuedMutation>> {
        let rows = sqlx::query_as::<_, MutationRow>(&format!(
            "{SELECT_COLUMNS} WHERE entity_type = ?1 AND synced = 0 \
             ORDER BY created_at_ms ASC, seq ASC"
        ))
        .bind(entity_type)
        .fetch_all(&self.pool)
        .await?;

        into_mutations(rows)
    }

    /// Flags a mutation as accepted by the server.
    pub async fn mark_synced(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE offline_mutations SET
                synced = 1,
                attempted_at_ms = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Offline mutation", id));
        }
        Ok(())
    }

    /// Records a failed replay attempt. The row stays queued.
    pub async fn record_failure(&self, id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE offline_mutations SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at_ms = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Rewrites `_id` from `from` to `to` in every unsynced payload of one
    /// entity type that targets `from`.
    ///
    /// ## Returns
    /// Number of rewritten rows.
    pub async fn retarget_unsynced(
        &self,
        entity_type: EntityType,
        from: &str,
        to: &str,
    ) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, MutationRow>(&format!(
            "{SELECT_COLUMNS} WHERE entity_type = ?1 AND synced = 0"
        ))
        .bind(entity_type)
        .fetch_all(&mut *tx)
        .await?;

        let mut rewritten = 0;
        for mut mutation in into_mutations(rows)? {
            if !mutation.retarget(from, to) {
                continue;
            }
            let payload = serde_json::to_string(&mutation.payload).map_err(|e| {
                DbError::CorruptRecord {
                    id: mutation.id.clone(),
                    reason: e.to_string(),
                }
            })?;
            sqlx::query("UPDATE offline_mutations SET payload = ?2 WHERE id = ?1")
                .bind(&mutation.id)
                .bind(payload)
                .execute(&mut *tx)
                .await?;
            rewritten += 1;
        }

        tx.commit().await?;

        if rewritten > 0 {
            debug!(entity_type = %entity_type, from, to, rewritten, "Retargeted queued mutations");
        }
        Ok(rewritten)
    }

    /// Deletes a mutation. Returns false if it was already gone.
    pub async fn delete(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM offline_mutations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Counts unsynced mutations of one entity type.
    pub async fn count_unsynced(&self, entity_type: EntityType) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM offline_mutations WHERE entity_type = ?1 AND synced = 0",
        )
        .bind(entity_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts unsynced mutations across every entity type.
    pub async fn count_all_unsynced(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM offline_mutations WHERE synced = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Unsynced counts grouped by entity type. Types with nothing pending
    /// are omitted.
    pub async fn unsynced_counts(&self) -> DbResult<Vec<(EntityType, i64)>> {
        let counts = sqlx::query_as::<_, (EntityType, i64)>(
            r#"
            SELECT entity_type, COUNT(*)
            FROM offline_mutations
            WHERE synced = 0
            GROUP BY entity_type
            ORDER BY entity_type
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }

    /// Deletes rows that were marked synced but never removed.
    ///
    /// ## Returns
    /// Number of deleted rows.
    pub async fn purge_synced(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM offline_mutations WHERE synced = 1")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
