//! Postgres-backed row store.
//!
//! Every view shares one table; rows are serialized as JSONB. The expected DDL:
//!
//! ```sql
//! CREATE TABLE read_rows (
//!     view                  TEXT    NOT NULL,
//!     row_id                UUID    NOT NULL,
//!     last_applied_sequence BIGINT  NOT NULL,
//!     possibly_stale        BOOLEAN NOT NULL DEFAULT FALSE,
//!     body                  JSONB,
//!     PRIMARY KEY (view, row_id)
//! );
//! ```
//!
//! A `NULL` body is a tombstone.
//!
//! ## Single-row critical section
//!
//! `modify` runs in one transaction: it takes a transaction-scoped advisory lock on
//! `(view, row_id)` (which also covers rows that do not exist yet), reads the row
//! with `SELECT ... FOR UPDATE`, and writes it back before committing.
//!
//! The lock/read and the write/commit are separate `block_on` calls; the mutation runs
//! between them on the calling thread. Open row transactions are capped one below the
//! pool size (see `PgHandle::row_transaction_permit`), so a projector reading a
//! mirror view always finds a free connection.

use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use tracing::instrument;

use tania_core::AggregateId;
use tania_events::JsonValue;

use super::{ReadStoreError, RowMutation, RowStore, StoredRow};
use crate::db::PgHandle;

pub struct PostgresRowStore<V> {
    db: PgHandle,
    view: &'static str,
    _row: PhantomData<fn() -> V>,
}

impl<V> PostgresRowStore<V> {
    pub fn new(db: PgHandle, view: &'static str) -> Self {
        Self {
            db,
            view,
            _row: PhantomData,
        }
    }

    pub fn view(&self) -> &'static str {
        self.view
    }
}

impl<V> std::fmt::Debug for PostgresRowStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRowStore")
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

fn storage(operation: &str, err: impl std::fmt::Display) -> ReadStoreError {
    ReadStoreError::Storage(format!("{operation}: {err}"))
}

fn decode_row<V: DeserializeOwned>(row: &PgRow) -> Result<(AggregateId, StoredRow<V>), ReadStoreError> {
    let row_id: uuid::Uuid = row.try_get("row_id").map_err(|e| storage("decode_row", e))?;
    let sequence: i64 = row
        .try_get("last_applied_sequence")
        .map_err(|e| storage("decode_row", e))?;
    let possibly_stale: bool = row
        .try_get("possibly_stale")
        .map_err(|e| storage("decode_row", e))?;
    let body: Option<JsonValue> = row.try_get("body").map_err(|e| storage("decode_row", e))?;

    let value = body
        .map(|body| serde_json::from_value::<V>(body).map_err(|e| storage("decode_row_body", e)))
        .transpose()?;

    Ok((
        AggregateId::from_uuid(row_id),
        StoredRow {
            row: value,
            last_applied_sequence: sequence.max(0) as u64,
            possibly_stale,
        },
    ))
}

impl<V> PostgresRowStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    #[instrument(skip(self), fields(view = self.view, row_id = %id), err)]
    async fn fetch(&self, id: AggregateId) -> Result<Option<StoredRow<V>>, ReadStoreError> {
        let row = sqlx::query(
            r#"
            SELECT row_id, last_applied_sequence, possibly_stale, body
            FROM read_rows
            WHERE view = $1 AND row_id = $2
            "#,
        )
        .bind(self.view)
        .bind(id.as_uuid())
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| storage("fetch_row", e))?;

        row.as_ref()
            .map(|row| decode_row::<V>(row).map(|(_, stored)| stored))
            .transpose()
    }

    #[instrument(skip(self), fields(view = self.view), err)]
    async fn fetch_all(&self) -> Result<Vec<(AggregateId, StoredRow<V>)>, ReadStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT row_id, last_applied_sequence, possibly_stale, body
            FROM read_rows
            WHERE view = $1
            ORDER BY row_id ASC
            "#,
        )
        .bind(self.view)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| storage("fetch_rows", e))?;

        rows.iter().map(decode_row::<V>).collect()
    }

    /// Open the row's transaction: advisory lock, then the current row `FOR UPDATE`.
    #[instrument(skip(self), fields(view = self.view, row_id = %id), err)]
    async fn lock_row(
        &self,
        id: AggregateId,
    ) -> Result<(Transaction<'static, Postgres>, Option<StoredRow<V>>), ReadStoreError> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| storage("begin_transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || ':' || $2::text, 0))")
            .bind(self.view)
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| storage("lock_row", e))?;

        let row = sqlx::query(
            r#"
            SELECT row_id, last_applied_sequence, possibly_stale, body
            FROM read_rows
            WHERE view = $1 AND row_id = $2
            FOR UPDATE
            "#,
        )
        .bind(self.view)
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| storage("select_for_update", e))?;

        let slot = row
            .as_ref()
            .map(|row| decode_row::<V>(row).map(|(_, stored)| stored))
            .transpose()?;
        Ok((tx, slot))
    }

    /// Write the mutated slot (`None` deletes the row) and commit.
    #[instrument(skip(self, tx, slot), fields(view = self.view, row_id = %id), err)]
    async fn write_row(
        &self,
        mut tx: Transaction<'static, Postgres>,
        id: AggregateId,
        slot: Option<StoredRow<V>>,
    ) -> Result<(), ReadStoreError> {
        match slot {
            Some(stored) => upsert(&mut tx, self.view, id, &stored).await?,
            None => {
                sqlx::query("DELETE FROM read_rows WHERE view = $1 AND row_id = $2")
                    .bind(self.view)
                    .bind(id.as_uuid())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| storage("delete_row", e))?;
            }
        }

        tx.commit().await.map_err(|e| storage("commit_transaction", e))
    }

    #[instrument(skip(self), fields(view = self.view), err)]
    async fn delete_view(&self) -> Result<(), ReadStoreError> {
        sqlx::query("DELETE FROM read_rows WHERE view = $1")
            .bind(self.view)
            .execute(self.db.pool())
            .await
            .map_err(|e| storage("clear_view", e))?;
        Ok(())
    }
}

async fn upsert<V: Serialize>(
    tx: &mut Transaction<'_, Postgres>,
    view: &'static str,
    id: AggregateId,
    stored: &StoredRow<V>,
) -> Result<(), ReadStoreError> {
    let body = stored
        .row
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| storage("encode_row_body", e))?;

    sqlx::query(
        r#"
        INSERT INTO read_rows (view, row_id, last_applied_sequence, possibly_stale, body)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (view, row_id)
        DO UPDATE SET
            last_applied_sequence = EXCLUDED.last_applied_sequence,
            possibly_stale = EXCLUDED.possibly_stale,
            body = EXCLUDED.body
        "#,
    )
    .bind(view)
    .bind(id.as_uuid())
    .bind(stored.last_applied_sequence as i64)
    .bind(stored.possibly_stale)
    .bind(body)
    .execute(&mut **tx)
    .await
    .map_err(|e| storage("upsert_row", e))?;
    Ok(())
}

impl<V> RowStore<V> for PostgresRowStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, id: AggregateId) -> Result<Option<StoredRow<V>>, ReadStoreError> {
        self.db.block_on(self.fetch(id))
    }

    fn all(&self) -> Result<Vec<(AggregateId, StoredRow<V>)>, ReadStoreError> {
        self.db.block_on(self.fetch_all())
    }

    fn modify(&self, id: AggregateId, mutation: RowMutation<'_, V>) -> Result<(), ReadStoreError> {
        // The mutation runs outside `block_on`: projectors read other views through
        // the same handle while this transaction is open.
        let _context = self.db.enter();
        let _permit = self
            .db
            .block_on(self.db.row_transaction_permit())
            .map_err(|e| storage("acquire_row_permit", e))?;

        let (tx, mut slot) = self.db.block_on(self.lock_row(id))?;
        if !mutation(&mut slot) {
            return self
                .db
                .block_on(tx.rollback())
                .map_err(|e| storage("rollback_transaction", e));
        }
        self.db.block_on(self.write_row(tx, id, slot))
    }

    fn clear(&self) -> Result<(), ReadStoreError> {
        self.db.block_on(self.delete_view())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::db::testing;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Plot {
        name: String,
        beds: Vec<u32>,
    }

    fn write(store: &PostgresRowStore<Plot>, id: AggregateId, next: Option<StoredRow<Plot>>) {
        store
            .modify(id, &mut |slot| {
                *slot = next.clone();
                true
            })
            .unwrap();
    }

    #[test]
    #[ignore = "needs TANIA_DATABASE_URL"]
    fn rows_and_tombstones_survive_the_jsonb_round_trip() {
        let Some(db) = testing::database() else {
            return;
        };
        let store = PostgresRowStore::<Plot>::new(db, "test_plots");
        let id = AggregateId::new();
        assert_eq!(store.get(id).unwrap(), None);

        let live = StoredRow {
            row: Some(Plot {
                name: "Terrace".into(),
                beds: vec![3, 5],
            }),
            last_applied_sequence: 4,
            possibly_stale: true,
        };
        write(&store, id, Some(live.clone()));
        assert_eq!(store.get(id).unwrap(), Some(live.clone()));

        // An unchanged mutation rolls back whatever it put in the slot.
        store
            .modify(id, &mut |slot| {
                *slot = None;
                false
            })
            .unwrap();
        assert_eq!(store.get(id).unwrap(), Some(live));

        let tombstone = StoredRow {
            row: None,
            last_applied_sequence: 5,
            possibly_stale: false,
        };
        write(&store, id, Some(tombstone.clone()));
        assert_eq!(store.get(id).unwrap(), Some(tombstone.clone()));
        assert!(store.all().unwrap().contains(&(id, tombstone)));

        write(&store, id, None);
        assert_eq!(store.get(id).unwrap(), None);
    }
}
