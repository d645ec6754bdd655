//! Postgres-backed inventory store implementation.
//!
//! Row locking is delegated to PostgreSQL: `read_for_update` issues
//! `SELECT ... FOR UPDATE`, which blocks any other transaction's locking read of
//! the same row until this transaction commits or rolls back. The `events`
//! table also carries a `CHECK (available >= 0 AND available <= total)`
//! constraint, so the oversell invariant holds even for writers that bypass the
//! reservation engine.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (check violation) | `23514` | `Constraint` |
//! | Database (unique violation) | `23505` | `Constraint` |
//! | Database (foreign key violation) | `23503` | `Constraint` |
//! | Database (other) | Any other | `Query` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Connection` |
//! | ColumnDecode / Decode / ColumnNotFound | N/A | `CorruptRow` |
//! | Other | N/A | `Query` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use ticketqueen_core::{EventId, Money};
use ticketqueen_inventory::{Event, PurchaseRecord};

use super::r#trait::{InventoryStore, StoreError, StoreTransaction};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id        BIGINT      PRIMARY KEY,
        name      TEXT        NOT NULL,
        date      TIMESTAMPTZ NOT NULL,
        venue     TEXT        NOT NULL,
        price     BIGINT      NOT NULL CHECK (price >= 0),
        available BIGINT      NOT NULL,
        total     BIGINT      NOT NULL CHECK (total >= 0),
        CONSTRAINT events_available_bounds CHECK (available >= 0 AND available <= total)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS purchases (
        id             UUID        PRIMARY KEY,
        reservation_id UUID        NOT NULL,
        event_id       BIGINT      NOT NULL REFERENCES events (id),
        quantity       BIGINT      NOT NULL CHECK (quantity > 0),
        purchase_date  TIMESTAMPTZ NOT NULL,
        total_price    BIGINT      NOT NULL CHECK (total_price >= 0)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS events_date_idx ON events (date, id)",
    "CREATE INDEX IF NOT EXISTS purchases_reservation_idx ON purchases (reservation_id)",
];

/// Postgres-backed inventory store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; every reservation
/// runs inside its own pooled transaction.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
}

impl PostgresInventoryStore {
    /// Create a new store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Round-trip a trivial query to prove the database is reachable.
    #[instrument(skip(self), err)]
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }

    /// Create the `events` and `purchases` relations if they are missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    /// Insert events that do not exist yet; existing rows are left untouched.
    ///
    /// Returns the number of rows inserted.
    #[instrument(skip(self, events), fields(event_count = events.len()), err)]
    pub async fn seed_events(&self, events: &[Event]) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut inserted = 0;
        for event in events {
            let result = sqlx::query(
                r#"
                INSERT INTO events (id, name, date, venue, price, available, total)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(event.id().get())
            .bind(event.name())
            .bind(event.date())
            .bind(event.venue())
            .bind(money_to_column(event.price())?)
            .bind(i64::from(event.available()))
            .bind(i64::from(event.total()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("seed_events", e))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(inserted)
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    type Transaction = PostgresTransaction;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Transaction, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTransaction { tx })
    }

    #[instrument(skip(self), err)]
    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, date, venue, price, available, total
            FROM events
            ORDER BY date ASC, id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_events", e))?;

        rows.iter().map(decode_event).collect()
    }
}

/// Open Postgres transaction. Dropping it without committing rolls it back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    #[instrument(skip(self), fields(event_id = %event_id), err)]
    async fn read_for_update(&mut self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, date, venue, price, available, total
            FROM events
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(event_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("read_for_update", e))?;

        row.as_ref().map(decode_event).transpose()
    }

    #[instrument(skip(self), fields(event_id = %event_id), err)]
    async fn write_available(&mut self, event_id: EventId, available: u32) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE events SET available = $1 WHERE id = $2")
            .bind(i64::from(available))
            .bind(event_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("write_available", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::RowNotLocked(event_id));
        }
        Ok(())
    }

    #[instrument(skip(self, record), fields(event_id = %record.event_id, quantity = record.quantity), err)]
    async fn append_purchase(&mut self, record: &PurchaseRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO purchases (id, reservation_id, event_id, quantity, purchase_date, total_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*record.id.as_uuid())
        .bind(*record.reservation_id.as_uuid())
        .bind(record.event_id.get())
        .bind(i64::from(record.quantity))
        .bind(record.purchased_at)
        .bind(money_to_column(record.total_price)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_purchase", e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Raw `events` row as stored.
#[derive(Debug)]
struct EventRow {
    id: i64,
    name: String,
    date: DateTime<Utc>,
    venue: String,
    price: i64,
    available: i64,
    total: i64,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            date: row.try_get("date")?,
            venue: row.try_get("venue")?,
            price: row.try_get("price")?,
            available: row.try_get("available")?,
            total: row.try_get("total")?,
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let id = EventId::new(row.id);
        let corrupt = |what: &str, value: i64| StoreError::CorruptRow(format!("event {id}: {what} = {value}"));

        let price = Money::try_from(row.price).map_err(|_| corrupt("price", row.price))?;
        let total = u32::try_from(row.total).map_err(|_| corrupt("total", row.total))?;
        let available = u32::try_from(row.available).map_err(|_| corrupt("available", row.available))?;

        Event::new(id, row.name, row.date, row.venue, price, total)
            .and_then(|e| e.with_available(available))
            .map_err(|e| StoreError::CorruptRow(e.to_string()))
    }
}

fn decode_event(row: &PgRow) -> Result<Event, StoreError> {
    let raw = EventRow::from_row(row).map_err(|e| StoreError::CorruptRow(format!("failed to decode event row: {e}")))?;
    Event::try_from(raw)
}

fn money_to_column(amount: Money) -> Result<i64, StoreError> {
    i64::try_from(amount.minor()).map_err(|_| StoreError::Constraint(format!("amount {amount} exceeds BIGINT")))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23514") | Some("23505") | Some("23503") => {
                StoreError::Constraint(format!("{operation}: {}", db.message()))
            }
            _ => StoreError::Query(format!("{operation}: {}", db.message())),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StoreError::Connection(format!("{operation}: {err}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::CorruptRow(format!("{operation}: {err}"))
        }
        _ => StoreError::Query(format!("{operation}: {err}")),
    }
}
