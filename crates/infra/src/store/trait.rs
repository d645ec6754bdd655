use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use ticketqueen_core::EventId;
use ticketqueen_inventory::{Event, PurchaseRecord};

/// Inventory store operation error.
///
/// These are **infrastructure errors** (connectivity, transaction failures,
/// corrupt rows). Business rejections such as "not enough tickets" never show up
/// here; they are decided by the reservation engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("query failed: {0}")]
    Query(String),

    /// A stored row could not be turned back into a valid domain value.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// A write would break a storage constraint (e.g. `available > total`).
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// A write targeted a row the transaction never locked with `read_for_update`.
    #[error("event {0} was not read for update in this transaction")]
    RowNotLocked(EventId),

    #[error("event {0} already exists")]
    DuplicateEvent(EventId),

    #[error("lock poisoned")]
    Poisoned,
}

/// One open transaction against the inventory store.
///
/// Dropping a transaction without calling [`commit`](StoreTransaction::commit)
/// discards every staged write and releases its row locks.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Read an event row and hold a write-exclusive lock on it until the
    /// transaction ends. Returns `Ok(None)` if no such event exists.
    ///
    /// Reading a row this transaction already holds returns its pending state
    /// instead of blocking on itself.
    async fn read_for_update(&mut self, event_id: EventId) -> Result<Option<Event>, StoreError>;

    /// Stage a new remaining count for a row previously read for update.
    async fn write_available(&mut self, event_id: EventId, available: u32) -> Result<(), StoreError>;

    /// Stage an append-only ledger row.
    async fn append_purchase(&mut self, record: &PurchaseRecord) -> Result<(), StoreError>;

    /// Make every staged write visible atomically and release row locks.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard every staged write and release row locks.
    async fn rollback(self) -> Result<(), StoreError>;
}

/// Durable record of events and their remaining ticket counts.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    type Transaction: StoreTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError>;

    /// All events ordered by ascending date (ties by id). Reads committed state
    /// only and takes no row locks.
    async fn list_events(&self) -> Result<Vec<Event>, StoreError>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    type Transaction = S::Transaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError> {
        (**self).begin().await
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        (**self).list_events().await
    }
}
