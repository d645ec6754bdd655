//! Ticket reservation pipeline (the only place that mutates inventory).
//!
//! ## Reservation Flow
//!
//! ```text
//! Vec<CartItem>
//!   ↓
//! 1. Validate batch (non-empty, positive quantities); no store access on failure
//!   ↓
//! 2. Acquire the process-wide admission lock
//!   ↓
//! 3. Begin one store transaction
//!   ↓
//! 4. Per line item, in order: read row FOR UPDATE → check stock →
//!    write decremented count → append ledger row
//!   ↓
//! 5. Commit (all lines succeeded) or roll back (any line failed)
//!   ↓
//! 6. Release the admission lock (guard drop)
//! ```
//!
//! ## Mutual Exclusion
//!
//! Two layers, intentionally redundant:
//!
//! - **Admission lock**: a single `tokio::sync::Mutex` held across the whole
//!   transaction. Only one batch is ever inside steps 3-5, whatever events it
//!   touches, so there is no cross-event lock ordering to get wrong. The mutex is
//!   FIFO-fair, so batches are serviced in the order they queued for it.
//! - **Row locks**: `read_for_update` holds a write-exclusive lock on each event
//!   row until commit/rollback. When several processes share one database the
//!   admission lock no longer serializes them and correctness rests on this layer
//!   alone.
//!
//! ## Failure Semantics
//!
//! A batch is accepted only as a whole. Any failure unwinds the transaction, so
//! a rejected or failed batch leaves inventory and the ledger untouched and is
//! always safe for the caller to resubmit. The engine itself never retries.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

use ticketqueen_core::{DomainError, EventId, ReservationId};
use ticketqueen_inventory::{CartItem, Event, InsufficientInventory, PurchaseBatch, PurchaseRecord, Reservation};

use crate::store::{InventoryStore, StoreError, StoreTransaction};

/// Why a purchase batch was not accepted.
///
/// Exactly one of these (or a committed [`Reservation`]) is the outcome of
/// every call to [`ReservationEngine::reserve`].
#[derive(Debug, Error)]
pub enum ReserveError {
    /// Empty batch or non-positive quantity, rejected before touching the
    /// store. Also used when a line's `quantity × price` overflows; that is
    /// only known once the row is read, so the transaction is rolled back.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A line item referenced an event that does not exist.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// A line item asked for more tickets than remained at validation time.
    #[error("event {event_id}: requested {requested} tickets, only {available} available")]
    InsufficientInventory {
        event_id: EventId,
        available: u32,
        requested: u32,
    },

    /// The store could not begin, read, write, or commit. Retryable.
    #[error("inventory store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl ReserveError {
    /// Only infrastructure failures are worth retrying unchanged; business
    /// rejections will repeat until the batch is corrected.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReserveError::StoreUnavailable(_))
    }

    fn malformed(err: DomainError) -> Self {
        ReserveError::MalformedRequest(err.to_string())
    }
}

impl From<InsufficientInventory> for ReserveError {
    fn from(value: InsufficientInventory) -> Self {
        ReserveError::InsufficientInventory {
            event_id: value.event_id,
            available: value.available,
            requested: value.requested,
        }
    }
}

/// Serializing, all-or-nothing ticket reservation engine.
///
/// Cloning is cheap; every clone shares the same store and admission lock.
///
/// ## Generic Parameters
///
/// - `S`: inventory store (`InMemoryInventoryStore` in tests/dev,
///   `PostgresInventoryStore` in production)
#[derive(Debug)]
pub struct ReservationEngine<S> {
    shared: Arc<Shared<S>>,
}

#[derive(Debug)]
struct Shared<S> {
    store: S,
    admission: Mutex<()>,
}

impl<S> Clone for ReservationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S> ReservationEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                admission: Mutex::new(()),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }
}

impl<S> ReservationEngine<S>
where
    S: InventoryStore + 'static,
{
    /// Current inventory, ordered by ascending event date.
    ///
    /// Read-only; does not take the admission lock.
    #[instrument(skip(self), err)]
    pub async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let events = self.shared.store.list_events().await?;
        debug!(event_count = events.len(), "listed events");
        Ok(events)
    }

    /// Validate and reserve a raw purchase batch.
    #[instrument(skip(self, items), fields(line_items = items.len()))]
    pub async fn reserve(&self, items: Vec<CartItem>) -> Result<Reservation, ReserveError> {
        let batch = match PurchaseBatch::new(items) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "rejected malformed purchase batch");
                return Err(ReserveError::malformed(e));
            }
        };
        self.reserve_batch(&batch).await
    }

    /// Reserve an already validated batch as one indivisible unit.
    ///
    /// The batch runs on its own task. Dropping the returned future (client
    /// disconnect, caller timeout) abandons only the wait for the outcome: the
    /// batch still commits or rolls back before the next one is admitted.
    #[instrument(skip(self, batch), fields(reservation_id = tracing::field::Empty))]
    pub async fn reserve_batch(&self, batch: &PurchaseBatch) -> Result<Reservation, ReserveError> {
        let reservation_id = ReservationId::new();
        Span::current().record("reservation_id", tracing::field::display(reservation_id));

        let shared = Arc::clone(&self.shared);
        let batch = batch.clone();
        let task = tokio::spawn(
            async move { shared.run_to_completion(reservation_id, &batch).await }.instrument(Span::current()),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!(error = %e, "reservation task cancelled");
                Err(ReserveError::StoreUnavailable(StoreError::Transaction(format!(
                    "reservation task cancelled: {e}"
                ))))
            }
        }
    }
}

impl<S> Shared<S>
where
    S: InventoryStore,
{
    async fn run_to_completion(
        &self,
        reservation_id: ReservationId,
        batch: &PurchaseBatch,
    ) -> Result<Reservation, ReserveError> {
        let _admission = self.admission.lock().await;
        debug!(line_items = batch.len(), tickets = batch.ticket_count(), "admitted purchase batch");

        let mut tx = self.store.begin().await.inspect_err(|e| {
            error!(error = %e, "failed to begin inventory transaction");
        })?;

        let outcome = match apply_lines(&mut tx, reservation_id, batch).await {
            Ok(purchases) => Reservation::new(reservation_id, purchases).map_err(ReserveError::malformed),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(reservation) => {
                tx.commit().await.inspect_err(|e| {
                    error!(error = %e, "failed to commit inventory transaction");
                })?;
                info!(
                    tickets = reservation.ticket_count(),
                    total_price = %reservation.total_price,
                    "purchase completed"
                );
                Ok(reservation)
            }
            Err(err) => {
                if let Err(rb) = tx.rollback().await {
                    // The transaction is dropped either way; nothing was committed.
                    warn!(error = %rb, "rollback failed");
                }
                log_rejection(&err);
                Err(err)
            }
        }
    }
}

async fn apply_lines<T>(
    tx: &mut T,
    reservation_id: ReservationId,
    batch: &PurchaseBatch,
) -> Result<Vec<PurchaseRecord>, ReserveError>
where
    T: StoreTransaction,
{
    let mut purchases = Vec::with_capacity(batch.len());

    for line in batch.lines() {
        debug!(event_id = %line.event_id, quantity = line.quantity, "processing line item");

        let mut event = tx
            .read_for_update(line.event_id)
            .await?
            .ok_or(ReserveError::EventNotFound(line.event_id))?;

        event.take(line.quantity)?;
        tx.write_available(event.id(), event.available()).await?;

        let record = PurchaseRecord::for_line(reservation_id, &event, line.quantity, Utc::now())
            .map_err(ReserveError::malformed)?;
        tx.append_purchase(&record).await?;
        purchases.push(record);
    }

    Ok(purchases)
}

fn log_rejection(err: &ReserveError) {
    match err {
        ReserveError::EventNotFound(id) => warn!(event_id = %id, "event not found; batch rolled back"),
        ReserveError::InsufficientInventory {
            event_id,
            available,
            requested,
        } => warn!(
            event_id = %event_id,
            available,
            requested,
            "not enough tickets; batch rolled back"
        ),
        ReserveError::MalformedRequest(msg) => warn!(reason = %msg, "malformed batch; rolled back"),
        ReserveError::StoreUnavailable(e) => error!(error = %e, "store failure; batch rolled back"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use ticketqueen_core::Money;

    use crate::store::{InMemoryInventoryStore, InMemoryTransaction};

    const E1: EventId = EventId::new(1);
    const E2: EventId = EventId::new(2);
    const E99: EventId = EventId::new(99);

    fn event(id: EventId, price: u64, total: u32, available: u32) -> Event {
        Event::new(
            id,
            format!("Event {id}"),
            Utc.with_ymd_and_hms(2026, 12, 1, 19, 30, 0).unwrap(),
            "Stadium",
            Money::from_minor(price),
            total,
        )
        .unwrap()
        .with_available(available)
        .unwrap()
    }

    fn engine_with(events: Vec<Event>) -> ReservationEngine<InMemoryInventoryStore> {
        ReservationEngine::new(InMemoryInventoryStore::with_events(events).unwrap())
    }

    fn item(id: EventId, qty: i64) -> CartItem {
        CartItem::new(id, qty)
    }

    #[tokio::test]
    async fn reserving_within_stock_decrements_and_records_purchase() {
        let engine = engine_with(vec![event(E1, 2_000, 10, 10)]);

        let reservation = engine.reserve(vec![item(E1, 3)]).await.unwrap();

        let store = engine.store();
        assert_eq!(store.event(E1).unwrap().available(), 7);
        let ledger = store.purchases();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].event_id, E1);
        assert_eq!(ledger[0].quantity, 3);
        assert_eq!(ledger[0].total_price, Money::from_minor(6_000));
        assert_eq!(ledger[0].reservation_id, reservation.id);
        assert_eq!(reservation.total_price, Money::from_minor(6_000));
    }

    #[tokio::test]
    async fn requesting_more_than_available_is_rejected_without_change() {
        let engine = engine_with(vec![event(E1, 2_000, 10, 2)]);

        let err = engine.reserve(vec![item(E1, 5)]).await.unwrap_err();

        assert!(matches!(
            err,
            ReserveError::InsufficientInventory { event_id, available: 2, requested: 5 } if event_id == E1
        ));
        assert!(!err.is_retryable());
        assert_eq!(engine.store().event(E1).unwrap().available(), 2);
        assert!(engine.store().purchases().is_empty());
    }

    #[tokio::test]
    async fn unknown_event_rolls_back_earlier_lines() {
        let engine = engine_with(vec![event(E1, 2_000, 10, 10)]);

        let err = engine.reserve(vec![item(E1, 2), item(E99, 1)]).await.unwrap_err();

        assert!(matches!(err, ReserveError::EventNotFound(id) if id == E99));
        assert_eq!(engine.store().event(E1).unwrap().available(), 10);
        assert!(engine.store().purchases().is_empty());
    }

    #[tokio::test]
    async fn shortfall_on_a_later_line_rolls_back_the_whole_batch() {
        let engine = engine_with(vec![event(E1, 1_000, 10, 10), event(E2, 500, 5, 1)]);

        let err = engine.reserve(vec![item(E1, 4), item(E2, 2)]).await.unwrap_err();

        assert!(matches!(err, ReserveError::InsufficientInventory { event_id, .. } if event_id == E2));
        assert_eq!(engine.store().event(E1).unwrap().available(), 10);
        assert_eq!(engine.store().event(E2).unwrap().available(), 1);
        assert!(engine.store().purchases().is_empty());
    }

    #[tokio::test]
    async fn repeated_event_lines_are_separate_decrements() {
        let engine = engine_with(vec![event(E1, 1_000, 5, 5)]);

        let reservation = engine.reserve(vec![item(E1, 2), item(E1, 3)]).await.unwrap();
        assert_eq!(reservation.purchases.len(), 2);
        assert_eq!(engine.store().event(E1).unwrap().available(), 0);

        let engine = engine_with(vec![event(E1, 1_000, 5, 5)]);
        let err = engine.reserve(vec![item(E1, 3), item(E1, 3)]).await.unwrap_err();
        assert!(matches!(
            err,
            ReserveError::InsufficientInventory { available: 2, requested: 3, .. }
        ));
        assert_eq!(engine.store().event(E1).unwrap().available(), 5);
    }

    #[tokio::test]
    async fn multi_event_batch_commits_every_line() {
        let engine = engine_with(vec![event(E1, 1_500, 10, 10), event(E2, 800, 20, 20)]);

        let reservation = engine.reserve(vec![item(E2, 5), item(E1, 1)]).await.unwrap();

        assert_eq!(engine.store().event(E1).unwrap().available(), 9);
        assert_eq!(engine.store().event(E2).unwrap().available(), 15);
        let events: Vec<EventId> = reservation.purchases.iter().map(|p| p.event_id).collect();
        assert_eq!(events, vec![E2, E1]);
        assert_eq!(reservation.total_price, Money::from_minor(5 * 800 + 1_500));
        assert_eq!(engine.store().purchases(), reservation.purchases);
    }

    #[tokio::test]
    async fn rejected_batch_is_rejected_again_identically() {
        let engine = engine_with(vec![event(E1, 1_000, 10, 2)]);

        let first = engine.reserve(vec![item(E1, 5)]).await.unwrap_err();
        let second = engine.reserve(vec![item(E1, 5)]).await.unwrap_err();

        assert_eq!(first.to_string(), second.to_string());
    }

    #[tokio::test]
    async fn list_events_reflects_committed_reservations() {
        let engine = engine_with(vec![event(E1, 1_000, 10, 10)]);
        engine.reserve(vec![item(E1, 4)]).await.unwrap();

        let listed = engine.list_events().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].available(), 6);
    }

    /// Store that counts `begin` calls and can be told to fail.
    #[derive(Debug, Default)]
    struct ProbeStore {
        inner: InMemoryInventoryStore,
        begins: AtomicUsize,
        fail_begin: bool,
        /// Fails the commit of the next transaction only.
        fail_next_commit: AtomicBool,
    }

    struct ProbeTransaction {
        inner: InMemoryTransaction,
        fail_commit: bool,
    }

    #[async_trait]
    impl StoreTransaction for ProbeTransaction {
        async fn read_for_update(&mut self, event_id: EventId) -> Result<Option<Event>, StoreError> {
            self.inner.read_for_update(event_id).await
        }

        async fn write_available(&mut self, event_id: EventId, available: u32) -> Result<(), StoreError> {
            self.inner.write_available(event_id, available).await
        }

        async fn append_purchase(&mut self, record: &PurchaseRecord) -> Result<(), StoreError> {
            self.inner.append_purchase(record).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            if self.fail_commit {
                self.inner.rollback().await?;
                return Err(StoreError::Transaction("connection reset during commit".to_string()));
            }
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<(), StoreError> {
            self.inner.rollback().await
        }
    }

    #[async_trait]
    impl InventoryStore for ProbeStore {
        type Transaction = ProbeTransaction;

        async fn begin(&self) -> Result<Self::Transaction, StoreError> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            if self.fail_begin {
                return Err(StoreError::Connection("database is down".to_string()));
            }
            Ok(ProbeTransaction {
                inner: self.inner.begin().await?,
                fail_commit: self.fail_next_commit.swap(false, Ordering::SeqCst),
            })
        }

        async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
            self.inner.list_events().await
        }
    }

    fn probe(fail_begin: bool, fail_commit: bool) -> ReservationEngine<ProbeStore> {
        ReservationEngine::new(ProbeStore {
            inner: InMemoryInventoryStore::with_events(vec![event(E1, 1_000, 10, 10)]).unwrap(),
            fail_begin,
            fail_next_commit: AtomicBool::new(fail_commit),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn malformed_batches_never_reach_the_store() {
        let engine = probe(false, false);

        let zero = engine.reserve(vec![item(E1, 0)]).await.unwrap_err();
        let empty = engine.reserve(Vec::new()).await.unwrap_err();

        assert!(matches!(zero, ReserveError::MalformedRequest(_)));
        assert!(matches!(empty, ReserveError::MalformedRequest(_)));
        assert_eq!(engine.store().begins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn begin_failure_is_a_retryable_store_error() {
        let engine = probe(true, false);

        let err = engine.reserve(vec![item(E1, 1)]).await.unwrap_err();

        assert!(matches!(err, ReserveError::StoreUnavailable(StoreError::Connection(_))));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn commit_failure_leaves_inventory_unchanged_and_releases_admission() {
        let engine = probe(false, true);

        let err = engine.reserve(vec![item(E1, 3)]).await.unwrap_err();

        assert!(matches!(err, ReserveError::StoreUnavailable(StoreError::Transaction(_))));
        assert_eq!(engine.store().inner.event(E1).unwrap().available(), 10);
        assert!(engine.store().inner.purchases().is_empty());

        // Same engine, same admission lock: the next batch must be admitted.
        tokio::time::timeout(Duration::from_secs(1), engine.reserve(vec![item(E1, 3)]))
            .await
            .expect("admission lock still held after a failed commit")
            .unwrap();
        assert_eq!(engine.store().inner.event(E1).unwrap().available(), 7);
        assert_eq!(engine.store().begins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn price_overflow_rolls_back_as_malformed() {
        let engine = engine_with(vec![event(E1, 1_000, 10, 10), event(E2, u64::MAX / 2, 10, 10)]);

        let err = engine.reserve(vec![item(E1, 2), item(E2, 3)]).await.unwrap_err();

        assert!(matches!(err, ReserveError::MalformedRequest(_)));
        assert!(!err.is_retryable());
        assert_eq!(engine.store().event(E1).unwrap().available(), 10);
        assert_eq!(engine.store().event(E2).unwrap().available(), 10);
        assert!(engine.store().purchases().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_caller_does_not_cut_an_admitted_batch_short() {
        let engine = engine_with(vec![event(E1, 1_000, 10, 10), event(E2, 500, 5, 5)]);

        // Another transaction holds E1, so the batch stalls after admission.
        let mut holder = engine.store().begin().await.unwrap();
        holder.read_for_update(E1).await.unwrap();

        let gave_up = tokio::time::timeout(Duration::from_millis(50), engine.reserve(vec![item(E1, 3)])).await;
        assert!(gave_up.is_err(), "batch should still be waiting on the row lock");

        // E2 is free, so only the admission lock can hold this one back.
        let next = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.reserve(vec![item(E2, 1)]).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!next.is_finished(), "next batch admitted while the first was still running");

        holder.rollback().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), next)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // The abandoned batch committed before the next one ran.
        assert_eq!(engine.store().event(E1).unwrap().available(), 7);
        assert_eq!(engine.store().event(E2).unwrap().available(), 4);
        let ledger: Vec<EventId> = engine.store().purchases().iter().map(|p| p.event_id).collect();
        assert_eq!(ledger, vec![E1, E2]);
    }
}
