use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use ticketqueen_core::EventId;
use ticketqueen_inventory::{Event, PurchaseRecord};

use super::r#trait::{InventoryStore, StoreError, StoreTransaction};

#[derive(Debug, Default)]
struct Committed {
    events: BTreeMap<EventId, Event>,
    purchases: Vec<PurchaseRecord>,
}

#[derive(Debug, Default)]
struct Shared {
    /// Committed state. A commit applies all of its writes under one write guard,
    /// so readers never observe half of a transaction.
    committed: RwLock<Committed>,
    /// One async mutex per event row; transactions hold the owned guard until
    /// they commit or roll back.
    row_locks: RwLock<HashMap<EventId, Arc<Mutex<()>>>>,
}

/// In-memory inventory store with real row-level locking.
///
/// Intended for tests/dev. Cloning the store yields another handle to the same
/// data.
#[derive(Debug, Default, Clone)]
pub struct InMemoryInventoryStore {
    shared: Arc<Shared>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `events`.
    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Result<Self, StoreError> {
        let store = Self::new();
        for event in events {
            store.insert_event(event)?;
        }
        Ok(store)
    }

    /// Seed an event row. Administrative hook; the reservation engine never
    /// creates events.
    pub fn insert_event(&self, event: Event) -> Result<(), StoreError> {
        let id = event.id();
        let mut committed = self.shared.committed.write().map_err(|_| StoreError::Poisoned)?;
        if committed.events.contains_key(&id) {
            return Err(StoreError::DuplicateEvent(id));
        }
        committed.events.insert(id, event);

        let mut locks = self.shared.row_locks.write().map_err(|_| StoreError::Poisoned)?;
        locks.insert(id, Arc::new(Mutex::new(())));
        Ok(())
    }

    /// Committed view of a single event.
    pub fn event(&self, event_id: EventId) -> Option<Event> {
        let committed = self.shared.committed.read().ok()?;
        committed.events.get(&event_id).cloned()
    }

    /// Committed ledger rows in append order.
    pub fn purchases(&self) -> Vec<PurchaseRecord> {
        match self.shared.committed.read() {
            Ok(c) => c.purchases.clone(),
            Err(_) => vec![],
        }
    }

    fn row_lock(&self, event_id: EventId) -> Result<Option<Arc<Mutex<()>>>, StoreError> {
        let locks = self.shared.row_locks.read().map_err(|_| StoreError::Poisoned)?;
        Ok(locks.get(&event_id).cloned())
    }
}

/// Open transaction against an [`InMemoryInventoryStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    store: InMemoryInventoryStore,
    held: HashMap<EventId, OwnedMutexGuard<()>>,
    /// Working copies of every row read for update, including pending writes.
    rows: HashMap<EventId, Event>,
    dirty: Vec<EventId>,
    pending_purchases: Vec<PurchaseRecord>,
}

impl InMemoryTransaction {
    fn new(store: InMemoryInventoryStore) -> Self {
        Self {
            store,
            held: HashMap::new(),
            rows: HashMap::new(),
            dirty: Vec::new(),
            pending_purchases: Vec::new(),
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn read_for_update(&mut self, event_id: EventId) -> Result<Option<Event>, StoreError> {
        if let Some(row) = self.rows.get(&event_id) {
            return Ok(Some(row.clone()));
        }

        let Some(lock) = self.store.row_lock(event_id)? else {
            return Ok(None);
        };
        let guard = lock.lock_owned().await;

        // Read after the lock is held so the value cannot change underneath us.
        let row = {
            let committed = self.store.shared.committed.read().map_err(|_| StoreError::Poisoned)?;
            committed.events.get(&event_id).cloned()
        };

        match row {
            Some(event) => {
                self.held.insert(event_id, guard);
                self.rows.insert(event_id, event.clone());
                Ok(Some(event))
            }
            None => Ok(None),
        }
    }

    async fn write_available(&mut self, event_id: EventId, available: u32) -> Result<(), StoreError> {
        let row = self
            .rows
            .get(&event_id)
            .cloned()
            .ok_or(StoreError::RowNotLocked(event_id))?;
        let updated = row
            .with_available(available)
            .map_err(|e| StoreError::Constraint(e.to_string()))?;

        self.rows.insert(event_id, updated);
        if !self.dirty.contains(&event_id) {
            self.dirty.push(event_id);
        }
        Ok(())
    }

    async fn append_purchase(&mut self, record: &PurchaseRecord) -> Result<(), StoreError> {
        if !self.rows.contains_key(&record.event_id) {
            return Err(StoreError::RowNotLocked(record.event_id));
        }
        self.pending_purchases.push(record.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        {
            let mut committed = self.store.shared.committed.write().map_err(|_| StoreError::Poisoned)?;
            for id in self.dirty.drain(..) {
                if let Some(row) = self.rows.remove(&id) {
                    committed.events.insert(id, row);
                }
            }
            committed.purchases.append(&mut self.pending_purchases);
        }

        // Row locks are released only after the new values are visible.
        self.held.clear();
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError> {
        Ok(InMemoryTransaction::new(self.clone()))
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = {
            let committed = self.shared.committed.read().map_err(|_| StoreError::Poisoned)?;
            committed.events.values().cloned().collect()
        };
        events.sort_by_key(|e| (e.date(), e.id()));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use ticketqueen_core::{Money, ReservationId};

    fn event(id: i64, day: u32, total: u32) -> Event {
        Event::new(
            EventId::new(id),
            format!("Event {id}"),
            Utc.with_ymd_and_hms(2026, 11, day, 20, 0, 0).unwrap(),
            "Arena",
            Money::from_minor(1_000),
            total,
        )
        .unwrap()
    }

    fn store() -> InMemoryInventoryStore {
        InMemoryInventoryStore::with_events(vec![event(1, 5, 10), event(2, 3, 4)]).unwrap()
    }

    #[tokio::test]
    async fn list_events_orders_by_date() {
        let ids: Vec<i64> = store()
            .list_events()
            .await
            .unwrap()
            .iter()
            .map(|e| e.id().get())
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn duplicate_seed_is_rejected() {
        let s = store();
        assert!(matches!(
            s.insert_event(event(1, 1, 1)),
            Err(StoreError::DuplicateEvent(id)) if id == EventId::new(1)
        ));
    }

    #[tokio::test]
    async fn missing_row_reads_as_none() {
        let mut tx = store().begin().await.unwrap();
        assert!(tx.read_for_update(EventId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_publishes_writes_and_ledger() {
        let s = store();
        let mut tx = s.begin().await.unwrap();
        let e = tx.read_for_update(EventId::new(1)).await.unwrap().unwrap();
        tx.write_available(e.id(), 7).await.unwrap();
        let rec = PurchaseRecord::for_line(ReservationId::new(), &e, 3, Utc::now()).unwrap();
        tx.append_purchase(&rec).await.unwrap();

        // Uncommitted writes are invisible to readers.
        assert_eq!(s.event(EventId::new(1)).unwrap().available(), 10);
        assert!(s.purchases().is_empty());

        tx.commit().await.unwrap();
        assert_eq!(s.event(EventId::new(1)).unwrap().available(), 7);
        assert_eq!(s.purchases(), vec![rec]);
    }

    #[tokio::test]
    async fn rollback_and_drop_discard_writes() {
        let s = store();

        let mut tx = s.begin().await.unwrap();
        tx.read_for_update(EventId::new(1)).await.unwrap();
        tx.write_available(EventId::new(1), 0).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(s.event(EventId::new(1)).unwrap().available(), 10);

        {
            let mut tx = s.begin().await.unwrap();
            tx.read_for_update(EventId::new(1)).await.unwrap();
            tx.write_available(EventId::new(1), 0).await.unwrap();
        }
        assert_eq!(s.event(EventId::new(1)).unwrap().available(), 10);
    }

    #[tokio::test]
    async fn rereading_a_locked_row_sees_pending_write_without_deadlock() {
        let s = store();
        let mut tx = s.begin().await.unwrap();
        tx.read_for_update(EventId::new(1)).await.unwrap();
        tx.write_available(EventId::new(1), 4).await.unwrap();
        let again = tx.read_for_update(EventId::new(1)).await.unwrap().unwrap();
        assert_eq!(again.available(), 4);
    }

    #[tokio::test]
    async fn writes_require_a_locked_row() {
        let mut tx = store().begin().await.unwrap();
        assert!(matches!(
            tx.write_available(EventId::new(2), 1).await,
            Err(StoreError::RowNotLocked(_))
        ));
    }

    #[tokio::test]
    async fn write_above_total_is_a_constraint_error() {
        let mut tx = store().begin().await.unwrap();
        tx.read_for_update(EventId::new(2)).await.unwrap();
        assert!(matches!(
            tx.write_available(EventId::new(2), 5).await,
            Err(StoreError::Constraint(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn row_lock_blocks_second_transaction_until_commit() {
        let s = store();
        let mut first = s.begin().await.unwrap();
        first.read_for_update(EventId::new(1)).await.unwrap();
        first.write_available(EventId::new(1), 2).await.unwrap();

        let s2 = s.clone();
        let second = tokio::spawn(async move {
            let mut tx = s2.begin().await.unwrap();
            let row = tx.read_for_update(EventId::new(1)).await.unwrap().unwrap();
            row.available()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished(), "second reader must wait for the row lock");

        // Readers outside transactions are never blocked.
        assert_eq!(s.list_events().await.unwrap().len(), 2);

        first.commit().await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, 2);
    }
}
