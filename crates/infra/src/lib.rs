//! Infrastructure layer: inventory stores and the reservation engine.

pub mod reservation_engine;
pub mod store;


pub use reservation_engine::{ReservationEngine, ReserveError};
pub use store::{
    InMemoryInventoryStore, InMemoryTransaction, InventoryStore, PostgresInventoryStore, PostgresTransaction,
    StoreError, StoreTransaction,
};
