//! Transactional inventory store boundary.
//!
//! The reservation engine only talks to storage through the traits in
//! [`r#trait`]: open a transaction, read rows for update, write the remaining
//! count, append ledger rows, then commit or roll back. Two backends implement
//! that contract:
//!
//! - [`InMemoryInventoryStore`]: tests/dev, with real per-row locks
//! - [`PostgresInventoryStore`]: production, using `SELECT ... FOR UPDATE`

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryInventoryStore, InMemoryTransaction};
pub use postgres::{PostgresInventoryStore, PostgresTransaction};
pub use r#trait::{InventoryStore, StoreError, StoreTransaction};
