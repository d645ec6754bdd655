//! Ticket inventory domain module.
//!
//! This crate contains the business rules for ticketed events and purchase
//! batches, implemented purely as deterministic domain logic (no IO, no HTTP,
//! no storage). The reservation engine in `ticketqueen-infra` drives these
//! types inside a store transaction.

pub mod cart;
pub mod event;
pub mod purchase;

pub use cart::{CartItem, LineItem, PurchaseBatch};
pub use event::{Event, InsufficientInventory};
pub use purchase::{PurchaseRecord, Reservation};
