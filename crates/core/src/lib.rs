//! `ticketqueen-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, and the domain error model shared by every other crate.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{EventId, PurchaseId, ReservationId};
pub use money::Money;
