use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use ticketqueen_core::{DomainError, DomainResult, EventId, Money};

/// A scheduled event with a finite ticket allocation.
///
/// `available` is the only mutable field; it always satisfies
/// `0 <= available <= total`. Every constructor and mutator re-checks that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    id: EventId,
    name: String,
    date: DateTime<Utc>,
    venue: String,
    price: Money,
    available: u32,
    total: u32,
}

/// Rejection raised when a line item asks for more tickets than remain.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("event {event_id}: requested {requested} tickets, only {available} available")]
pub struct InsufficientInventory {
    pub event_id: EventId,
    pub available: u32,
    pub requested: u32,
}

impl Event {
    /// Create a fresh event with its whole allocation available.
    pub fn new(
        id: EventId,
        name: impl Into<String>,
        date: DateTime<Utc>,
        venue: impl Into<String>,
        price: Money,
        total: u32,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("event name cannot be empty"));
        }

        Ok(Self {
            id,
            name,
            date,
            venue: venue.into(),
            price,
            available: total,
            total,
        })
    }

    /// Set the remaining count, e.g. when loading a row back from storage.
    pub fn with_available(mut self, available: u32) -> DomainResult<Self> {
        if available > self.total {
            return Err(DomainError::invariant(format!(
                "event {}: available ({available}) exceeds total ({})",
                self.id, self.total
            )));
        }
        self.available = available;
        Ok(self)
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Tickets already taken out of the allocation.
    pub fn sold(&self) -> u32 {
        self.total - self.available
    }

    pub fn is_sold_out(&self) -> bool {
        self.available == 0
    }

    /// Decrement `available` by `quantity`, or reject without mutating.
    pub fn take(&mut self, quantity: u32) -> Result<(), InsufficientInventory> {
        if quantity > self.available {
            return Err(InsufficientInventory {
                event_id: self.id,
                available: self.available,
                requested: quantity,
            });
        }
        self.available -= quantity;
        Ok(())
    }
}
