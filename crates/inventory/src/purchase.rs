use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ticketqueen_core::{DomainResult, EventId, Money, PurchaseId, ReservationId};

use crate::event::Event;

/// Append-only ledger entry written for every accepted line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: PurchaseId,
    pub reservation_id: ReservationId,
    pub event_id: EventId,
    pub quantity: u32,
    pub purchased_at: DateTime<Utc>,
    /// `quantity × unit price` of the event at the time of purchase.
    pub total_price: Money,
}

impl PurchaseRecord {
    /// Price a line item against the event's current unit price.
    pub fn for_line(
        reservation_id: ReservationId,
        event: &Event,
        quantity: u32,
        purchased_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id: PurchaseId::new(),
            reservation_id,
            event_id: event.id(),
            quantity,
            purchased_at,
            total_price: event.price().times(quantity)?,
        })
    }
}

/// Receipt for a committed purchase batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    /// Ledger rows in line-item order.
    pub purchases: Vec<PurchaseRecord>,
    pub total_price: Money,
}

impl Reservation {
    pub fn new(id: ReservationId, purchases: Vec<PurchaseRecord>) -> DomainResult<Self> {
        let total_price = purchases
            .iter()
            .try_fold(Money::ZERO, |acc, p| acc.plus(p.total_price))?;
        Ok(Self {
            id,
            purchases,
            total_price,
        })
    }

    pub fn ticket_count(&self) -> u64 {
        self.purchases.iter().map(|p| u64::from(p.quantity)).sum()
    }
}
