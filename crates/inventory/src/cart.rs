use serde::{Deserialize, Serialize};

use ticketqueen_core::{DomainError, DomainResult, EventId};

/// One requested line of a purchase, as submitted by a client.
///
/// `quantity` is signed on purpose: zero and negative values must surface as
/// malformed requests rather than as deserialization failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub event_id: EventId,
    pub quantity: i64,
}

impl CartItem {
    pub fn new(event_id: EventId, quantity: i64) -> Self {
        Self { event_id, quantity }
    }
}

/// A validated line item (quantity known to be positive).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub event_id: EventId,
    pub quantity: u32,
}

/// Ordered, validated sequence of line items processed as one unit.
///
/// The same event may appear on several lines; each line is a separate
/// decrement against that event's allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseBatch {
    lines: Vec<LineItem>,
}

impl PurchaseBatch {
    /// Validate raw cart items: the batch must be non-empty and every quantity
    /// must be a positive integer that fits the ticket counter.
    pub fn new(items: impl IntoIterator<Item = CartItem>) -> DomainResult<Self> {
        let mut lines = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
            if item.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "item {idx} (event {}): quantity must be positive, got {}",
                    item.event_id, item.quantity
                )));
            }
            let quantity = u32::try_from(item.quantity).map_err(|_| {
                DomainError::validation(format!(
                    "item {idx} (event {}): quantity {} is too large",
                    item.event_id, item.quantity
                ))
            })?;
            lines.push(LineItem {
                event_id: item.event_id,
                quantity,
            });
        }

        if lines.is_empty() {
            return Err(DomainError::validation("purchase batch cannot be empty"));
        }

        Ok(Self { lines })
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Always false for a constructed batch; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn ticket_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}

impl TryFrom<Vec<CartItem>> for PurchaseBatch {
    type Error = DomainError;

    fn try_from(items: Vec<CartItem>) -> Result<Self, Self::Error> {
        Self::new(items)
    }
}
