use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ticketqueen_inventory::{CartItem, Event, PurchaseRecord, Reservation};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub items: Vec<CartItem>,
}

// -------------------------
// Response DTOs
// -------------------------

/// Prices are rendered twice: exact minor units for clients doing arithmetic,
/// and a formatted decimal string for display.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: i64,
    pub name: String,
    pub date: DateTime<Utc>,
    pub venue: String,
    pub price: String,
    pub price_cents: u64,
    pub available: u32,
    pub total: u32,
}

impl From<&Event> for EventResponse {
    fn from(e: &Event) -> Self {
        Self {
            id: e.id().get(),
            name: e.name().to_string(),
            date: e.date(),
            venue: e.venue().to_string(),
            price: e.price().to_string(),
            price_cents: e.price().minor(),
            available: e.available(),
            total: e.total(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PurchaseLineResponse {
    pub id: String,
    pub event_id: i64,
    pub quantity: u32,
    pub purchase_date: DateTime<Utc>,
    pub total_price: String,
    pub total_price_cents: u64,
}

impl From<&PurchaseRecord> for PurchaseLineResponse {
    fn from(p: &PurchaseRecord) -> Self {
        Self {
            id: p.id.to_string(),
            event_id: p.event_id.get(),
            quantity: p.quantity,
            purchase_date: p.purchased_at,
            total_price: p.total_price.to_string(),
            total_price_cents: p.total_price.minor(),
        }
    }
}

pub const PURCHASE_SUCCESS_MESSAGE: &str = "Purchase completed successfully";

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub reservation_id: String,
    pub total_price: String,
    pub total_price_cents: u64,
    pub purchases: Vec<PurchaseLineResponse>,
}

impl From<&Reservation> for PurchaseResponse {
    fn from(r: &Reservation) -> Self {
        Self {
            status: "success",
            message: PURCHASE_SUCCESS_MESSAGE,
            reservation_id: r.id.to_string(),
            total_price: r.total_price.to_string(),
            total_price_cents: r.total_price.minor(),
            purchases: r.purchases.iter().map(PurchaseLineResponse::from).collect(),
        }
    }
}
