use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use ticketqueen_core::{DomainError, EventId, Money};
use ticketqueen_infra::{
    InMemoryInventoryStore, PostgresInventoryStore, ReservationEngine, ReserveError, StoreError,
};
use ticketqueen_inventory::{CartItem, Event, Reservation};

use crate::config::{AppConfig, StoreConfig};

type InMemoryEngine = ReservationEngine<InMemoryInventoryStore>;
type PersistentEngine = ReservationEngine<PostgresInventoryStore>;

/// Failures while wiring the services at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("inventory store: {0}")]
    Store(#[from] StoreError),

    #[error("demo catalogue: {0}")]
    Seed(#[from] DomainError),
}

/// Engine handle shared by every request handler.
///
/// Cloning is cheap; every clone drives the same engine (and so the same
/// admission lock).
#[derive(Debug, Clone)]
pub enum AppServices {
    InMemory(Arc<InMemoryEngine>),
    Persistent(Arc<PersistentEngine>),
}

impl AppServices {
    /// In-memory services over the given catalogue (dev/test).
    pub fn in_memory(events: impl IntoIterator<Item = Event>) -> Result<Self, StoreError> {
        let store = InMemoryInventoryStore::with_events(events)?;
        Ok(AppServices::InMemory(Arc::new(ReservationEngine::new(store))))
    }

    pub async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        match self {
            AppServices::InMemory(engine) => engine.list_events().await,
            AppServices::Persistent(engine) => engine.list_events().await,
        }
    }

    pub async fn reserve(&self, items: Vec<CartItem>) -> Result<Reservation, ReserveError> {
        match self {
            AppServices::InMemory(engine) => engine.reserve(items).await,
            AppServices::Persistent(engine) => engine.reserve(items).await,
        }
    }
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    match &config.store {
        StoreConfig::InMemory => build_in_memory_services(config),
        StoreConfig::Postgres { url, max_connections } => {
            build_persistent_services(config, url, *max_connections).await
        }
    }
}

fn build_in_memory_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    let events = if config.seed_demo_events {
        demo_events()?
    } else {
        Vec::new()
    };
    tracing::info!(events = events.len(), "using in-memory inventory store");
    Ok(AppServices::in_memory(events)?)
}

async fn build_persistent_services(
    config: &AppConfig,
    url: &str,
    max_connections: u32,
) -> Result<AppServices, StartupError> {
    let store = PostgresInventoryStore::connect(url, max_connections).await?;

    // Fail fast: a gateway without a reachable database is useless.
    store.ping().await.inspect_err(|e| {
        tracing::error!(error = %e, "database connection check failed");
    })?;
    tracing::info!(max_connections, "connected to Postgres");

    store.ensure_schema().await?;

    if config.seed_demo_events {
        let inserted = store.seed_events(&demo_events()?).await?;
        tracing::info!(inserted, "seeded demo events");
    }

    Ok(AppServices::Persistent(Arc::new(ReservationEngine::new(store))))
}

/// Small catalogue used when no database is configured.
pub fn demo_events() -> Result<Vec<Event>, DomainError> {
    let catalogue = [
        (1, "Rust Conf Live", (2026, 11, 14, 18, 0), "Harbour Arena", 4_550, 200),
        (2, "Symphony Under the Stars", (2026, 12, 3, 20, 0), "City Park Amphitheatre", 3_000, 500),
        (3, "Midnight Jazz Session", (2026, 12, 19, 23, 0), "Blue Cellar", 2_500, 80),
        (4, "New Year Countdown", (2026, 12, 31, 21, 30), "Central Square", 7_500, 1_000),
        (5, "Indie Showcase", (2027, 1, 22, 19, 0), "Warehouse 9", 1_800, 150),
    ];

    catalogue
        .into_iter()
        .map(|(id, name, (y, mo, d, h, mi), venue, price, total)| {
            Event::new(EventId::new(id), name, at(y, mo, d, h, mi)?, venue, Money::from_minor(price), total)
        })
        .collect()
}

fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Result<DateTime<Utc>, DomainError> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .ok_or_else(|| DomainError::validation(format!("invalid date {year}-{month}-{day} {hour}:{minute}")))
}
