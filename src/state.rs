use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::listings::ListingEntry;

#[derive(Debug, Error)]
#[error("Scraping already in progress")]
pub struct Busy;

/// The most recent successful scrape.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub listings: Vec<ListingEntry>,
    pub networks: Vec<String>,
    pub dates: Vec<String>,
    pub last_scraped: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub is_scraping: bool,
    pub last_scraped: Option<DateTime<Utc>>,
    pub total_listings: usize,
    pub total_networks: usize,
}

/// Admits one scrape at a time and keeps the last result.
///
/// Meant for a long-running caller (a server or GUI) that can receive a new
/// scrape request while one is in flight; such a caller shares clones of one
/// `ScrapeState` and answers [`Busy`] to the overlapping request. A one-shot
/// CLI run never contends for the slot and only reads the final status.
#[derive(Clone)]
pub struct ScrapeState {
    slot: Arc<Semaphore>,
    snapshot: Arc<Mutex<Snapshot>>,
}

/// Held while a scrape runs; dropping it admits the next one.
pub struct ScrapeTicket {
    _permit: OwnedSemaphorePermit,
    snapshot: Arc<Mutex<Snapshot>>,
}

impl ScrapeState {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
            snapshot: Arc::new(Mutex::new(Snapshot::default())),
        }
    }

    pub fn try_begin(&self) -> Result<ScrapeTicket, Busy> {
        let permit = Arc::clone(&self.slot)
            .try_acquire_owned()
            .map_err(|_| Busy)?;
        Ok(ScrapeTicket {
            _permit: permit,
            snapshot: Arc::clone(&self.snapshot),
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        lock(&self.snapshot).clone()
    }

    pub fn status(&self) -> Status {
        let snapshot = lock(&self.snapshot);
        Status {
            is_scraping: self.slot.available_permits() == 0,
            last_scraped: snapshot.last_scraped,
            total_listings: snapshot.listings.len(),
            total_networks: snapshot.networks.len(),
        }
    }
}

impl Default for ScrapeState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeTicket {
    /// Replaces the stored result and stamps the time.
    pub fn record(&self, listings: Vec<ListingEntry>, networks: Vec<String>, dates: Vec<String>) {
        *lock(&self.snapshot) = Snapshot {
            listings,
            networks,
            dates,
            last_scraped: Some(Utc::now()),
        };
    }
}

fn lock(snapshot: &Mutex<Snapshot>) -> MutexGuard<'_, Snapshot> {
    snapshot.lock().unwrap_or_else(PoisonError::into_inner)
}
