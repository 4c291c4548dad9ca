//! Page-resource pool
//!
//! Caps the number of simultaneously open pages of one browser context. A slot
//! is reserved (and counted) before the page exists, so a burst of tasks can
//! never overshoot the limit while pages are still being created. A slot is
//! always given back, whether the page closed cleanly, failed to close, or was
//! never opened.

use crate::browser::{BrowserContext, BrowserResult, Page};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

type LiveSet = Arc<Mutex<HashSet<Uuid>>>;

/// Bounded set of pages sharing one browser context
pub struct PagePool {
    context: Arc<dyn BrowserContext>,
    semaphore: Arc<Semaphore>,
    live: LiveSet,
}

/// A reserved, not yet opened page slot
pub struct PageSlot {
    id: Uuid,
    context: Arc<dyn BrowserContext>,
    live: LiveSet,
    _permit: OwnedSemaphorePermit,
}

/// An open page holding a pool slot until released
pub struct PageLease {
    page: Box<dyn Page>,
    slot: PageSlot,
}

impl PagePool {
    /// Creates a pool over `context` allowing at most `capacity` open pages
    pub fn new(context: Arc<dyn BrowserContext>, capacity: usize) -> Self {
        Self {
            context,
            semaphore: Arc::new(Semaphore::new(capacity)),
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Waits until a slot is free and reserves it
    ///
    /// # Returns
    ///
    /// * `Some(PageSlot)` - A slot, already counted by [`PagePool::count`]
    /// * `None` - The pool was closed
    pub async fn reserve(&self) -> Option<PageSlot> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        let id = Uuid::new_v4();
        lock(&self.live).insert(id);

        Some(PageSlot {
            id,
            context: Arc::clone(&self.context),
            live: Arc::clone(&self.live),
            _permit: permit,
        })
    }

    /// Number of reserved or open pages
    pub fn count(&self) -> usize {
        lock(&self.live).len()
    }

    /// Stops handing out slots; pending and future reservations return `None`
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn context(&self) -> &Arc<dyn BrowserContext> {
        &self.context
    }
}

impl PageSlot {
    /// Opens the page for this slot
    ///
    /// On failure the slot is given back to the pool.
    pub async fn open(self) -> BrowserResult<PageLease> {
        let page = self.context.new_page().await?;
        Ok(PageLease { page, slot: self })
    }
}

impl Drop for PageSlot {
    fn drop(&mut self) {
        lock(&self.live).remove(&self.id);
    }
}

impl PageLease {
    pub fn page(&self) -> &dyn Page {
        self.page.as_ref()
    }

    /// Closes the page and gives the slot back
    ///
    /// A close failure is logged; the slot is released either way.
    pub async fn release(self) {
        let PageLease { page, slot } = self;
        if let Err(e) = page.close().await {
            tracing::warn!("Failed to close page: {}", e);
        }
        drop(slot);
    }
}

fn lock(live: &LiveSet) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
    live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
