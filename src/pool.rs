//! A small object pool for buffers that cycle through the pipeline.
//!
//! Acquired items are plain owned values; returning one through
//! [`Pool::release`] recycles it for the next acquire. A bounded pool caps the
//! number of items alive at once, which is what limits how far the audio
//! submission side can run ahead of its worker.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Implemented by pooled items so the pool can reset them on release.
pub trait Recycle {
    /// Clears the item back to a reusable state.
    fn recycle(&mut self);
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A pool of recyclable items with an optional cap on live items.
pub struct Pool<T: Recycle> {
    free: Mutex<Vec<T>>,
    live: AtomicUsize,
    max: Option<usize>,
    factory: Factory<T>,
}

impl<T: Recycle> Pool<T> {
    /// Creates a pool that never hands out more than `max` items at once.
    pub fn bounded(max: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            max: Some(max),
            factory: Box::new(factory),
        }
    }

    /// Creates a pool with no cap on live items.
    pub fn unbounded(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            live: AtomicUsize::new(0),
            max: None,
            factory: Box::new(factory),
        }
    }

    /// Takes an item from the pool, creating one if none are free.
    ///
    /// Returns `None` only when the pool is bounded and every item is
    /// currently live.
    pub fn acquire(&self) -> Option<T> {
        // Reserve a live slot before touching the free list, so the cap
        // holds even when acquirers race.
        self.live
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |live| {
                match self.max {
                    Some(max) if live >= max => None,
                    _ => Some(live + 1),
                }
            })
            .ok()?;
        if let Some(item) = self.free.lock().pop() {
            return Some(item);
        }
        Some((self.factory)())
    }

    /// Returns an item to the pool after recycling it.
    ///
    /// Also accepts items constructed outside the pool; the live count never
    /// goes below zero.
    pub fn release(&self, mut item: T) {
        item.recycle();
        let _ = self
            .live
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |live| {
                live.checked_sub(1)
            });
        self.free.lock().push(item);
    }

    /// Drops all free items. Live items are unaffected.
    pub fn clear(&self) {
        self.free.lock().clear();
    }

    /// Number of items currently acquired.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Number of items sitting free in the pool.
    pub fn pooled(&self) -> usize {
        self.free.lock().len()
    }
}

impl<T: Recycle> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("live", &self.live())
            .field("pooled", &self.pooled())
            .field("max", &self.max)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Item {
        value: u32,
    }

    impl Recycle for Item {
        fn recycle(&mut self) {
            self.value = 0;
        }
    }

    #[test]
    fn test_bounded_pool_exhausts() {
        let pool = Pool::bounded(2, Item::default);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.live(), 2);

        pool.release(a);
        assert_eq!(pool.live(), 1);
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_bounded_cap_holds_under_contention() {
        use std::sync::Arc;

        let pool = Arc::new(Pool::bounded(4, Item::default));
        let outstanding = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let outstanding = Arc::clone(&outstanding);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if let Some(item) = pool.acquire() {
                            let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            outstanding.fetch_sub(1, Ordering::SeqCst);
                            pool.release(item);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(pool.live(), 0);
    }

    #[test]
    fn test_release_recycles() {
        let pool = Pool::bounded(1, Item::default);
        let mut item = pool.acquire().unwrap();
        item.value = 42;
        pool.release(item);
        let item = pool.acquire().unwrap();
        assert_eq!(item.value, 0);
    }

    #[test]
    fn test_reuses_freed_items() {
        let pool = Pool::unbounded(Item::default);
        let item = pool.acquire().unwrap();
        pool.release(item);
        assert_eq!(pool.pooled(), 1);
        let _item = pool.acquire().unwrap();
        assert_eq!(pool.pooled(), 0);
    }

    #[test]
    fn test_clear_drops_free_items() {
        let pool = Pool::unbounded(Item::default);
        let item = pool.acquire().unwrap();
        pool.release(item);
        pool.clear();
        assert_eq!(pool.pooled(), 0);
    }
}
