//! Job slots: a global ceiling on concurrently running external processes.
//!
//! Implemented as a token bucket over a bounded crossbeam channel. A slot is
//! acquired before spawning an external process and returned when the guard
//! drops. The ceiling gates the action runner only, never target resolution
//! or dependency waiting, so holding a slot can never deadlock the graph.

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::error::{ForgeError, ForgeResult};

/// Token bucket bounding external process concurrency.
pub struct JobSlots {
    tx: Sender<()>,
    rx: Receiver<()>,
    capacity: usize,
}

impl JobSlots {
    /// Creates a bucket with `capacity` slots (minimum one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded::<()>(capacity);
        for _ in 0..capacity {
            // Filling a freshly created bounded channel cannot fail.
            let _ = tx.send(());
        }
        Self { tx, rx, capacity }
    }

    /// The configured ceiling.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Blocks until a slot is free, returning a guard that releases it on
    /// drop.
    ///
    /// # Errors
    /// Returns an internal error if the bucket was torn down, which cannot
    /// happen while the owning engine is alive.
    pub fn acquire(&self) -> ForgeResult<SlotGuard<'_>> {
        self.rx
            .recv()
            .map_err(|_| ForgeError::internal("job slot channel disconnected"))?;
        Ok(SlotGuard { tx: &self.tx })
    }
}

/// Holds one job slot; the slot is returned when this guard drops.
pub struct SlotGuard<'a> {
    tx: &'a Sender<()>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_capacity_floor_is_one() {
        assert_eq!(JobSlots::new(0).capacity(), 1);
        assert_eq!(JobSlots::new(4).capacity(), 4);
    }

    #[test]
    fn test_guard_returns_slot() {
        let slots = JobSlots::new(1);
        drop(slots.acquire().unwrap());
        // Slot is free again; acquiring must not block.
        let _guard = slots.acquire().unwrap();
    }

    #[test]
    fn test_ceiling_bounds_concurrent_holders() {
        let slots = Arc::new(JobSlots::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        thread::scope(|s| {
            for _ in 0..8 {
                let slots = Arc::clone(&slots);
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                s.spawn(move || {
                    let _guard = slots.acquire().unwrap();
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
