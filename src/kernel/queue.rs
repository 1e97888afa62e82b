//! Bounded lock-free SPSC ring.
//!
//! The command channel between the control surface (producer) and the
//! kernel thread (consumer), and the event channel going the other
//! way. One writer, one reader, atomic head/tail indices — the only
//! synchronization on the hot path.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Control      │────▶│  Ring<T>     │────▶│  ScanKernel  │
//! │ surface      │     │ (bounded)    │     │  (consumer)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Capacity is fixed at construction (commit time); overflow is
//! reported to the producer, which maps it to `BUSY`.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared<T> {
    /// Next slot the producer will write. Only the producer stores it.
    head: AtomicUsize,
    /// Next slot the consumer will read. Only the consumer stores it.
    tail: AtomicUsize,
    slots: Box<[UnsafeCell<Option<T>>]>,
}

// SAFETY: slots are accessed exclusively under the SPSC discipline —
// the producer writes only the slot at `head` before publishing it
// with a Release store, the consumer reads only the slot at `tail`
// after an Acquire load of `head`. No slot is ever accessed by both
// sides at once.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

/// Producing half. Deliberately not `Clone`: single producer.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

/// Consuming half.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

/// Create a bounded ring with room for `capacity` queued items.
pub fn bounded<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    // One slot is sacrificed to distinguish full from empty.
    let len = capacity.max(1) + 1;
    let slots = (0..len).map(|_| UnsafeCell::new(None)).collect();
    let shared = Arc::new(Shared {
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        slots,
    });
    (
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    )
}

impl<T> Producer<T> {
    /// Push a value. Returns it back when the ring is full.
    pub fn push(&self, value: T) -> Result<(), T> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Acquire);
        let next_head = (head + 1) % shared.slots.len();

        if next_head == tail {
            return Err(value); // Full — caller reports BUSY.
        }

        // SAFETY: the slot at `head` is owned by the producer until the
        // Release store below publishes it.
        unsafe {
            *shared.slots[head].get() = Some(value);
        }
        shared.head.store(next_head, Ordering::Release);
        Ok(())
    }

    /// Number of items currently queued (racy, advisory).
    pub fn len(&self) -> usize {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Relaxed);
        (head + shared.slots.len() - tail) % shared.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Consumer<T> {
    /// Pop the next value, if any.
    pub fn pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);
        let head = shared.head.load(Ordering::Acquire);

        if tail == head {
            return None; // Empty.
        }

        // SAFETY: the slot at `tail` was published by the producer's
        // Release store and is owned by the consumer until the store
        // below retires it.
        let value = unsafe { (*shared.slots[tail].get()).take() };
        shared
            .tail
            .store((tail + 1) % shared.slots.len(), Ordering::Release);
        value
    }

    pub fn len(&self) -> usize {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let tail = shared.tail.load(Ordering::Relaxed);
        (head + shared.slots.len() - tail) % shared.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_fifo_order() {
        let (tx, mut rx) = bounded(4);
        tx.push(1).unwrap();
        tx.push(2).unwrap();
        tx.push(3).unwrap();
        assert_eq!(rx.pop(), Some(1));
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn full_ring_rejects_and_returns_value() {
        let (tx, mut rx) = bounded(2);
        tx.push("a").unwrap();
        tx.push("b").unwrap();
        assert_eq!(tx.push("c"), Err("c"));

        assert_eq!(rx.pop(), Some("a"));
        tx.push("c").unwrap();
        assert_eq!(rx.pop(), Some("b"));
        assert_eq!(rx.pop(), Some("c"));
    }

    #[test]
    fn len_tracks_occupancy() {
        let (tx, mut rx) = bounded(8);
        assert!(tx.is_empty());
        tx.push(0u8).unwrap();
        tx.push(0u8).unwrap();
        assert_eq!(tx.len(), 2);
        assert_eq!(rx.len(), 2);
        rx.pop();
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn wraps_around_many_times() {
        let (tx, mut rx) = bounded(3);
        for i in 0..100u32 {
            tx.push(i).unwrap();
            assert_eq!(rx.pop(), Some(i));
        }
    }

    #[test]
    fn cross_thread_transfer() {
        let (tx, mut rx) = bounded(64);
        let producer = std::thread::spawn(move || {
            for i in 0..1000u32 {
                let mut v = i;
                loop {
                    match tx.push(v) {
                        Ok(()) => break,
                        Err(back) => {
                            v = back;
                            std::thread::yield_now();
                        }
                    }
                }
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            if let Some(v) = rx.pop() {
                seen.push(v);
            } else {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();
        assert_eq!(seen, (0..1000u32).collect::<Vec<_>>());
    }
}
