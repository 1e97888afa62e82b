//! Single-producer multi-consumer snapshot exchange.
//!
//! The kernel publishes a freshly filled [`Snapshot`] at the end of
//! every scan; any number of readers grab the latest revision without
//! ever blocking the writer for long. Displaced snapshots whose
//! readers have moved on are recycled through a small pool, so
//! steady-state publishing reuses the card vector instead of growing
//! the heap every scan.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::kernel::snapshot::Snapshot;

struct ExchangeShared {
    current: RwLock<Arc<Snapshot>>,
    pool: Mutex<Vec<Snapshot>>,
}

/// Writer half, owned by the kernel.
pub struct SnapshotExchange {
    shared: Arc<ExchangeShared>,
}

/// Reader half; clone freely across threads.
#[derive(Clone)]
pub struct SnapshotReader {
    shared: Arc<ExchangeShared>,
}

impl SnapshotExchange {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            shared: Arc::new(ExchangeShared {
                current: RwLock::new(Arc::new(initial)),
                pool: Mutex::new(Vec::with_capacity(3)),
            }),
        }
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take a recycled snapshot buffer to fill, if one is free.
    pub fn take_recycled(&self) -> Option<Snapshot> {
        self.shared.pool.lock().pop()
    }

    /// Publish a new snapshot. The displaced one returns to the pool
    /// once no reader still holds it.
    pub fn publish(&self, snapshot: Snapshot) {
        let displaced = {
            let mut current = self.shared.current.write();
            std::mem::replace(&mut *current, Arc::new(snapshot))
        };
        if let Ok(buffer) = Arc::try_unwrap(displaced) {
            let mut pool = self.shared.pool.lock();
            if pool.len() < 3 {
                pool.push(buffer);
            }
        }
    }
}

impl SnapshotReader {
    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        Arc::clone(&self.shared.current.read())
    }

    /// Revision of the latest snapshot, without retaining it.
    pub fn revision(&self) -> u64 {
        self.shared.current.read().revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(revision: u64) -> Snapshot {
        Snapshot {
            revision,
            ..Snapshot::empty()
        }
    }

    #[test]
    fn readers_see_latest_revision() {
        let exchange = SnapshotExchange::new(snap(0));
        let reader = exchange.reader();
        assert_eq!(reader.revision(), 0);

        exchange.publish(snap(1));
        exchange.publish(snap(2));
        assert_eq!(reader.latest().revision, 2);
    }

    #[test]
    fn displaced_snapshot_is_recycled_when_unheld() {
        let exchange = SnapshotExchange::new(snap(0));
        exchange.publish(snap(1)); // displaces rev 0, no readers hold it
        let recycled = exchange.take_recycled().expect("rev 0 recycled");
        assert_eq!(recycled.revision, 0);
    }

    #[test]
    fn held_snapshot_is_not_recycled() {
        let exchange = SnapshotExchange::new(snap(0));
        let reader = exchange.reader();
        let held = reader.latest();
        exchange.publish(snap(1));
        assert!(exchange.take_recycled().is_none());
        drop(held);
    }

    #[test]
    fn revisions_never_observed_out_of_order() {
        let exchange = SnapshotExchange::new(snap(0));
        let reader = exchange.reader();

        let observer = std::thread::spawn(move || {
            let mut last = 0;
            for _ in 0..10_000 {
                let seen = reader.revision();
                assert!(seen >= last, "revision went backwards: {seen} < {last}");
                last = seen;
            }
        });

        for revision in 1..=1000 {
            exchange.publish(snap(revision));
        }
        observer.join().unwrap();
    }
}
