use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

/// A bounded MPSC queue that never blocks the producer: when full, the
/// oldest entry is dropped to make room for the new one. Used for every
/// queue in the pipeline except the History Recorder's write-intent queue,
/// which drops the *newest* record instead (see `history::storage`).
pub struct DropOldestQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    dropped: AtomicU64,
}

impl<T> DropOldestQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues `item`, dropping the oldest queued item if the queue is full.
    pub fn push(&self, item: T) {
        let mut item = item;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    // Make room by discarding the oldest entry, then retry.
                    let _ = self.rx.try_recv();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    item = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Blocks the calling thread/task-equivalent until an item is available
    /// or every sender has been dropped.
    pub fn pop_blocking(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }
}
