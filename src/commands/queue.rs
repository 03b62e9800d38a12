//! # Priority queue over pending commands.
//!
//! Commands are ordered by accumulated runtime sampled at insertion time,
//! tie-broken by an insertion sequence number (FIFO for equal keys). New
//! commands enter with zero accumulated runtime and are therefore preferred
//! over long-running ones; loop-mode commands re-enter with a freshly
//! sampled key, which is what produces accumulated-runtime fairness.
//!
//! A mutable-key heap is unnecessary: a command's key only changes while it
//! is *out* of the queue (remove-on-dispatch, insert-on-loop), so an ordered
//! map keyed by `(sort_key, seq)` suffices.
//!
//! All operations are serialized under one mutex and none of them block.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::command::{Command, CommandStatus};

struct Inner {
    entries: BTreeMap<(u64, u64), Arc<Command>>,
    next_seq: u64,
}

/// Mutex-guarded ordered structure over pending commands.
pub struct CommandQueue {
    inner: Mutex<Inner>,
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts a command, sampling its sort key from the accumulated runtime
    /// at this instant. Used both for first submission and loop-mode requeue.
    pub fn add(&self, command: Arc<Command>) {
        let key = command.total_exec_time().as_millis() as u64;
        let mut inner = self.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let mut slot = command
            .queue_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *slot = Some((key, seq));
        drop(slot);

        command.set_status(CommandStatus::Queued);
        inner.entries.insert((key, seq), command);
    }

    /// Removes a command by identity. Returns false if it was not queued
    /// (already dispatched or drained).
    pub fn remove(&self, command: &Command) -> bool {
        let mut inner = self.lock();
        let mut slot = command
            .queue_slot
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match slot.take() {
            Some(key) => inner.entries.remove(&key).is_some(),
            None => false,
        }
    }

    /// Returns up to `limit` commands in priority order without removing
    /// them. The scheduler loop matches these against free devices with the
    /// queue lock released.
    pub fn candidates(&self, limit: usize) -> Vec<Arc<Command>> {
        self.lock()
            .entries
            .values()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Empties the queue, returning the drained commands.
    pub fn drain(&self) -> Vec<Arc<Command>> {
        let mut inner = self.lock();
        let entries = std::mem::take(&mut inner.entries);
        let drained: Vec<_> = entries.into_values().collect();
        for command in &drained {
            let mut slot = command
                .queue_slot
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *slot = None;
        }
        drained
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True if no commands are pending.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Configuration;
    use std::time::Duration;

    fn command(id: u64, name: &str) -> Arc<Command> {
        let configuration = Arc::new(Configuration::named(name));
        Arc::new(Command::new(id, vec![name.to_string()], configuration))
    }

    #[test]
    fn fifo_among_equal_keys() {
        let queue = CommandQueue::new();
        let a = command(1, "a");
        let b = command(2, "b");
        queue.add(Arc::clone(&a));
        queue.add(Arc::clone(&b));

        let order = queue.candidates(10);
        assert_eq!(order[0].name(), "a");
        assert_eq!(order[1].name(), "b");
    }

    #[test]
    fn smaller_accumulated_runtime_wins() {
        let queue = CommandQueue::new();
        let veteran = command(1, "veteran");
        veteran.record_elapsed(Duration::from_millis(500));
        let fresh = command(2, "fresh");

        queue.add(Arc::clone(&veteran));
        queue.add(Arc::clone(&fresh));

        let order = queue.candidates(10);
        assert_eq!(order[0].name(), "fresh");
        assert_eq!(order[1].name(), "veteran");
    }

    #[test]
    fn requeue_samples_a_fresh_key() {
        let queue = CommandQueue::new();
        let a = command(1, "a");
        let b = command(2, "b");
        queue.add(Arc::clone(&a));
        queue.add(Arc::clone(&b));

        // Dispatch `a`, run it for a while, requeue it.
        assert!(queue.remove(&a));
        a.record_elapsed(Duration::from_millis(100));
        queue.add(Arc::clone(&a));

        let order = queue.candidates(10);
        assert_eq!(order[0].name(), "b");
        assert_eq!(order[1].name(), "a");
    }

    #[test]
    fn remove_is_by_identity_and_idempotent() {
        let queue = CommandQueue::new();
        let a = command(1, "a");
        queue.add(Arc::clone(&a));

        assert!(queue.remove(&a));
        assert!(!queue.remove(&a));
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_empties_and_clears_slots() {
        let queue = CommandQueue::new();
        let a = command(1, "a");
        let b = command(2, "b");
        queue.add(Arc::clone(&a));
        queue.add(Arc::clone(&b));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
        assert!(!queue.remove(&a));
    }
}
