//! Per-key async locks so only one task works on a given video at a time

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

struct Slot {
    lock: Arc<Mutex<()>>,
    holders: usize,
}

type SlotMap<K> = Arc<StdMutex<HashMap<K, Slot>>>;

fn lock_map<K>(map: &StdMutex<HashMap<K, Slot>>) -> MutexGuard<'_, HashMap<K, Slot>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lock map whose entries disappear once nobody holds or awaits them
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    slots: SlotMap<K>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: K) -> KeyedGuard<K> {
        let (lock, ticket) = {
            let mut slots = lock_map(&self.slots);
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                lock: Arc::new(Mutex::new(())),
                holders: 0,
            });
            slot.holders += 1;
            (
                Arc::clone(&slot.lock),
                Ticket {
                    key,
                    slots: Arc::clone(&self.slots),
                },
            )
        };

        // Cancelling here drops the ticket, which releases the slot
        let guard = lock.lock_owned().await;
        KeyedGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Keys currently held or awaited
    pub fn in_flight(&self) -> usize {
        lock_map(&self.slots).len()
    }
}

struct Ticket<K: Eq + Hash + Clone> {
    key: K,
    slots: SlotMap<K>,
}

impl<K: Eq + Hash + Clone> Drop for Ticket<K> {
    fn drop(&mut self) {
        let mut slots = lock_map(&self.slots);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.holders -= 1;
            if slot.holders == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

/// Exclusive access to one key, released on drop
pub struct KeyedGuard<K: Eq + Hash + Clone> {
    // Field order matters: the mutex is released before the slot is returned
    _guard: OwnedMutexGuard<()>,
    _ticket: Ticket<K>,
}
