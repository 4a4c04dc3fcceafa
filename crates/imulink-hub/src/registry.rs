//! [`SubscriberRegistry`] – the set of live viewer channels.
//!
//! Every subscriber connection owns one unbounded channel registered here.
//! [`SubscriberRegistry::broadcast`] snapshots the member list before
//! sending, so attaching or detaching during a broadcast never blocks the
//! producer path; members whose receiving half is gone are evicted on the
//! spot.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Registry of connected subscriber channels, keyed by a monotonic id.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    members: Mutex<HashMap<u64, UnboundedSender<String>>>,
}

impl SubscriberRegistry {
    /// Register a subscriber channel and return its id.
    pub fn attach(&self, tx: UnboundedSender<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut members) = self.members.lock() {
            members.insert(id, tx);
        }
        id
    }

    /// Remove a subscriber by id.  Unknown ids are a no-op.
    pub fn detach(&self, id: u64) {
        if let Ok(mut members) = self.members.lock() {
            members.remove(&id);
        }
    }

    /// Number of currently registered subscribers.
    pub fn member_count(&self) -> usize {
        self.members.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Send `payload` to every member and return how many received it.
    ///
    /// A subscriber attaching mid-broadcast catches the next payload
    /// instead of this one.  Members whose channel is closed are dropped
    /// from the registry.
    pub fn broadcast(&self, payload: &str) -> usize {
        let snapshot: Vec<(u64, UnboundedSender<String>)> = match self.members.lock() {
            Ok(members) => members.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
            Err(_) => return 0,
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(payload.to_string()).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty()
            && let Ok(mut members) = self.members.lock()
        {
            for id in &dead {
                members.remove(id);
            }
            debug!(evicted = dead.len(), "evicted closed subscriber channels");
        }

        delivered
    }
}
