//! System-level counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default)]
pub struct SystemMetrics {
    messages_processed: AtomicU64,
    dead_letters: AtomicU64,
}

impl SystemMetrics {
    pub fn record_message(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, active_actors: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            active_actors,
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the system counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub active_actors: usize,
    pub messages_processed: u64,
    pub dead_letters: u64,
}
