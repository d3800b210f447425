//! In-memory backend for the per-task append-only log.
//!
//! A task's memory is never persisted or shared, so a bounded `Vec` is all
//! the storage it needs. The capacity bound turns a runaway task into a
//! `MemoryError::Exhausted` instead of unbounded growth.

use chrono::Utc;
use cortex_core::error::MemoryError;
use cortex_core::memory::{MemoryItem, MemoryPayload, MemorySource, MemoryStore};
use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 256;

pub struct InMemoryStore {
    items: Vec<MemoryItem>,
    capacity: usize,
    next_index: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(64)),
            capacity,
            next_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Consume the store, yielding the transcript in insertion order.
    pub fn into_items(self) -> Vec<MemoryItem> {
        self.items
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn append(
        &mut self,
        source: MemorySource,
        content: String,
        payload: Option<MemoryPayload>,
    ) -> Result<u64, MemoryError> {
        if self.items.len() >= self.capacity {
            return Err(MemoryError::Exhausted {
                capacity: self.capacity,
            });
        }
        let index = self.next_index;
        self.next_index += 1;
        debug!(index, %source, "Appending memory item");
        self.items.push(MemoryItem {
            index,
            content,
            payload,
            source,
            created_at: Utc::now(),
        });
        Ok(index)
    }

    fn items(&self) -> &[MemoryItem] {
        &self.items
    }
}
