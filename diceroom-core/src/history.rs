//! Bounded roll history, newest first

use crate::types::RollRecord;
use std::collections::VecDeque;

/// Number of records kept by default
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

pub struct RollHistory {
    records: VecDeque<RollRecord>,
    capacity: usize,
}

impl Default for RollHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RollHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Insert at the front, dropping the oldest record past capacity
    pub fn push(&mut self, record: RollRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    /// Records from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &RollRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&RollRecord> {
        self.records.front()
    }

    pub fn contains(&self, roll_id: &str) -> bool {
        self.records.iter().any(|r| r.id == roll_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
