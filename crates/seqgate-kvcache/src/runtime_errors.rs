//! Bounded ring of recent runtime errors

use crate::tables::KvTable;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One recorded failure
#[derive(Clone, Debug)]
pub struct RuntimeError {
    pub when: DateTime<Utc>,
    pub table: KvTable,
    pub message: String,
}

/// Most recent N runtime errors; older ones are discarded
pub struct RuntimeErrors {
    capacity: usize,
    ring: Mutex<VecDeque<RuntimeError>>,
}

impl RuntimeErrors {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ring: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn record(&self, table: KvTable, message: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        let mut ring = self.ring.lock();
        while ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(RuntimeError {
            when: Utc::now(),
            table,
            message: message.into(),
        });
    }

    /// Recorded errors, oldest first
    pub fn snapshot(&self) -> Vec<RuntimeError> {
        self.ring.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().is_empty()
    }
}
