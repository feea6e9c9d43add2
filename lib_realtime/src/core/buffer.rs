use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::core::notification::Notification;

/// Bounded, newest-first notification store.
///
/// `push` prepends and drops the oldest entries beyond `capacity`. There is
/// no removal by id and no deduplication: the same event delivered twice is
/// stored twice.
pub struct NotificationBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<Notification>>,
}

impl NotificationBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, notification: Notification) {
        let mut entries = self.lock();
        entries.push_front(notification);
        entries.truncate(self.capacity);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Newest-first copy of the current contents.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        // Entries are plain data; a panic elsewhere cannot leave them half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
