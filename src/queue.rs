//! A condition-variable guarded FIFO shared between the client-facing
//! threads and the bus handler.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

#[derive(Debug, Default)]
pub struct WaitQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T: Clone> WaitQueue<T> {
    pub fn new() -> Self {
        WaitQueue {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Appends an item and wakes one waiting consumer.
    pub fn add(&self, item: T) {
        let mut items = self.items.lock().unwrap();
        items.push_back(item);
        self.available.notify_one();
    }

    /// Returns a copy of the first item without removing it,
    /// or `None` if the queue is empty.
    pub fn next(&self) -> Option<T> {
        self.items.lock().unwrap().front().cloned()
    }

    /// Removes and returns the first item. With `wait` the call blocks
    /// until an item is available.
    pub fn remove_first(&self, wait: bool) -> Option<T> {
        let mut items = self.items.lock().unwrap();
        if wait {
            while items.is_empty() {
                items = self.available.wait(items).unwrap();
            }
        }
        items.pop_front()
    }

    /// Removes every item matching the predicate; returns whether
    /// anything was removed.
    pub fn remove_matching(&self, mut matches: impl FnMut(&T) -> bool) -> bool {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|item| !matches(item));
        items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}
