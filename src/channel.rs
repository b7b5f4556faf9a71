//! Bounded FIFO channels between the adapter and its neighbours.
//!
//! The real transport lives in the simulation kernel; this is the
//! single-threaded equivalent the adapter reads from and writes to once per
//! clock edge. Writers get their item back on backpressure instead of
//! blocking, and readers check `num_available()` before popping.

use std::collections::VecDeque;

/// Default depth of every adapter channel.
pub const DEFAULT_DEPTH: usize = 64;

/// FIFO buffer with a fixed capacity.
#[derive(Debug, Clone)]
pub struct BoundedFifo<T> {
    name: String,
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedFifo<T> {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Channel name, used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item. Hands it back if the channel is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.data.len() < self.capacity {
            self.data.push_back(item);
            Ok(())
        } else {
            Err(item) // Backpressure
        }
    }

    pub fn pop(&mut self) -> Option<T> {
        self.data.pop_front()
    }

    pub fn peek(&self) -> Option<&T> {
        self.data.front()
    }

    /// Number of items ready to be read.
    pub fn num_available(&self) -> usize {
        self.data.len()
    }

    /// Number of free slots.
    pub fn free(&self) -> usize {
        self.capacity - self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Remove and return everything currently queued.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.data.drain(..)
    }
}
