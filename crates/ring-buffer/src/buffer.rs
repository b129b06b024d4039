//! Ring Buffer Implementation

use std::collections::VecDeque;

/// Bounded FIFO window, oldest samples evicted first
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Stored samples, oldest at the front
    storage: VecDeque<T>,
    /// Maximum number of samples held
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, returning the evicted oldest one if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.storage.len() >= self.capacity {
            self.storage.pop_front()
        } else {
            None
        };
        self.storage.push_back(item);
        evicted
    }

    /// Get the number of samples currently in the buffer
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest sample
    pub fn front(&self) -> Option<&T> {
        self.storage.front()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.storage.iter()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_iterate() {
        let mut buffer = RingBuffer::new(10);

        for i in 0..5u32 {
            buffer.push(i * 100);
        }

        assert_eq!(buffer.len(), 5);

        let samples: Vec<u32> = buffer.iter().rev().take(3).copied().collect();
        assert_eq!(samples, vec![400, 300, 200]); // Most recent first
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::new(5);

        let mut evicted = Vec::new();
        for i in 0..8u32 {
            if let Some(old) = buffer.push(i) {
                evicted.push(old);
            }
        }

        assert_eq!(buffer.len(), 5);
        assert_eq!(evicted, vec![0, 1, 2]);
        assert_eq!(buffer.front(), Some(&3));
        assert_eq!(buffer.iter().last(), Some(&7));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(1.0);
        buffer.push(2.0);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.front(), Some(&2.0));
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut buffer = RingBuffer::new(3);
        for i in 1..=3 {
            buffer.push(i);
        }
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.push(4), None);
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(capacity in 1usize..64, pushes in 0usize..512) {
            let mut buffer = RingBuffer::new(capacity);
            for i in 0..pushes {
                buffer.push(i);
                prop_assert!(buffer.len() <= capacity);
            }
            prop_assert_eq!(buffer.len(), pushes.min(capacity));
        }
    }
}
