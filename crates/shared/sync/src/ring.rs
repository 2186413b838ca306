use std::collections::VecDeque;

/// Fixed-capacity FIFO buffer; pushing into a full buffer evicts the oldest entry
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
    /// Entries dropped to make room, over the buffer's lifetime
    evicted: u64,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append an entry, evicting the oldest one when full
    #[inline]
    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Oldest-first iterator
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the most recent `n` entries, oldest first
    pub fn last(&self, n: usize) -> Vec<T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_exceeds_capacity() {
        let mut ring = RingBuffer::new(200);
        for i in 0..1000 {
            ring.push(i);
            assert!(ring.len() <= 200);
        }
        assert_eq!(ring.len(), 200);
        assert_eq!(ring.evicted(), 800);
    }

    #[test]
    fn test_oldest_evicted_first() {
        let mut ring = RingBuffer::new(3);
        for i in 1..=5 {
            ring.push(i);
        }
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn test_last_n() {
        let mut ring = RingBuffer::new(10);
        for i in 0..6 {
            ring.push(i);
        }
        assert_eq!(ring.last(2), vec![4, 5]);
        assert_eq!(ring.last(100), vec![0, 1, 2, 3, 4, 5]);
        assert!(ring.last(0).is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut ring = RingBuffer::new(0);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.last(5), vec!["b"]);
    }
}
