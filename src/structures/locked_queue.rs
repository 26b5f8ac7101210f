use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::removable_queue::ValidationError;
use super::QueueWithRemove;

/// A `VecDeque` behind a mutex. Same semantics as
/// [`RemovableQueue`](super::removable_queue::RemovableQueue), but every
/// operation takes the lock.
#[derive(Debug)]
pub struct LockedQueue<T> {
    inner: Mutex<VecDeque<T>>,
}

impl<T> LockedQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the deque half-updated.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> QueueWithRemove<T> for LockedQueue<T> {
    fn enqueue(&self, element: T) {
        self.lock().push_back(element);
    }

    fn dequeue(&self) -> Option<T> {
        self.lock().pop_front()
    }

    fn remove(&self, element: &T) -> bool {
        let mut inner = self.lock();
        match inner.iter().position(|e| e == element) {
            Some(index) => inner.remove(index).is_some(),
            None => false,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let queue = LockedQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(1);
        assert_eq!(queue.len(), 3);
        assert!(queue.remove(&1));
        assert!(!queue.remove(&3));
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(1));
        assert_eq!(queue.dequeue(), None);
        assert!(queue.is_empty());
        queue.validate().unwrap();
    }
}
