pub mod locked_queue;
pub mod removable_queue;

use std::fmt::Debug;

use removable_queue::{RemovableQueue, ValidationError};

/// A FIFO queue that can also drop an arbitrary element that is still
/// waiting in it.
///
/// Implementations take `&self` everywhere so they can be shared between
/// threads behind an `Arc`.
pub trait QueueWithRemove<T> {
    /// Appends an element at the tail.
    fn enqueue(&self, element: T);

    /// Takes the earliest live element, or `None` if the queue is empty.
    fn dequeue(&self) -> Option<T>;

    /// Removes the first live element equal to `element`. Returns `true`
    /// only if this call performed the removal.
    fn remove(&self, element: &T) -> bool;

    /// Audits the internal structure. Only meaningful once concurrent
    /// operations have finished.
    fn validate(&self) -> Result<(), ValidationError>;
}

impl<T> QueueWithRemove<T> for RemovableQueue<T>
where
    T: PartialEq + Clone + Debug,
{
    fn enqueue(&self, element: T) {
        RemovableQueue::enqueue(self, element)
    }

    fn dequeue(&self) -> Option<T> {
        RemovableQueue::dequeue(self)
    }

    fn remove(&self, element: &T) -> bool {
        RemovableQueue::remove(self, element)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        RemovableQueue::validate(self)
    }
}
