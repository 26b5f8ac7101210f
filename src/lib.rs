//! A lock-free FIFO queue with constant-time removal of arbitrary elements.
//!
//! [`RemovableQueue`] is a Michael-Scott queue whose nodes also carry a
//! backward link. Removing an element marks its node and splices it out
//! using only the two neighbours, so `remove` never blocks `enqueue`,
//! `dequeue` or other removals.
//!
//! ```
//! use removable_queue::RemovableQueue;
//!
//! let queue = RemovableQueue::new();
//! queue.enqueue(1);
//! queue.enqueue(2);
//! queue.enqueue(3);
//! assert!(queue.remove(&2));
//! assert_eq!(queue.dequeue(), Some(1));
//! assert_eq!(queue.dequeue(), Some(3));
//! assert_eq!(queue.dequeue(), None);
//! ```

pub mod structures;

pub use structures::locked_queue::LockedQueue;
pub use structures::removable_queue::{RemovableQueue, ValidationError};
pub use structures::QueueWithRemove;
