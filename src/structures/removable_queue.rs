use arc_swap::{ArcSwap, ArcSwapAny, ArcSwapOption, RefCnt};
#[cfg(feature = "backoff")]
use crossbeam::utils::Backoff;
use std::fmt::{self, Debug};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// A structural invariant found broken by [`RemovableQueue::validate`].
///
/// Elements are rendered with their `Debug` output, or `<none>` when the
/// node no longer carries one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("`head.prev` must be absent")]
    HeadHasPrev,
    #[error("`tail.next` must be absent")]
    TailHasNext,
    #[error("removed node with element {element} found in the middle of the queue")]
    RemovedNodeInside { element: String },
    #[error("the `prev` link of node with element {element} is absent, while the node is in the middle of the queue")]
    MissingPrev { element: String },
    #[error("node.next.prev != node; `node` contains {node}, `node.next` contains {next}")]
    PrevMismatch { node: String, next: String },
}

/// A link in the chain. Both directions hold strong references; the
/// cycles they form are broken when a node becomes the head and when the
/// queue is dropped.
struct Node<T> {
    element: ArcSwapOption<T>,
    next: ArcSwapOption<Node<T>>,
    prev: ArcSwapOption<Node<T>>,
    extracted_or_removed: AtomicBool,
}

type Link<T> = Arc<Node<T>>;

#[cfg(test)]
thread_local! {
    static LINK_WRITES: std::cell::Cell<usize> = std::cell::Cell::new(0);
}

#[inline]
fn count_link_write() {
    #[cfg(test)]
    LINK_WRITES.with(|writes| writes.set(writes.get() + 1));
}

impl<T> Node<T> {
    fn dummy() -> Link<T> {
        Arc::new(Node {
            element: ArcSwapOption::empty(),
            next: ArcSwapOption::empty(),
            prev: ArcSwapOption::empty(),
            extracted_or_removed: AtomicBool::new(false),
        })
    }

    fn new(element: T) -> Link<T> {
        Arc::new(Node {
            element: ArcSwapOption::new(Some(Arc::new(element))),
            next: ArcSwapOption::empty(),
            prev: ArcSwapOption::empty(),
            extracted_or_removed: AtomicBool::new(false),
        })
    }

    fn is_extracted_or_removed(&self) -> bool {
        self.extracted_or_removed.load(Ordering::Acquire)
    }

    /// Flips the one-shot flag. Only the caller that flipped it owns the
    /// element afterwards.
    fn mark_extracted_or_removed(&self) -> bool {
        self.extracted_or_removed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn holds(&self, element: &T) -> bool
    where
        T: PartialEq,
    {
        self.element.load().as_deref() == Some(element)
    }

    /// Claims the node for a dequeue and moves its element out.
    fn extract_element(&self) -> Option<T>
    where
        T: Clone,
    {
        if !self.mark_extracted_or_removed() {
            return None;
        }
        // A concurrent `remove` traversal may still be comparing against the
        // element, in which case we get a shared handle back and clone.
        self.element
            .swap(None)
            .map(|element| Arc::try_unwrap(element).unwrap_or_else(|shared| T::clone(&shared)))
    }

    /// Marks the node and splices it out of the chain, then keeps splicing
    /// neighbours that turn out to be marked as well.
    ///
    /// Returns `true` only if this call flipped the flag. A node sitting at
    /// either end of the chain is left for the enqueue or dequeue that is
    /// moving past it.
    fn remove(&self) -> bool {
        let removed = self.mark_extracted_or_removed();

        let mut pending: Vec<Link<T>> = Vec::new();
        let mut neighbours = self.splice();
        loop {
            if let Some((cur_prev, cur_next)) = neighbours {
                // Predecessor is handled first.
                if cur_next.is_extracted_or_removed() {
                    pending.push(cur_next);
                }
                if cur_prev.is_extracted_or_removed() {
                    pending.push(cur_prev);
                }
            }
            match pending.pop() {
                Some(node) => {
                    trace!("cascading removal to a marked neighbour");
                    neighbours = node.splice();
                }
                None => break,
            }
        }
        removed
    }

    /// Links the predecessor straight to the successor and repairs the
    /// successor's back-link. Returns both neighbours, or `None` if either
    /// one is absent.
    fn splice(&self) -> Option<(Link<T>, Link<T>)> {
        let (Some(cur_next), Some(cur_prev)) = (self.next.load_full(), self.prev.load_full())
        else {
            return None;
        };

        cur_prev.next.store(Some(Arc::clone(&cur_next)));
        count_link_write();
        loop {
            let prev_of_next = cur_next.prev.load_full();
            if prev_of_next.is_none() {
                break;
            }
            if compare_and_set(&cur_next.prev, &prev_of_next, Some(Arc::clone(&cur_prev))) {
                count_link_write();
                break;
            }
        }
        trace!("spliced node out of the queue");
        Some((cur_prev, cur_next))
    }

    fn remove_if_marked(&self) {
        if self.is_extracted_or_removed() {
            self.remove();
        }
    }

    fn describe(&self) -> String
    where
        T: Debug,
    {
        match self.element.load().as_deref() {
            Some(element) => format!("{:?}", element),
            None => String::from("<none>"),
        }
    }
}

impl<T> Drop for Node<T> {
    // Unwinds the forward chain in a loop so long runs of garbage nodes
    // are not freed recursively.
    fn drop(&mut self) {
        let mut next = self.next.swap(None);
        while let Some(node) = next {
            next = match Arc::try_unwrap(node) {
                Ok(node) => {
                    node.prev.store(None);
                    node.next.swap(None)
                }
                Err(_) => None,
            };
        }
    }
}

fn compare_and_set<R: RefCnt>(slot: &ArcSwapAny<R>, current: &R, new: R) -> bool {
    let previous = slot.compare_and_swap(current, new);
    ptr::eq(R::as_ptr(&previous), R::as_ptr(current))
}

/// Retry pacing for failed compare-and-swap attempts.
struct Contention {
    #[cfg(feature = "backoff")]
    backoff: Backoff,
}

impl Contention {
    fn new() -> Self {
        Contention {
            #[cfg(feature = "backoff")]
            backoff: Backoff::new(),
        }
    }

    #[inline]
    fn spin(&self) {
        #[cfg(feature = "backoff")]
        self.backoff.spin();
    }
}

/// Lock-free Michael-Scott queue whose nodes also link backwards, so that
/// any enqueued element can be removed by touching only its two neighbours.
///
/// `enqueue`, `dequeue` and `remove` may be called from any number of threads
/// at once. Nodes are reference counted; a node stays valid for every thread
/// that reached it before it was unlinked.
pub struct RemovableQueue<T> {
    head: ArcSwap<Node<T>>,
    tail: ArcSwap<Node<T>>,
}

impl<T> RemovableQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let dummy = Node::dummy();
        Self {
            head: ArcSwap::new(Arc::clone(&dummy)),
            tail: ArcSwap::new(dummy),
        }
    }

    /// Appends an element at the tail.
    pub fn enqueue(&self, element: T) {
        let new_tail = Node::new(element);
        let contention = Contention::new();

        loop {
            let cur_tail = self.tail.load_full();
            new_tail.prev.store(Some(Arc::clone(&cur_tail)));

            if compare_and_set(&cur_tail.next, &None, Some(Arc::clone(&new_tail))) {
                compare_and_set(&self.tail, &cur_tail, Arc::clone(&new_tail));
                // The old tail could not be spliced while it had no successor.
                cur_tail.remove_if_marked();
                return;
            }

            if let Some(next) = cur_tail.next.load_full() {
                compare_and_set(&self.tail, &cur_tail, next);
            }
            contention.spin();
        }
    }

    /// Takes the earliest live element, or `None` if there is none.
    pub fn dequeue(&self) -> Option<T>
    where
        T: Clone,
    {
        let contention = Contention::new();

        loop {
            let cur_head = self.head.load_full();
            let next_head = cur_head.next.load_full()?;

            if compare_and_set(&self.head, &cur_head, Arc::clone(&next_head)) {
                // Also breaks the cycle with the old head.
                next_head.prev.store(None);
                if let Some(element) = next_head.extract_element() {
                    return Some(element);
                }
                // Lost the node to a concurrent `remove`; move on to the next one.
            } else {
                contention.spin();
            }
        }
    }

    /// Removes the first live element equal to `element`, scanning from the
    /// head. Returns `true` only if this call performed the removal.
    pub fn remove(&self, element: &T) -> bool
    where
        T: PartialEq,
    {
        let mut node = self.head.load_full();
        while let Some(next) = node.next.load_full() {
            node = next;
            if node.holds(element) && node.remove() {
                return true;
            }
        }
        false
    }

    /// Returns `true` if no live element is reachable from the head. The
    /// answer may be stale by the time it is observed.
    pub fn is_empty(&self) -> bool {
        let mut node = self.head.load_full();
        while let Some(next) = node.next.load_full() {
            if !next.is_extracted_or_removed() {
                return false;
            }
            node = next;
        }
        true
    }

    /// Checks the structural invariants of the chain with a single forward
    /// pass. Must not run concurrently with mutating operations.
    pub fn validate(&self) -> Result<(), ValidationError>
    where
        T: Debug,
    {
        let head = self.head.load_full();
        let tail = self.tail.load_full();

        if head.prev.load().is_some() {
            return broken(ValidationError::HeadHasPrev);
        }
        if tail.next.load().is_some() {
            return broken(ValidationError::TailHasNext);
        }

        let mut node = Arc::clone(&head);
        loop {
            if !Arc::ptr_eq(&node, &head)
                && !Arc::ptr_eq(&node, &tail)
                && node.is_extracted_or_removed()
            {
                return broken(ValidationError::RemovedNodeInside {
                    element: node.describe(),
                });
            }

            let Some(next) = node.next.load_full() else {
                break;
            };

            let Some(prev_of_next) = next.prev.load_full() else {
                return broken(ValidationError::MissingPrev {
                    element: next.describe(),
                });
            };
            if !Arc::ptr_eq(&prev_of_next, &node) {
                return broken(ValidationError::PrevMismatch {
                    node: node.describe(),
                    next: next.describe(),
                });
            }

            node = next;
        }
        Ok(())
    }
}

fn broken(error: ValidationError) -> Result<(), ValidationError> {
    debug!(%error, "queue invariant violated");
    Err(error)
}

impl<T> Drop for RemovableQueue<T> {
    fn drop(&mut self) {
        // Back-links keep their predecessors alive; clear them so the
        // forward chain can be released.
        let mut node = Some(self.head.load_full());
        while let Some(current) = node {
            current.prev.store(None);
            node = current.next.load_full();
        }
    }
}

impl<T> Default for RemovableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Debug for RemovableQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemovableQueue").finish_non_exhaustive()
    }
}

impl<T> Extend<T> for RemovableQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for element in iter {
            self.enqueue(element);
        }
    }
}

impl<T> FromIterator<T> for RemovableQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}
