//! Priority Queue
//!
//! Min-priority queue over a [`SortedList`]. The minimum always sits at the
//! front of the underlying list, so peeking and popping it are O(1) while
//! insertion and removal by predicate are linear.

use std::cmp::Ordering;

use super::dlist::{Iter, NodeId};
use super::sorted_list::SortedList;

/// Priority queue ordered by a caller-supplied comparator
pub struct PQueue<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    list: SortedList<T, C>,
}

impl<T, C> PQueue<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    /// Create an empty queue. `cmp` is the only authority on priority:
    /// `Ordering::Less` means "runs earlier".
    pub fn new(cmp: C) -> Self {
        Self {
            list: SortedList::new(cmp),
        }
    }

    /// Enqueue `item` behind every element that is not greater than it
    pub fn insert(&mut self, item: T) -> NodeId {
        self.list.insert(item)
    }

    /// Element with the highest priority, without removing it
    pub fn peek_min(&self) -> Option<&T> {
        self.list.first()
    }

    /// Remove and return the element with the highest priority
    pub fn pop_min(&mut self) -> Option<T> {
        self.list.pop_first()
    }

    /// Remove and return the first element matching `predicate`
    pub fn remove_matching<P>(&mut self, predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let id = self.list.find_if(predicate)?;
        self.list.remove(id)
    }

    /// Remove the element behind a handle returned by [`PQueue::insert`]
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        self.list.remove(id)
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Drop every element, front first
    pub fn clear(&mut self) {
        while self.pop_min().is_some() {}
    }

    /// Iterate in priority order
    pub fn iter(&self) -> Iter<'_, T> {
        self.list.iter()
    }
}
