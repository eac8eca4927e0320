//! Sorted List
//!
//! A [`DList`] kept in ascending order by a comparator chosen at
//! construction. New elements go in front of the first element that is not
//! strictly less than them, which keeps equal elements in insertion order.

use std::cmp::Ordering;

use super::dlist::{DList, Iter, NodeId};

/// Comparator-ordered list
pub struct SortedList<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    list: DList<T>,
    cmp: C,
}

impl<T, C> SortedList<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    /// Create an empty list ordered by `cmp`
    pub fn new(cmp: C) -> Self {
        Self {
            list: DList::new(),
            cmp,
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Insert `value` at its sorted position and return its handle
    pub fn insert(&mut self, value: T) -> NodeId {
        let position = self.first_not_less(self.list.begin(), &value);
        self.list.insert_before(position, value)
    }

    /// Smallest element
    pub fn first(&self) -> Option<&T> {
        self.list.front()
    }

    /// Largest element
    pub fn last(&self) -> Option<&T> {
        self.list.back()
    }

    pub fn begin(&self) -> Option<NodeId> {
        self.list.begin()
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.list.next(id)
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.list.prev(id)
    }

    pub fn pop_first(&mut self) -> Option<T> {
        self.list.pop_front()
    }

    pub fn pop_last(&mut self) -> Option<T> {
        self.list.pop_back()
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.list.get(id)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        self.list.remove(id)
    }

    /// Handle of the first element the comparator considers equal to `value`
    pub fn find(&self, value: &T) -> Option<NodeId> {
        self.list
            .find(self.list.begin(), None, |item| (self.cmp)(item, value) == Ordering::Equal)
    }

    /// Handle of the first element satisfying `predicate`
    pub fn find_if<P>(&self, predicate: P) -> Option<NodeId>
    where
        P: FnMut(&T) -> bool,
    {
        self.list.find(self.list.begin(), None, predicate)
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.list.iter()
    }

    /// Drain `other` into this list, keeping the order. Runs in
    /// O(len + other.len) because both inputs are already sorted. Elements of
    /// `self` stay ahead of equal elements coming from `other`.
    pub fn merge<D>(&mut self, mut other: SortedList<T, D>)
    where
        D: Fn(&T, &T) -> Ordering,
    {
        let mut cursor = self.list.begin();
        while let Some(value) = other.list.pop_front() {
            cursor = self.first_greater(cursor, &value);
            self.list.insert_before(cursor, value);
        }
    }

    fn first_not_less(&self, from: Option<NodeId>, value: &T) -> Option<NodeId> {
        let cmp = &self.cmp;
        self.list
            .find(from, None, |item| cmp(item, value) != Ordering::Less)
    }

    fn first_greater(&self, from: Option<NodeId>, value: &T) -> Option<NodeId> {
        let cmp = &self.cmp;
        self.list
            .find(from, None, |item| cmp(item, value) == Ordering::Greater)
    }
}

impl<'a, T, C> IntoIterator for &'a SortedList<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_keeps_ascending_order() {
        let mut list = SortedList::new(|a: &i32, b: &i32| a.cmp(b));
        for value in [5, 1, 4, 2, 3] {
            list.insert(value);
        }
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(list.first(), Some(&1));
        assert_eq!(list.last(), Some(&5));
    }

    #[test]
    fn test_equal_keys_are_fifo() {
        let mut list = SortedList::new(|a: &(u32, char), b: &(u32, char)| a.0.cmp(&b.0));
        list.insert((2, 'a'));
        list.insert((1, 'b'));
        list.insert((2, 'c'));
        list.insert((2, 'd'));

        let tags: Vec<char> = list.iter().map(|(_, tag)| *tag).collect();
        assert_eq!(tags, vec!['b', 'a', 'c', 'd']);
    }

    #[test]
    fn test_find_and_remove() {
        let mut list = SortedList::new(|a: &i32, b: &i32| a.cmp(b));
        for value in [10, 30, 20] {
            list.insert(value);
        }
        let id = list.find(&20).expect("20 is present");
        assert_eq!(list.remove(id), Some(20));
        assert!(list.find(&20).is_none());
        assert!(list.find_if(|v| *v > 25).is_some());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_merge_interleaves() {
        let mut left = SortedList::new(|a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0));
        let mut right = SortedList::new(|a: &(i32, char), b: &(i32, char)| a.0.cmp(&b.0));
        for key in [1, 3, 5] {
            left.insert((key, 'l'));
        }
        for key in [0, 3, 6] {
            right.insert((key, 'r'));
        }

        left.merge(right);
        let merged: Vec<(i32, char)> = left.iter().copied().collect();
        assert_eq!(
            merged,
            vec![(0, 'r'), (1, 'l'), (3, 'l'), (3, 'r'), (5, 'l'), (6, 'r')]
        );
    }

    #[test]
    fn test_pop_both_ends() {
        let mut list = SortedList::new(|a: &i32, b: &i32| b.cmp(a));
        for value in [1, 3, 2] {
            list.insert(value);
        }
        // Reversed comparator: largest first.
        assert_eq!(list.pop_first(), Some(3));
        assert_eq!(list.pop_last(), Some(1));
        assert_eq!(list.pop_first(), Some(2));
        assert!(list.is_empty());
    }
}
