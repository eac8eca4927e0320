//! Doubly Linked List
//!
//! Arena-backed doubly linked list. Nodes live in a `Vec` and are addressed by
//! [`NodeId`] handles carrying a generation counter, so a handle to a removed
//! node is detected instead of silently aliasing the slot's next occupant.
//!
//! The list has no sentinel nodes: the boundaries are `None` links. Moving
//! nodes around (`splice`) only rewires links, so handles of every node stay
//! valid across repositioning.

/// Stable handle to a node of a [`DList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node<T> {
    value: Option<T>,
    generation: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly linked list with stable node handles
#[derive(Debug)]
pub struct DList<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for DList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DList<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Number of elements, O(1)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Handle of the first node
    pub fn begin(&self) -> Option<NodeId> {
        self.head.map(|index| self.id_at(index))
    }

    /// Handle of the last node
    pub fn end(&self) -> Option<NodeId> {
        self.tail.map(|index| self.id_at(index))
    }

    pub fn front(&self) -> Option<&T> {
        self.head.and_then(|index| self.nodes[index].value.as_ref())
    }

    pub fn back(&self) -> Option<&T> {
        self.tail.and_then(|index| self.nodes[index].value.as_ref())
    }

    /// Handle of the node following `id`
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        let index = self.resolve(id)?;
        self.nodes[index].next.map(|next| self.id_at(next))
    }

    /// Handle of the node preceding `id`
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        let index = self.resolve(id)?;
        self.nodes[index].prev.map(|prev| self.id_at(prev))
    }

    /// Value stored at `id`, `None` if the handle is stale
    pub fn get(&self, id: NodeId) -> Option<&T> {
        let index = self.resolve(id)?;
        self.nodes[index].value.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        let index = self.resolve(id)?;
        self.nodes[index].value.as_mut()
    }

    pub fn push_front(&mut self, value: T) -> NodeId {
        let before = self.begin();
        self.insert_before(before, value)
    }

    pub fn push_back(&mut self, value: T) -> NodeId {
        self.insert_before(None, value)
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let id = self.begin()?;
        self.remove(id)
    }

    pub fn pop_back(&mut self) -> Option<T> {
        let id = self.end()?;
        self.remove(id)
    }

    /// Insert `value` immediately before `where_`, or at the back when
    /// `where_` is `None`. A stale `where_` also appends.
    pub fn insert_before(&mut self, where_: Option<NodeId>, value: T) -> NodeId {
        let index = self.allocate(value);
        let successor = where_.and_then(|id| self.resolve(id));
        self.link_before(index, successor);
        self.len += 1;
        self.id_at(index)
    }

    /// Unlink and return the value at `id`. Returns `None` for stale handles.
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let index = self.resolve(id)?;
        self.unlink(index);
        self.len -= 1;

        let node = &mut self.nodes[index];
        node.generation = node.generation.wrapping_add(1);
        let value = node.value.take();
        self.free.push(index);
        value
    }

    /// Find the first node in the half-open run `[from, to)` whose value
    /// satisfies `predicate`. `to == None` scans to the end of the list.
    pub fn find<P>(&self, from: Option<NodeId>, to: Option<NodeId>, mut predicate: P) -> Option<NodeId>
    where
        P: FnMut(&T) -> bool,
    {
        let mut cursor = from;
        while let Some(id) = cursor {
            if Some(id) == to {
                break;
            }
            if self.get(id).map_or(false, &mut predicate) {
                return Some(id);
            }
            cursor = self.next(id);
        }
        None
    }

    /// Count every element matching `predicate`
    pub fn count_matching<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        self.iter().filter(|value| predicate(value)).count()
    }

    /// Apply `action` to every element front to back, stopping at the first
    /// error and returning it.
    pub fn for_each<E, F>(&mut self, mut action: F) -> Result<(), E>
    where
        F: FnMut(&mut T) -> Result<(), E>,
    {
        let mut cursor = self.head;
        while let Some(index) = cursor {
            if let Some(value) = self.nodes[index].value.as_mut() {
                action(value)?;
            }
            cursor = self.nodes[index].next;
        }
        Ok(())
    }

    /// Move the run `[from, to)` so that it sits immediately before `where_`
    /// (`None` = the back of the list). `to == None` moves through the last
    /// node. Values are not touched; all handles remain valid.
    ///
    /// Returns `false` without changes when a handle is stale or `where_`
    /// lies inside the moved run.
    pub fn splice(&mut self, where_: Option<NodeId>, from: NodeId, to: Option<NodeId>) -> bool {
        let Some(first) = self.resolve(from) else {
            return false;
        };
        let stop = match to {
            Some(id) => match self.resolve(id) {
                Some(index) => Some(index),
                None => return false,
            },
            None => None,
        };
        let target = match where_ {
            Some(id) => match self.resolve(id) {
                Some(index) => Some(index),
                None => return false,
            },
            None => None,
        };

        if Some(first) == stop {
            return true;
        }

        // Locate the last node of the run and make sure `target` is outside.
        let mut last = first;
        loop {
            if Some(last) == target {
                return false;
            }
            match self.nodes[last].next {
                Some(next) if Some(next) != stop => last = next,
                Some(_) => break,
                None if stop.is_none() => break,
                None => return false,
            }
        }
        if target == stop && stop.is_some() {
            // Already in place.
            return true;
        }
        if target.is_none() && stop.is_none() {
            return true;
        }

        // Detach [first, last].
        let before = self.nodes[first].prev;
        let after = self.nodes[last].next;
        match before {
            Some(index) => self.nodes[index].next = after,
            None => self.head = after,
        }
        match after {
            Some(index) => self.nodes[index].prev = before,
            None => self.tail = before,
        }

        // Reattach before `target`.
        let new_prev = match target {
            Some(index) => self.nodes[index].prev,
            None => self.tail,
        };
        self.nodes[first].prev = new_prev;
        self.nodes[last].next = target;
        match new_prev {
            Some(index) => self.nodes[index].next = Some(first),
            None => self.head = Some(first),
        }
        match target {
            Some(index) => self.nodes[index].prev = Some(last),
            None => self.tail = Some(last),
        }
        true
    }

    /// Drop every element
    pub fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    fn id_at(&self, index: usize) -> NodeId {
        NodeId {
            index,
            generation: self.nodes[index].generation,
        }
    }

    fn resolve(&self, id: NodeId) -> Option<usize> {
        let node = self.nodes.get(id.index)?;
        (node.generation == id.generation && node.value.is_some()).then_some(id.index)
    }

    fn allocate(&mut self, value: T) -> usize {
        match self.free.pop() {
            Some(index) => {
                let node = &mut self.nodes[index];
                node.value = Some(value);
                node.prev = None;
                node.next = None;
                index
            }
            None => {
                self.nodes.push(Node {
                    value: Some(value),
                    generation: 0,
                    prev: None,
                    next: None,
                });
                self.nodes.len() - 1
            }
        }
    }

    fn link_before(&mut self, index: usize, successor: Option<usize>) {
        let predecessor = match successor {
            Some(next) => self.nodes[next].prev,
            None => self.tail,
        };
        self.nodes[index].prev = predecessor;
        self.nodes[index].next = successor;
        match predecessor {
            Some(prev) => self.nodes[prev].next = Some(index),
            None => self.head = Some(index),
        }
        match successor {
            Some(next) => self.nodes[next].prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    fn unlink(&mut self, index: usize) {
        let prev = self.nodes[index].prev;
        let next = self.nodes[index].next;
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[index].prev = None;
        self.nodes[index].next = None;
    }
}

/// Front-to-back iterator over a [`DList`]
pub struct Iter<'a, T> {
    list: &'a DList<T>,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = &self.list.nodes[index];
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        node.value.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> IntoIterator for &'a DList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(list: &DList<i32>) -> Vec<i32> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_push_and_pop_both_ends() {
        let mut list = DList::new();
        list.push_back(2);
        list.push_back(3);
        list.push_front(1);

        assert_eq!(collect(&list), vec![1, 2, 3]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.pop_front(), Some(1));
        assert_eq!(list.pop_back(), Some(3));
        assert_eq!(list.pop_back(), Some(2));
        assert_eq!(list.pop_back(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let mut list = DList::new();
        let first = list.push_back(10);
        assert_eq!(list.remove(first), Some(10));

        // The slot is recycled, the old handle must not see the new value.
        let second = list.push_back(20);
        assert_eq!(list.get(first), None);
        assert_eq!(list.get(second), Some(&20));
        assert_eq!(list.remove(first), None);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_insert_before_and_navigation() {
        let mut list = DList::new();
        let a = list.push_back(1);
        let c = list.push_back(3);
        let b = list.insert_before(Some(c), 2);

        assert_eq!(collect(&list), vec![1, 2, 3]);
        assert_eq!(list.next(a), Some(b));
        assert_eq!(list.prev(c), Some(b));
        assert_eq!(list.prev(a), None);
        assert_eq!(list.next(c), None);
    }

    #[test]
    fn test_find_in_run() {
        let mut list = DList::new();
        for value in 1..=6 {
            list.push_back(value);
        }
        let begin = list.begin();
        let fourth = list.find(begin, None, |v| *v == 4);
        assert_eq!(fourth.and_then(|id| list.get(id)), Some(&4));

        // 5 lies outside of [begin, fourth)
        assert_eq!(list.find(begin, fourth, |v| *v == 5), None);
        assert_eq!(list.count_matching(|v| v % 2 == 0), 3);
    }

    #[test]
    fn test_for_each_stops_on_error() {
        let mut list = DList::new();
        for value in 1..=4 {
            list.push_back(value);
        }
        let result = list.for_each(|v| {
            if *v == 3 {
                return Err(*v);
            }
            *v *= 10;
            Ok(())
        });
        assert_eq!(result, Err(3));
        assert_eq!(collect(&list), vec![10, 20, 3, 4]);
    }

    #[test]
    fn test_splice_keeps_handles_valid() {
        let mut list = DList::new();
        let ids: Vec<NodeId> = (1..=6).map(|v| list.push_back(v)).collect();

        // Move [2, 4) in front of 6: 1 4 5 2 3 6
        assert!(list.splice(Some(ids[5]), ids[1], Some(ids[3])));
        assert_eq!(collect(&list), vec![1, 4, 5, 2, 3, 6]);
        for (id, expected) in ids.iter().zip(1..=6) {
            assert_eq!(list.get(*id), Some(&expected));
        }

        // Move [4, end) to the front.
        assert!(list.splice(list.begin(), ids[3], None));
        assert_eq!(collect(&list), vec![4, 5, 2, 3, 6, 1]);
        assert_eq!(list.back(), Some(&1));
        assert_eq!(list.front(), Some(&4));
    }

    #[test]
    fn test_splice_into_own_run_is_refused() {
        let mut list = DList::new();
        let ids: Vec<NodeId> = (1..=4).map(|v| list.push_back(v)).collect();

        assert!(!list.splice(Some(ids[2]), ids[1], Some(ids[3])));
        assert_eq!(collect(&list), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut list = DList::new();
        list.push_back(1);
        list.push_back(2);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.iter().count(), 0);
    }
}
