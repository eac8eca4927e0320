//! Collections Module
//!
//! Ordered containers backing the task scheduler:
//! - `DList`: arena doubly linked list with stable handles and splicing
//! - `SortedList`: comparator-ordered list, FIFO among equal elements
//! - `PQueue`: min-priority queue with O(1) peek/pop of the minimum

pub mod dlist;
pub mod p_queue;
pub mod sorted_list;

#[cfg(test)]
mod tests;

pub use dlist::{DList, NodeId};
pub use p_queue::PQueue;
pub use sorted_list::SortedList;
