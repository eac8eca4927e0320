//! Property-based tests for the ordered containers
//!
//! These tests check the containers against a plain `Vec` model.

#[cfg(test)]
mod property_tests {
    use proptest::prelude::*;

    use crate::collections::{DList, PQueue};

    #[derive(Debug, Clone)]
    enum Op {
        Insert(u16),
        PopMin,
        RemoveMatching(u16),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0u16..64).prop_map(Op::Insert),
            1 => Just(Op::PopMin),
            1 => (0u16..64).prop_map(Op::RemoveMatching),
        ]
    }

    /// **Priority ordering**
    /// *For any* interleaving of inserts and removals, `peek_min` returns the
    /// smallest key and draining the queue yields keys in ascending order.
    mod priority_ordering {
        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn peek_min_is_always_the_minimum(ops in prop::collection::vec(op_strategy(), 0..120)) {
                let mut queue = PQueue::new(|a: &u16, b: &u16| a.cmp(b));
                let mut model: Vec<u16> = Vec::new();

                for op in ops {
                    match op {
                        Op::Insert(key) => {
                            queue.insert(key);
                            model.push(key);
                        }
                        Op::PopMin => {
                            let popped = queue.pop_min();
                            let expected = model.iter().min().copied();
                            prop_assert_eq!(popped, expected);
                            if let Some(key) = expected {
                                let index = model.iter().position(|k| *k == key).unwrap();
                                model.remove(index);
                            }
                        }
                        Op::RemoveMatching(key) => {
                            let removed = queue.remove_matching(|k| *k == key);
                            match model.iter().position(|k| *k == key) {
                                Some(index) => {
                                    model.remove(index);
                                    prop_assert_eq!(removed, Some(key));
                                }
                                None => prop_assert_eq!(removed, None),
                            }
                        }
                    }

                    prop_assert_eq!(queue.len(), model.len());
                    prop_assert_eq!(queue.peek_min().copied(), model.iter().min().copied());
                }

                let mut drained = Vec::new();
                while let Some(key) = queue.pop_min() {
                    drained.push(key);
                }
                model.sort_unstable();
                prop_assert_eq!(drained, model);
            }

            #[test]
            fn equal_keys_leave_in_insertion_order(keys in prop::collection::vec(0u8..4, 1..60)) {
                let mut queue = PQueue::new(|a: &(u8, usize), b: &(u8, usize)| a.0.cmp(&b.0));
                for (seq, key) in keys.iter().enumerate() {
                    queue.insert((*key, seq));
                }

                let mut previous: Option<(u8, usize)> = None;
                while let Some(item) = queue.pop_min() {
                    if let Some(prev) = previous {
                        prop_assert!(prev.0 <= item.0);
                        if prev.0 == item.0 {
                            prop_assert!(prev.1 < item.1, "FIFO violated: {:?} before {:?}", prev, item);
                        }
                    }
                    previous = Some(item);
                }
            }
        }
    }

    /// **Splice preserves contents**
    /// *For any* list and any valid run, splicing it elsewhere produces the
    /// same permutation as moving the slice in a `Vec`.
    mod splice_model {
        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            #[test]
            fn splice_matches_vec_model(
                len in 2usize..20,
                a in 0usize..20,
                b in 0usize..20,
                target in 0usize..21,
            ) {
                let from = a % len;
                let to = from + 1 + (b % (len - from));
                prop_assume!(target < from || target >= to);

                let mut list = DList::new();
                let ids: Vec<_> = (0..len).map(|v| list.push_back(v)).collect();
                let where_ = if target >= len { None } else { Some(ids[target]) };
                let to_id = if to >= len { None } else { Some(ids[to]) };

                prop_assert!(list.splice(where_, ids[from], to_id));

                let mut model: Vec<usize> = (0..len).collect();
                let run: Vec<usize> = model.drain(from..to).collect();
                let insert_at = if target >= len {
                    model.len()
                } else {
                    model.iter().position(|v| *v == target).unwrap()
                };
                for (offset, value) in run.into_iter().enumerate() {
                    model.insert(insert_at + offset, value);
                }

                prop_assert_eq!(list.iter().copied().collect::<Vec<_>>(), model);
                for (value, id) in ids.iter().enumerate() {
                    prop_assert_eq!(list.get(*id), Some(&value));
                }
            }
        }
    }
}
