//! Doubly-linked queues whose nodes live in a pool.
//!
//! A queue without an ordering function is plain FIFO. With one, entries are
//! kept sorted by key; an entry goes after every existing entry with an equal
//! key, so equal keys stay in insertion order.

use core::cmp::Ordering;

use crate::config::Trace;
use crate::log_trace;
use crate::pool::{Clear, Pool, Slot};
use crate::{config, log_info};

/// Ordering key attached to every queue entry.
pub type Key = u32;

/// Comparator for ordered queues.
pub type OrderFn = fn(Key, Key) -> Ordering;

/// Ascending key order; used by the sleep queue.
pub fn ascending(a: Key, b: Key) -> Ordering {
    a.cmp(&b)
}

struct Node<V> {
    key: Key,
    value: Option<V>,
    prev: Option<Slot>,
    next: Option<Slot>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Node { key: 0, value: None, prev: None, next: None }
    }
}

impl<V> Clear for Node<V> {
    fn clear(&mut self) {
        *self = Node::default();
    }
}

pub struct Queue<V> {
    nodes: Pool<Node<V>>,
    head: Option<Slot>,
    tail: Option<Slot>,
    len: usize,
    order: Option<OrderFn>,
}

impl<V> Queue<V> {
    pub fn new(order: Option<OrderFn>) -> Self {
        Queue {
            nodes: Pool::new(Pool::<Node<V>>::units_per_slice(config::SLICE_SIZE)),
            head: None,
            tail: None,
            len: 0,
            order,
        }
    }

    /// A FIFO queue.
    pub fn fifo() -> Self {
        Self::new(None)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, slot: Slot) -> &Node<V> {
        match self.nodes.get(slot) {
            Some(node) => node,
            None => panic!("queue: link to free node {}", slot.0),
        }
    }

    fn node_mut(&mut self, slot: Slot) -> &mut Node<V> {
        match self.nodes.get_mut(slot) {
            Some(node) => node,
            None => panic!("queue: link to free node {}", slot.0),
        }
    }

    /// Insert `value` with `key`; returns the queue length afterwards.
    pub fn insert(&mut self, value: V, key: Key) -> usize {
        let slot = match self.nodes.alloc() {
            Ok(slot) => slot,
            Err(e) => panic!("queue: node allocation failed: {}", e),
        };
        {
            let node = self.node_mut(slot);
            node.key = key;
            node.value = Some(value);
        }

        // Find the first node that must come after the new one.
        let mut before = None;
        if let Some(order) = self.order {
            let mut cursor = self.head;
            while let Some(curr) = cursor {
                let node = self.node(curr);
                if order(key, node.key) == Ordering::Less {
                    before = Some(curr);
                    break;
                }
                cursor = node.next;
            }
        }

        match before {
            None => {
                // append
                let old_tail = self.tail;
                self.node_mut(slot).prev = old_tail;
                match old_tail {
                    Some(t) => self.node_mut(t).next = Some(slot),
                    None => self.head = Some(slot),
                }
                self.tail = Some(slot);
            }
            Some(next) => {
                let prev = self.node(next).prev;
                {
                    let node = self.node_mut(slot);
                    node.prev = prev;
                    node.next = Some(next);
                }
                self.node_mut(next).prev = Some(slot);
                match prev {
                    Some(p) => self.node_mut(p).next = Some(slot),
                    None => self.head = Some(slot),
                }
            }
        }

        self.len += 1;
        log_trace!(Trace::QUEUE, "queue: insert key {} -> len {}", key, self.len);
        self.len
    }

    fn unlink(&mut self, slot: Slot) -> (Key, V) {
        let (prev, next) = {
            let node = self.node(slot);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let node = self.node_mut(slot);
        let key = node.key;
        let value = match node.value.take() {
            Some(value) => value,
            None => panic!("queue: linked node {} has no value", slot.0),
        };
        self.nodes.free(slot);
        self.len -= 1;
        (key, value)
    }

    /// Remove the first entry.
    pub fn remove_front(&mut self) -> Option<(Key, V)> {
        let head = self.head?;
        Some(self.unlink(head))
    }

    /// Remove the first entry (front to back) accepted by `pred`.
    pub fn remove_matching<F>(&mut self, mut pred: F) -> Option<(Key, V)>
    where
        F: FnMut(Key, &V) -> bool,
    {
        let mut cursor = self.head;
        while let Some(curr) = cursor {
            let node = self.node(curr);
            if let Some(value) = node.value.as_ref() {
                if pred(node.key, value) {
                    return Some(self.unlink(curr));
                }
            }
            cursor = node.next;
        }
        None
    }

    pub fn peek_front(&self) -> Option<(Key, &V)> {
        let node = self.node(self.head?);
        node.value.as_ref().map(|v| (node.key, v))
    }

    /// Visit every entry in queue order.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(Key, &V),
    {
        let mut cursor = self.head;
        while let Some(curr) = cursor {
            let node = self.node(curr);
            if let Some(value) = node.value.as_ref() {
                visit(node.key, value);
            }
            cursor = node.next;
        }
    }

    /// Nodes currently held by this queue's node pool (free + linked).
    pub fn node_capacity(&self) -> usize {
        self.nodes.capacity()
    }

    pub fn free_nodes(&self) -> usize {
        self.nodes.available()
    }
}

impl<V: core::fmt::Debug> Queue<V> {
    /// Log the queue contents, five entries per line.
    pub fn dump(&self, name: &str) {
        log_info!("{}: len {}, {}", name, self.len, if self.order.is_some() { "ordered" } else { "FIFO" });
        let mut shown = 0;
        self.for_each(|key, value| {
            if shown < 5 {
                log_info!("  [{}] key {} -> {:?}", shown, key, value);
            }
            shown += 1;
        });
        if shown > 5 {
            log_info!("  ... {} more", shown - 5);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn contents<V: Copy>(q: &Queue<V>) -> Vec<(Key, V)> {
        let mut out = Vec::new();
        q.for_each(|k, v| out.push((k, *v)));
        out
    }

    #[test]
    fn fifo_preserves_insertion_order() {
        let mut q = Queue::fifo();
        q.insert('a', 9);
        q.insert('b', 1);
        assert_eq!(q.insert('c', 5), 3);
        assert_eq!(q.remove_front(), Some((9, 'a')));
        assert_eq!(q.remove_front(), Some((1, 'b')));
        assert_eq!(q.remove_front(), Some((5, 'c')));
        assert_eq!(q.remove_front(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn ordered_insert_keeps_equal_keys_fifo() {
        let mut q = Queue::new(Some(ascending));
        q.insert("late", 150);
        q.insert("early", 100);
        q.insert("tie-1", 120);
        q.insert("tie-2", 120);
        q.insert("first", 5);
        assert_eq!(
            contents(&q),
            vec![(5, "first"), (100, "early"), (120, "tie-1"), (120, "tie-2"), (150, "late")]
        );
        assert_eq!(q.peek_front(), Some((5, &"first")));
    }

    #[test]
    fn remove_matching_takes_first_match_and_relinks() {
        let mut q = Queue::fifo();
        for v in 1..=5u32 {
            q.insert(v, v * 10);
        }
        assert_eq!(q.remove_matching(|_, v| v % 2 == 0), Some((20, 2)));
        assert_eq!(q.remove_matching(|k, _| k == 50), Some((50, 5)));
        assert_eq!(q.remove_matching(|_, v| *v == 42), None);
        assert_eq!(contents(&q), vec![(10, 1), (30, 3), (40, 4)]);
        q.insert(6, 60);
        assert_eq!(contents(&q), vec![(10, 1), (30, 3), (40, 4), (60, 6)]);
    }

    #[test]
    fn nodes_are_recycled() {
        let mut q = Queue::fifo();
        for round in 0..10u32 {
            q.insert(round, round);
            q.insert(round, round);
            q.remove_front();
            q.remove_front();
        }
        let cap = q.node_capacity();
        assert!(cap >= 2);
        assert_eq!(q.free_nodes(), cap);
    }
}
