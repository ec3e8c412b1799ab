//! Recency Ordering for LRU Eviction
//!
//! A doubly-linked list of keys stored in a slab (`Vec` of slots plus a free
//! list). Every node is addressed by a stable [`NodeHandle`], which the cache
//! entry keeps so the key can be unlinked in O(1) when it is touched, deleted
//! or expired.
//!
//! ```text
//!   head (most recent)                         tail (least recent)
//!      │                                              │
//!      ▼                                              ▼
//!   ┌──────┐ next ┌──────┐ next ┌──────┐ next ┌──────┐
//!   │  c   │─────>│  a   │─────>│  d   │─────>│  b   │
//!   │      │<─────│      │<─────│      │<─────│      │
//!   └──────┘ prev └──────┘ prev └──────┘ prev └──────┘
//! ```
//!
//! Freed slots are recycled, so a handle is only meaningful while its key is
//! still linked. The cache store guarantees that by removing the handle from the
//! entry at the same time it unlinks the node.

/// Opaque position of a key in the recency list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle(usize);

#[derive(Debug)]
struct Node {
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Doubly-linked recency list, most recently used at the head.
#[derive(Debug, Default)]
pub struct RecencyList {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl RecencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links `key` at the head and returns its handle.
    pub fn push_front(&mut self, key: String) -> NodeHandle {
        let node = Node {
            key,
            prev: None,
            next: self.head,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        if let Some(old_head) = self.head {
            if let Some(n) = self.slots[old_head].as_mut() {
                n.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
        self.len += 1;

        NodeHandle(idx)
    }

    /// Unlinks the node behind `handle` and returns its key.
    ///
    /// Returns `None` if the slot is already free.
    pub fn remove(&mut self, handle: NodeHandle) -> Option<String> {
        let idx = handle.0;
        let node = self.slots.get_mut(idx)?.take()?;

        match node.prev {
            Some(prev) => {
                if let Some(n) = self.slots[prev].as_mut() {
                    n.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => {
                if let Some(n) = self.slots[next].as_mut() {
                    n.prev = node.prev;
                }
            }
            None => self.tail = node.prev,
        }

        self.free.push(idx);
        self.len -= 1;
        Some(node.key)
    }

    /// Moves an already-linked node to the head.
    ///
    /// The handle may change, so the caller must store the returned one.
    pub fn move_to_front(&mut self, handle: NodeHandle) -> Option<NodeHandle> {
        if self.head == Some(handle.0) {
            return Some(handle);
        }
        let key = self.remove(handle)?;
        Some(self.push_front(key))
    }

    /// Unlinks and returns the least recently used key.
    pub fn pop_back(&mut self) -> Option<String> {
        let tail = self.tail?;
        self.remove(NodeHandle(tail))
    }

    /// The least recently used key, if any.
    pub fn peek_back(&self) -> Option<&str> {
        let tail = self.tail?;
        self.slots[tail].as_ref().map(|n| n.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates keys from most to least recently used.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }
}

/// Head-to-tail iterator over a [`RecencyList`].
pub struct Iter<'a> {
    list: &'a RecencyList,
    cursor: Option<usize>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.list.slots[idx].as_ref()?;
        self.cursor = node.next;
        Some(node.key.as_str())
    }
}
