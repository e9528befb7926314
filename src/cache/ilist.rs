// Handle-encoded intrusive lists for bucket membership.
//
// Every bucket owns one circular doubly-linked list threaded through this
// shared table: handles below the slot count are buffer slots, the handles
// after them are the per-bucket sentinels. Links may only be read or
// written while holding the lock of the bucket that currently owns the
// nodes involved; a migration touching two buckets holds both locks. The
// atomics carry the values across bucket-lock handoffs, the locks provide
// the exclusion, so relaxed ordering suffices throughout.

use std::sync::atomic::{AtomicUsize, Ordering};

struct Link {
    prev: AtomicUsize,
    next: AtomicUsize,
}

pub(crate) struct LinkTable {
    links: Box<[Link]>,
}

impl LinkTable {
    /// Create a table of `nodes` self-linked nodes (empty rings).
    pub fn new(nodes: usize) -> Self {
        let links = (0..nodes)
            .map(|h| Link {
                prev: AtomicUsize::new(h),
                next: AtomicUsize::new(h),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        LinkTable { links }
    }

    pub fn next_of(&self, handle: usize) -> usize {
        self.links[handle].next.load(Ordering::Relaxed)
    }

    /// Insert `node` right after `sentinel` (head of that ring).
    pub fn push_front(&self, sentinel: usize, node: usize) {
        let head = self.links[sentinel].next.load(Ordering::Relaxed);
        self.links[node].next.store(head, Ordering::Relaxed);
        self.links[node].prev.store(sentinel, Ordering::Relaxed);
        self.links[head].prev.store(node, Ordering::Relaxed);
        self.links[sentinel].next.store(node, Ordering::Relaxed);
    }

    /// Unlink `node` from its ring, leaving it self-linked.
    pub fn remove(&self, node: usize) {
        let prev = self.links[node].prev.load(Ordering::Relaxed);
        let next = self.links[node].next.load(Ordering::Relaxed);
        self.links[prev].next.store(next, Ordering::Relaxed);
        self.links[next].prev.store(prev, Ordering::Relaxed);
        self.links[node].prev.store(node, Ordering::Relaxed);
        self.links[node].next.store(node, Ordering::Relaxed);
    }
}
