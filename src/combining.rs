//! Software combining tree barrier.
//!
//! Threads are registered in groups; the last arrival of each group combines
//! the whole group into a single arrival at the next tree level, so no counter
//! word is ever touched by more threads than its group width. New groups are
//! inserted by level-order traversal, keeping the tree balanced without any
//! rebalancing step.
//!
//! Registration is serialized by a lock so insertions cannot overwrite each
//! other; the wait path is lock-free.

use crate::arena::Arena;
use crate::macros::{trace, uassert};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Marks an absent parent or child link.
const NIL: usize = usize::MAX;

/// One tree node. `k` is the number of arrivals this node expects per episode:
/// the threads registered directly on it plus one per attached child subtree.
#[derive(Debug)]
struct Group {
    k: AtomicU32,
    count: AtomicU32,
    sense: AtomicU32,
    parent: AtomicUsize,
    lchild: AtomicUsize,
    rchild: AtomicUsize,
}

impl Group {
    fn vacant() -> Self {
        Self {
            k: AtomicU32::new(0),
            count: AtomicU32::new(0),
            sense: AtomicU32::new(0),
            parent: AtomicUsize::new(NIL),
            lchild: AtomicUsize::new(NIL),
            rchild: AtomicUsize::new(NIL),
        }
    }
}

/// Shared state of a combining tree barrier.
///
/// Holds the node arena and the registration lock. The seed root occupies the
/// first arena slot and expects one arrival per directly attached child.
#[derive(Debug)]
pub struct Combining {
    groups: Arena<CachePadded<Group>>,
    /// Arena slots handed out so far; slot 0 is the seed root.
    registered: Mutex<usize>,
}

/// Token naming a registered group. Copy it to every thread of the group.
#[derive(Debug, Clone, Copy)]
pub struct CombiningGroup(usize);

/// Per-thread state for a [`Combining`] barrier.
#[derive(Debug)]
pub struct CombiningState {
    sense: u32,
}

impl Default for CombiningState {
    /// Group senses start at 0 and each episode flips them in place, so the
    /// first episode's expected sense is all-ones.
    fn default() -> Self {
        Self { sense: !0 }
    }
}

impl Combining {
    /// Create a barrier with room for `capacity` nodes, including the seed
    /// root. `capacity` bounds the number of [`register`] calls to
    /// `capacity - 1`.
    ///
    /// [`register`]: Self::register
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "capacity must cover at least the seed root");
        Self {
            groups: Arena::from_fn(capacity, |_| CachePadded::new(Group::vacant())),
            registered: Mutex::new(1),
        }
    }

    /// Register a leaf group of `nthr` threads that arrive together as one
    /// logical participant of the parent level.
    ///
    /// The group is attached to the first node found in level order with a
    /// free child link, and that parent's expected-arrival count grows by one
    /// to cover the new subtree. Panics when the arena is full.
    ///
    /// Registering while another group is mid-episode is not supported.
    pub fn register(&self, nthr: u32) -> CombiningGroup {
        let mut registered = self.registered.lock();
        assert!(
            *registered < self.groups.len(),
            "group arena exhausted; raise the capacity passed to Combining::new"
        );
        let slot = *registered;
        *registered += 1;

        let group = &self.groups[slot];
        group.k.store(nthr, Ordering::Relaxed);
        group.count.store(0, Ordering::Relaxed);
        group.sense.store(0, Ordering::Relaxed);
        group.lchild.store(NIL, Ordering::Relaxed);
        group.rchild.store(NIL, Ordering::Relaxed);

        // Level-order traversal: the first node with a free child link
        // becomes the parent.
        let mut queue = VecDeque::new();
        queue.push_back(0);
        while let Some(node) = queue.pop_front() {
            if self.try_insert(node, slot) {
                trace!("group {slot} ({nthr} threads) attached under node {node}");
                return CombiningGroup(slot);
            }

            // Both children exist, otherwise the insert would have landed.
            queue.push_back(self.groups[node].lchild.load(Ordering::Relaxed));
            queue.push_back(self.groups[node].rchild.load(Ordering::Relaxed));
        }

        // The traversal visits every node and a tree of `registered` nodes
        // always has a free link.
        unreachable!("level-order traversal found no free child link");
    }

    /// Attach `child` under `parent` if a link is free. Caller holds the
    /// registration lock.
    fn try_insert(&self, parent: usize, child: usize) -> bool {
        let parent_group = &self.groups[parent];
        let link = if parent_group.lchild.load(Ordering::Relaxed) == NIL {
            &parent_group.lchild
        } else if parent_group.rchild.load(Ordering::Relaxed) == NIL {
            &parent_group.rchild
        } else {
            return false;
        };

        link.store(child, Ordering::Relaxed);
        self.groups[child].parent.store(parent, Ordering::Relaxed);
        // The parent now expects one more arrival per episode; without this
        // the barrier would end before the new subtree reports in.
        parent_group.k.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Block until every registered thread has called [`wait`] for this
    /// episode.
    ///
    /// The group's last arrival carries the arrival up the tree; on the way
    /// back down it clears each node's counter and flips its sense, releasing
    /// the threads spinning there.
    ///
    /// [`wait`]: Self::wait
    pub fn wait(&self, group: CombiningGroup, state: &mut CombiningState) {
        self.arrive(group.0, state.sense);

        // Private sense for the next episode.
        state.sense = !state.sense;
    }

    fn arrive(&self, slot: usize, sense: u32) {
        uassert!(slot < self.groups.len());
        let node = &self.groups[slot];

        // The last thread of the group moves on to the parent group;
        // everyone else spins on this group's sense.
        if node.count.fetch_add(1, Ordering::AcqRel) == node.k.load(Ordering::Relaxed) - 1 {
            let parent = node.parent.load(Ordering::Relaxed);
            if parent != NIL {
                self.arrive(parent, sense);
            }

            // Back from the parent chain: re-arm the counter, then free the
            // threads waiting at this group.
            node.count.store(0, Ordering::Relaxed);
            node.sense
                .store(!node.sense.load(Ordering::Relaxed), Ordering::Release);
        } else {
            while sense != node.sense.load(Ordering::Acquire) {
                spin_loop();
            }
        }
    }
}
