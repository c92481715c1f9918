//! MCS tree barrier.
//!
//! Arrival climbs a 4-ary tree: each node waits for its arrival children,
//! re-arms its child flags for the next episode, then reports to its arrival
//! parent. Release descends a separate binary tree rooted at thread 0. Every
//! spin target is a dedicated word in the spinning thread's own node, so the
//! barrier generates no remote spinning traffic.

use crate::arena::Arena;
use crate::macros::{trace, uassert};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};
use crossbeam_utils::CachePadded;

/// One per-thread tree node.
#[derive(Debug)]
struct Node {
    /// All-ones for each 4-ary arrival child that exists; constant after init.
    havechild: [u32; 4],
    /// Cleared slot by slot as arrival children report in; re-armed from
    /// `havechild` by this node itself at the start of each episode.
    childnotready: [AtomicU32; 4],
    /// The word this thread spins on waiting for release from its binary
    /// parent.
    parentsense: AtomicU32,
    /// Scratch word absorbing the stores a root or leaf has no real target
    /// for.
    dummy: AtomicU32,
    /// `(node, slot)` of the `childnotready` entry this node must clear in
    /// its arrival parent; the root has none and writes its dummy instead.
    parent: Option<(usize, usize)>,
    /// Arena indices of the binary release children; absent children resolve
    /// to the dummy.
    children: [Option<usize>; 2],
}

/// Shared state of an MCS tree barrier.
#[derive(Debug)]
pub struct Mcs {
    nodes: Arena<CachePadded<Node>>,
    next_id: AtomicU32,
    nthr: u32,
}

/// Per-thread state for an [`Mcs`] barrier.
#[derive(Debug)]
pub struct McsState {
    sense: u32,
    vpid: u32,
}

impl Mcs {
    /// Build the 4-ary arrival tree and binary release tree for `nthr`
    /// threads.
    pub fn new(nthr: u32) -> Self {
        assert!(nthr >= 1, "a barrier needs at least one participant");
        let n = nthr as usize;

        let nodes = Arena::from_fn(n, |i| {
            // Child j of node i covers thread 4i + j + 1.
            let havechild: [u32; 4] =
                core::array::from_fn(|j| if (i << 2) + j < n - 1 { !0 } else { 0 });
            // Initialized to havechild so a thread never waits for a child
            // that does not exist.
            let childnotready: [AtomicU32; 4] =
                core::array::from_fn(|j| AtomicU32::new(havechild[j]));

            let parent = (i != 0).then(|| ((i - 1) >> 2, (i - 1) & 3));
            let children: [Option<usize>; 2] = core::array::from_fn(|c| {
                let child = (i << 1) + c + 1;
                (child < n).then_some(child)
            });

            CachePadded::new(Node {
                havechild,
                childnotready,
                parentsense: AtomicU32::new(0),
                dummy: AtomicU32::new(0),
                parent,
                children,
            })
        });

        trace!("mcs topology: {nthr} threads");
        Self {
            nodes,
            next_id: AtomicU32::new(0),
            nthr,
        }
    }

    /// Hand out per-thread state with the next dense virtual thread id.
    ///
    /// Call exactly once per participating thread.
    pub fn make_state(&self) -> McsState {
        let vpid = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug_assert!(vpid < self.nthr, "more states than declared threads");
        McsState { sense: !0, vpid }
    }

    /// Block until every participant has called [`wait`] for this episode.
    ///
    /// [`wait`]: Self::wait
    pub fn wait(&self, state: &mut McsState) {
        uassert!((state.vpid as usize) < self.nodes.len());
        let node = &self.nodes[state.vpid as usize];

        // Wait until all arrival children have reached the barrier and are
        // done waiting for their own children.
        while !node
            .childnotready
            .iter()
            .all(|slot| slot.load(Ordering::Acquire) == 0)
        {
            spin_loop();
        }

        // Re-arm before reporting upward: a child only reaches its next
        // episode after the release below, which is ordered after this store.
        for (slot, have) in node.childnotready.iter().zip(node.havechild) {
            slot.store(have, Ordering::Relaxed);
        }

        // Report this whole subtree to the arrival parent.
        match node.parent {
            Some((parent, slot)) => {
                self.nodes[parent].childnotready[slot].store(0, Ordering::Release)
            }
            None => node.dummy.store(0, Ordering::Release),
        }

        // The root's arrival is the last; everyone else waits for the release
        // wave coming down the binary tree.
        if state.vpid != 0 {
            while node.parentsense.load(Ordering::Acquire) != state.sense {
                spin_loop();
            }
        }

        for child in node.children {
            match child {
                Some(child) => self.nodes[child]
                    .parentsense
                    .store(state.sense, Ordering::Release),
                None => node.dummy.store(state.sense, Ordering::Relaxed),
            }
        }

        state.sense = !state.sense;
    }
}
