//! Centralized counting barrier.
//!
//! A single shared arrival counter plus a shared sense word. The cheapest
//! barrier to set up and the right choice at low thread counts; every waiter
//! spins on the same cache line, so it does not scale the way the tree and
//! round-based barriers in this crate do.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};
use crossbeam_utils::CachePadded;

/// Shared state of a centralized barrier.
///
/// Reusable across an unbounded sequence of episodes with no reset step: the
/// last arrival of each episode clears the counter before it publishes the new
/// sense.
#[derive(Debug)]
pub struct Centralized {
    value: CachePadded<AtomicU32>,
    sense: CachePadded<AtomicU32>,
}

/// Per-thread state for a [`Centralized`] barrier.
///
/// Each participating thread owns exactly one of these per barrier instance.
/// Reusing one state across two barrier instances desynchronizes the sense
/// tracking and deadlocks.
#[derive(Debug, Default)]
pub struct CentralizedState {
    sense: u32,
}

impl Default for Centralized {
    fn default() -> Self {
        Self::new()
    }
}

impl Centralized {
    pub const fn new() -> Self {
        Self {
            value: CachePadded::new(AtomicU32::new(0)),
            sense: CachePadded::new(AtomicU32::new(0)),
        }
    }

    /// Block until `n_threads` threads have called [`wait`] for this episode.
    ///
    /// The last arrival resets the counter and publishes the flipped sense,
    /// releasing every spinning waiter at once. `n_threads` must be the same
    /// at every call site for the lifetime of the barrier; fewer participants
    /// than `n_threads` deadlocks, more races the release.
    ///
    /// [`wait`]: Self::wait
    pub fn wait(&self, state: &mut CentralizedState, n_threads: u32) {
        state.sense = !state.sense;
        let sense = state.sense;

        let value = self.value.fetch_add(1, Ordering::AcqRel);
        if value == n_threads - 1 {
            // Counter reset must be visible before the new sense: waiters of
            // the next episode load the sense with acquire and must then see
            // an already-cleared counter.
            self.value.store(0, Ordering::Relaxed);
            self.sense.store(sense, Ordering::Release);
            return;
        }

        while sense != self.sense.load(Ordering::Acquire) {
            spin_loop();
        }
    }
}
