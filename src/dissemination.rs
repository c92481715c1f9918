//! Dissemination barrier.
//!
//! All-to-all signaling in `ceil(log2(N))` rounds: in round `k` thread `i`
//! signals thread `(i + 2^k) mod N` and waits to be signaled itself. There is
//! no central hotspot and every spin is on a thread-private flag word.
//!
//! Two flag sets alternate between successive episodes so a fast thread
//! entering the next episode cannot overwrite a flag a slow thread is still
//! observing; the sense therefore only inverts every second episode, when the
//! parity wraps back to 0.

use crate::arena::Arena;
use crate::bits;
use crate::macros::{trace, uassert};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};
use crossbeam_utils::CachePadded;

/// Shared state of a dissemination barrier: per-thread, parity-indexed flag
/// arrays plus the static partner table.
#[derive(Debug)]
pub struct Dissemination {
    nthr: u32,
    rounds: u32,
    /// Round-k partner of thread i, at `i * rounds + k`.
    partners: Arena<u32>,
    /// Flag thread i spins on in round k of a parity-p episode, at
    /// `i * 2 * rounds + p * rounds + k`.
    flags: Arena<CachePadded<AtomicU32>>,
    next_id: AtomicU32,
}

/// Per-thread state for a [`Dissemination`] barrier.
#[derive(Debug)]
pub struct DisseminationState {
    parity: u32,
    sense: u32,
    tid: u32,
}

impl Dissemination {
    /// Build the topology for `nthr` threads: partner links for every round
    /// and cleared flags for both parities.
    pub fn new(nthr: u32) -> Self {
        assert!(nthr >= 1, "a barrier needs at least one participant");
        let rounds = bits::log2(bits::next_pow2(nthr));

        // Partners are chosen such that by the completion of the barrier,
        // every thread has been directly or indirectly signaled by every
        // other thread. Power-of-two thread counts take the mask path.
        let partners = Arena::from_fn((nthr * rounds) as usize, |idx| {
            let i = idx as u32 / rounds;
            let k = idx as u32 % rounds;
            let offset = 1u32 << k;
            if nthr.is_power_of_two() {
                (i + offset) & (nthr - 1)
            } else {
                (i + offset) % nthr
            }
        });
        let flags = Arena::from_fn(
            Self::size(nthr) as usize * nthr as usize,
            |_| CachePadded::new(AtomicU32::new(0)),
        );

        trace!("dissemination topology: {nthr} threads, {rounds} rounds");
        Self {
            nthr,
            rounds,
            partners,
            flags,
            next_id: AtomicU32::new(0),
        }
    }

    /// Number of flag slots each thread carries across both parities.
    pub fn size(nthr: u32) -> u32 {
        bits::log2(bits::next_pow2(nthr)) * 2
    }

    /// Hand out per-thread state with the next dense virtual thread id.
    ///
    /// Call exactly once per participating thread.
    pub fn make_state(&self) -> DisseminationState {
        let tid = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug_assert!(tid < self.nthr, "more states than declared threads");
        DisseminationState {
            parity: 0,
            sense: !0,
            tid,
        }
    }

    #[inline]
    fn flag(&self, tid: u32, parity: u32, round: u32) -> &AtomicU32 {
        let idx = (tid * 2 * self.rounds + parity * self.rounds + round) as usize;
        uassert!(idx < self.flags.len());
        &self.flags[idx]
    }

    /// Block until every participant has called [`wait`] for this episode.
    ///
    /// [`wait`]: Self::wait
    pub fn wait(&self, state: &mut DisseminationState) {
        for round in 0..self.rounds {
            let idx = (state.tid * self.rounds + round) as usize;
            uassert!(idx < self.partners.len());
            let partner = self.partners[idx];

            // Unblock the current partner.
            self.flag(partner, state.parity, round)
                .store(state.sense, Ordering::Release);

            // Wait until some other thread unblocks this one.
            while self.flag(state.tid, state.parity, round).load(Ordering::Acquire) != state.sense
            {
                spin_loop();
            }
        }

        // The other flag set serves the next episode; the sense only turns
        // over once both sets have been consumed.
        if state.parity == 1 {
            state.sense = !state.sense;
        }
        state.parity = 1 - state.parity;
    }
}
