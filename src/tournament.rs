//! Tournament barrier.
//!
//! Threads are statically assigned roles to perform for each round. Winners
//! move on to the next round while losers spin in their current round on
//! their own flags; in the last round the champion sets the flag that begins
//! the wakeup pass back down the rounds. Roles are fixed at topology init, so
//! the wait path has no runtime coordination and every spin is on the
//! thread's own cache-padded flag.

use crate::arena::Arena;
use crate::bits;
use crate::macros::{trace, uassert, uunreachable};
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};
use crossbeam_utils::CachePadded;

/// Static per-round role of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The pair for this round is incomplete; pass through.
    Bye,
    /// Winner of the final round; starts the wakeup pass.
    Champion,
    /// Round-0 sentinel marking every thread's home row during wakeup.
    Dropout,
    /// Signals the round's winner, then waits out the tournament.
    Loser,
    /// Waits for the round's loser, then advances.
    Winner,
}

/// One slot of the role/opponent table.
#[derive(Debug)]
struct Round {
    role: Role,
    /// Flat index of the opponent's slot in the same round.
    opponent: usize,
    flag: AtomicU32,
}

/// Shared state of a tournament barrier: the static role table and its flags.
#[derive(Debug)]
pub struct Tournament {
    nthr: u32,
    /// Rounds per thread, including the round-0 dropout row.
    rounds_per_thread: u32,
    /// Slot of thread i at round k, at `i * rounds_per_thread + k`.
    rounds: Arena<CachePadded<Round>>,
    next_id: AtomicU32,
}

/// Per-thread state for a [`Tournament`] barrier.
#[derive(Debug)]
pub struct TournamentState {
    sense: u32,
    vpid: u32,
}

impl Tournament {
    /// Number of rounds each thread carries, including the dropout row.
    pub fn size(nthr: u32) -> u32 {
        bits::log2(bits::next_pow2(nthr)) + 1
    }

    /// Build the static role and opponent table for `nthr` threads.
    pub fn new(nthr: u32) -> Self {
        assert!(nthr >= 1, "a barrier needs at least one participant");
        let size = Self::size(nthr);
        let flat = |i: u32, k: u32| (i * size + k) as usize;

        let rounds = Arena::from_fn((nthr * size) as usize, |idx| {
            let i = idx as u32 / size;
            let k = idx as u32 % size;

            // The first role is always DROPOUT; a thread reaching round k in
            // the arrival pass has won every pairing below it, so only the
            // residues 0 and 2^(k-1) mod 2^k are ever visited. The remaining
            // slots get BYE, which both passes skip, making the table total.
            let (role, opponent) = if k == 0 {
                (Role::Dropout, 0)
            } else {
                let twok = 1u32 << k;
                let twokm1 = twok >> 1;
                let imod2k = i & (twok - 1);
                if imod2k == 0 {
                    if i + twokm1 < nthr && twok < nthr {
                        (Role::Winner, flat(i + twokm1, k))
                    } else if i + twokm1 >= nthr {
                        (Role::Bye, 0)
                    } else {
                        // There is exactly one champion: thread 0 in the
                        // first round whose bracket covers every thread.
                        debug_assert!(i == 0 && twok >= nthr);
                        (Role::Champion, flat(i + twokm1, k))
                    }
                } else if imod2k == twokm1 {
                    (Role::Loser, flat(i - twokm1, k))
                } else {
                    (Role::Bye, 0)
                }
            };

            CachePadded::new(Round {
                role,
                opponent,
                flag: AtomicU32::new(0),
            })
        });

        trace!("tournament topology: {nthr} threads, {size} rounds");
        Self {
            nthr,
            rounds_per_thread: size,
            rounds,
            next_id: AtomicU32::new(0),
        }
    }

    /// Hand out per-thread state with the next dense virtual thread id.
    ///
    /// Call exactly once per participating thread.
    pub fn make_state(&self) -> TournamentState {
        let vpid = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug_assert!(vpid < self.nthr, "more states than declared threads");
        TournamentState { sense: !0, vpid }
    }

    #[inline]
    fn slot(&self, vpid: u32, round: u32) -> &Round {
        let idx = (vpid * self.rounds_per_thread + round) as usize;
        uassert!(idx < self.rounds.len());
        &self.rounds[idx]
    }

    /// Block until every participant has called [`wait`] for this episode.
    ///
    /// [`wait`]: Self::wait
    pub fn wait(&self, state: &mut TournamentState) {
        let mut round = 1;

        // Arrival pass: ascend until this thread loses its pairing or wins
        // the whole tournament. A single-thread table has no rounds to play.
        while round < self.rounds_per_thread {
            let slot = self.slot(state.vpid, round);
            match slot.role {
                Role::Bye => {}
                Role::Winner => {
                    // The loser of this pairing announces its subtree, then
                    // this thread carries both to the next round.
                    while slot.flag.load(Ordering::Acquire) != state.sense {
                        spin_loop();
                    }
                }
                Role::Loser => {
                    self.rounds[slot.opponent]
                        .flag
                        .store(state.sense, Ordering::Release);
                    while slot.flag.load(Ordering::Acquire) != state.sense {
                        spin_loop();
                    }
                    break;
                }
                Role::Champion => {
                    while slot.flag.load(Ordering::Acquire) != state.sense {
                        spin_loop();
                    }
                    self.rounds[slot.opponent]
                        .flag
                        .store(state.sense, Ordering::Release);
                    break;
                }
                Role::Dropout => uunreachable!(),
            }
            round += 1;
        }

        // Wakeup pass: descend, re-releasing each old opponent, until the
        // round-0 home row drops this thread out of the episode.
        loop {
            round -= 1;
            let slot = self.slot(state.vpid, round);
            match slot.role {
                Role::Dropout => break,
                Role::Winner => {
                    self.rounds[slot.opponent]
                        .flag
                        .store(state.sense, Ordering::Release);
                }
                Role::Bye => {}
                Role::Loser | Role::Champion => uunreachable!(),
            }
        }

        state.sense = !state.sense;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn role_table_for_five_threads() {
        let barrier = Tournament::new(5);
        assert_eq!(barrier.rounds_per_thread, 4);
        let role = |i: u32, k: u32| barrier.slot(i, k).role;

        for i in 0..5 {
            assert_eq!(role(i, 0), Role::Dropout);
        }

        // Round 1 pairs (0,1) and (2,3); 4 has no partner.
        assert_eq!(role(0, 1), Role::Winner);
        assert_eq!(role(1, 1), Role::Loser);
        assert_eq!(role(2, 1), Role::Winner);
        assert_eq!(role(3, 1), Role::Loser);
        assert_eq!(role(4, 1), Role::Bye);

        // Round 2 pairs (0,2); 4 still has no partner.
        assert_eq!(role(0, 2), Role::Winner);
        assert_eq!(role(2, 2), Role::Loser);
        assert_eq!(role(4, 2), Role::Bye);

        // Round 3: thread 0's bracket covers all five threads.
        assert_eq!(role(0, 3), Role::Champion);
        assert_eq!(role(4, 3), Role::Loser);

        let champions = (0..5)
            .flat_map(|i| (0..4).map(move |k| (i, k)))
            .filter(|&(i, k)| role(i, k) == Role::Champion)
            .count();
        assert_eq!(champions, 1);
    }

    #[test]
    fn loser_opponents_point_at_their_winners() {
        let barrier = Tournament::new(5);
        let size = barrier.rounds_per_thread;
        let flat = |i: u32, k: u32| (i * size + k) as usize;

        assert_eq!(barrier.slot(1, 1).opponent, flat(0, 1));
        assert_eq!(barrier.slot(3, 1).opponent, flat(2, 1));
        assert_eq!(barrier.slot(2, 2).opponent, flat(0, 2));
        assert_eq!(barrier.slot(4, 3).opponent, flat(0, 3));
        // The champion releases the final loser.
        assert_eq!(barrier.slot(0, 3).opponent, flat(4, 3));
    }

    #[test]
    fn single_thread_never_spins() {
        let barrier = Tournament::new(1);
        assert_eq!(barrier.rounds_per_thread, 1);
        let mut state = barrier.make_state();
        for _ in 0..1000 {
            barrier.wait(&mut state);
        }
    }

    #[test]
    fn rearms_across_many_episodes() {
        #[cfg(miri)]
        const EPISODES: u32 = 200;
        #[cfg(not(miri))]
        const EPISODES: u32 = 200_000;

        for nthr in [2u32, 5, 8] {
            let barrier = Tournament::new(nthr);
            thread::scope(|s| {
                for _ in 0..nthr {
                    let barrier = &barrier;
                    s.spawn(move || {
                        let mut state = barrier.make_state();
                        for _ in 0..EPISODES {
                            barrier.wait(&mut state);
                        }
                    });
                }
            });
        }
    }

    #[test]
    fn rearms_a_million_episodes() {
        #[cfg(miri)]
        const EPISODES: u32 = 500;
        #[cfg(not(miri))]
        const EPISODES: u32 = 1_000_000;

        let barrier = Tournament::new(2);
        thread::scope(|s| {
            for _ in 0..2 {
                let barrier = &barrier;
                s.spawn(move || {
                    let mut state = barrier.make_state();
                    for _ in 0..EPISODES {
                        barrier.wait(&mut state);
                    }
                });
            }
        });
    }

    #[test]
    fn stress_sixteen_threads() {
        const N: u32 = 16;
        const EPISODES: u32 = if cfg!(miri) { 100 } else { 100_000 };

        let barrier = Tournament::new(N);
        thread::scope(|s| {
            for _ in 0..N {
                let barrier = &barrier;
                s.spawn(move || {
                    let mut state = barrier.make_state();
                    for _ in 0..EPISODES {
                        barrier.wait(&mut state);
                    }
                });
            }
        });
    }

    #[test]
    fn sense_alternates_per_episode() {
        let barrier = Tournament::new(2);
        thread::scope(|s| {
            for _ in 0..2 {
                let barrier = &barrier;
                s.spawn(move || {
                    let mut state = barrier.make_state();
                    barrier.wait(&mut state);
                    assert_eq!(state.sense, 0);
                    barrier.wait(&mut state);
                    assert_eq!(state.sense, !0);
                });
            }
        });
    }

    #[test]
    fn publishes_writes_from_before_the_barrier() {
        const N: usize = 5;
        const EPISODES: u32 = if cfg!(miri) { 50 } else { 10_000 };

        let barrier = Tournament::new(N as u32);
        let published: Vec<CachePadded<AtomicU32>> =
            (0..N).map(|_| CachePadded::new(AtomicU32::new(0))).collect();

        thread::scope(|s| {
            for tid in 0..N {
                let barrier = &barrier;
                let published = &published;
                s.spawn(move || {
                    let mut state = barrier.make_state();
                    for episode in 1..=EPISODES {
                        published[tid].store(episode, Ordering::Relaxed);
                        barrier.wait(&mut state);
                        for word in published {
                            assert_eq!(word.load(Ordering::Relaxed), episode);
                        }
                        barrier.wait(&mut state);
                    }
                });
            }
        });
    }
}
