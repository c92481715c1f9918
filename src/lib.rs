//! Scalable sense-reversing spin barriers.
//!
//! This crate provides five barrier algorithms that block a set of cooperating
//! threads until all of them have arrived, then release them together. All five
//! are built for the inside of high-performance parallel programs: the wait
//! paths are lock-free, allocation-free, and spin with [`core::hint::spin_loop`]
//! rather than ever descheduling. Each algorithm trades bus traffic, spin
//! locality, and arrival latency differently:
//!
//! - [`Centralized`]: one shared counter and sense word. Minimal setup,
//!   all threads spin on one cache line; best at low thread counts.
//! - [`Combining`]: a software combining tree. Thread groups combine their
//!   arrivals so no counter is shared beyond its group; groups can be
//!   registered incrementally.
//! - [`Dissemination`]: `O(log N)` rounds of pairwise signaling with no
//!   central hotspot and no designated releaser.
//! - [`Tournament`]: statically assigned per-round roles; every thread spins
//!   only on its own cache-padded flag, which scales well on NUMA parts.
//! - [`Mcs`]: a 4-ary arrival tree paired with a binary release tree; all
//!   spinning is node-local.
//!
//! Every barrier is reusable: arrival is encoded by a sense word inverted
//! between episodes, so calling `wait` again re-arms the barrier without any
//! reset step.
//!
//! # Usage
//!
//! ```rust
//! use spin_barriers::{Centralized, CentralizedState};
//! use std::thread;
//!
//! let barrier = Centralized::new();
//! thread::scope(|s| {
//!     for _ in 0..4 {
//!         s.spawn(|| {
//!             let mut state = CentralizedState::default();
//!             for _ in 0..100 {
//!                 // ... produce this phase's data ...
//!                 barrier.wait(&mut state, 4);
//!                 // ... every thread's phase data is now visible ...
//!             }
//!         });
//!     }
//! });
//! ```
//!
//! # Warning
//!
//! These are busy-wait primitives with documented preconditions instead of a
//! recoverable error surface. Fewer participants than declared deadlocks; more
//! races the release; per-thread state must be created exactly once per
//! participating thread and never shared across barrier instances. Oversubscribing
//! the machine (more spinning threads than cores) degrades all five algorithms.
//!
//! # Memory ordering
//!
//! A `wait` return is an all-to-all happens-before edge: every write a
//! participant performed before entering `wait` is visible to every
//! participant after its own `wait` returns. Internally, arrival counters use
//! acquire-release read-modify-writes, release flags are published with
//! release stores, and waiters spin with acquire loads.

mod arena;
mod bits;
mod macros;

pub mod centralized;
pub mod combining;
pub mod dissemination;
pub mod mcs;
pub mod tournament;

pub use centralized::{Centralized, CentralizedState};
pub use combining::{Combining, CombiningGroup, CombiningState};
pub use dissemination::{Dissemination, DisseminationState};
pub use mcs::{Mcs, McsState};
pub use tournament::{Role, Tournament, TournamentState};
