//! # firstfit - A First-Fit Heap Allocator
//!
//! This crate provides a single-threaded **first-fit allocator** that lays a
//! doubly linked list of blocks over one contiguous region, growing and
//! shrinking that region only at its high end (the program break, by default).
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   base                                                            end
//!   ┌────────┬──────────┬────────┬──────┬────────┬────────────────┐
//!   │ header │ payload  │ header │ free │ header │    payload     │
//!   │ (16 B) │ (taken)  │ (16 B) │      │ (16 B) │    (taken)     │
//!   └────────┴──────────┴────────┴──────┴────────┴────────────────┘
//!   ▲ head                                ▲ tail
//!
//!   Blocks tile the region with no gaps. Every block knows its neighbours
//!   by header offset, so walking the list is walking the region.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   firstfit
//!   ├── align      - Payload rounding (align!, round_request)
//!   ├── block      - On-region block header and state
//!   ├── region     - Region trait, SbrkRegion, FixedRegion
//!   ├── heap       - Heap: allocate / release
//!   └── inspect    - Block walking, dumps and invariant checks
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use firstfit::{FixedRegion, Heap, Region};
//!
//! let mut heap = Heap::new(FixedRegion::with_capacity(4096));
//!
//! let ptr = heap.allocate(8).unwrap().cast::<u64>();
//!
//! unsafe {
//!     ptr.write(42);
//!     assert_eq!(ptr.read(), 42);
//!
//!     heap.release(Some(ptr.cast()));
//! }
//!
//! assert_eq!(heap.region().len(), 0);
//! ```
//!
//! ## How It Works
//!
//! `allocate` rounds the request up to a multiple of 8 bytes (16 at least)
//! and walks the list from the head, taking the first free block that is big
//! enough:
//!
//! ```text
//!   Splitting a free block for a 40 byte request:
//!
//!   ┌────┬───────────── 80 ─────────────┐
//!   │ H  │            free                │
//!   └────┴────────────────────────────────┘
//!                    │
//!                    ▼
//!   ┌────┬──── 40 ────┬────┬──── 24 ────┐
//!   │ H  │   taken    │ H  │    free    │
//!   └────┴────────────┴────┴────────────┘
//! ```
//!
//! The excess is split off only when it can hold a header plus a 16 byte
//! payload. When no free block fits, the region is extended by exactly one
//! header plus the rounded size.
//!
//! `release` marks the block free, merges it with a free predecessor and a
//! free successor, and if the merged block is the last one, hands it back
//! to the region:
//!
//! ```text
//!   Releasing B:
//!
//!   [F A][T B][F C][T D]  ──►  [F A+B+C][T D]
//!
//!   Releasing D afterwards:
//!
//!   [F A+B+C][T D]  ──►  (empty, region end back at base)
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **No validation**: Double frees and foreign pointers are not detected
//! - **One region per heap**: Memory only returns to the OS from the tail
//! - **Unix-only** for [`SbrkRegion`]: Requires `libc` and `sbrk`
//!
//! ## Logging
//!
//! Decisions are reported through the [`log`] facade: `trace` for searches,
//! splits and merges, `debug` for region growth and block dumps, `warn` and
//! `error` for failed growth and out-of-range releases.

pub mod align;
mod block;
mod heap;
mod inspect;
mod region;

pub use block::{HEADER_SIZE, State};
pub use heap::Heap;
pub use inspect::{BlockInfo, Blocks, Corruption};
pub use region::{FixedRegion, Region, RegionError, SbrkRegion};
