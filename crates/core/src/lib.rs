//! # GhostRider Core
//!
//! Orchestration core of the GhostRider multi-algorithm proof-of-work:
//! which primitives run, in what order, with how much memory, and which
//! memory mode is fastest on this machine.
//!
//! ## Stage sequence
//!
//! 32 bytes of the block header select an 18-stage chain:
//!
//! ```text
//! slot:  0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15 16 17
//!        c  c  c  c  c  H  c  c  c  c  c  H  c  c  c  c  c  H
//! ```
//!
//! `c` is one of 15 core primitives (each used exactly once) and `H` one
//! of 6 memory-hard heavy primitives (three distinct ones per sequence).
//!
//! ## Memory
//!
//! Heavy primitives need 256 KB to 2 MB of scratch. Each may run in
//! doubled mode (two lanes at once, twice the memory). The scratch buffer
//! is sized to the largest requirement of the active heavy triple.
//!
//! ## Tuning
//!
//! There are 20 possible heavy triples ("rotations"). The auto-tuner
//! measures all 8 doubling combinations per rotation across a pool of
//! worker threads held in lock-step by barriers, and writes the winners to
//! a plain text file the miner loads on later runs.
//!
//! ## Example
//!
//! ```rust
//! use ghostrider_core::{derive_sequence, required_size};
//!
//! let sequence = derive_sequence(&[0u8; 32]);
//! assert_eq!(sequence.heavy_ids(), [0, 1, 2]);
//! assert_eq!(required_size(sequence.heavy_ids(), &[0; 6]), 512 * 1024);
//! ```

mod barrier;
pub mod bench;
mod kernel;
mod memory;
mod params;
mod primitives;
mod rotation;
mod sequence;

pub use barrier::PhaseBarrier;
pub use kernel::{
    Digest, FourWayKernel, HashKernel, HeaderError, HeaderWords, KernelKind, MAX_LANES,
    ScalarKernel, WorkerContext, format_header, hash_header, meets_difficulty, parse_header,
};
pub use memory::{HeavyFlags, ScratchBuffer, ScratchError, heavy_requirement, required_size};
pub use params::*;
pub use rotation::{ROTATION_TABLE, Rotation, TuneError, TuneTable, combo_flags};
pub use sequence::{Stage, StageSequence, derive_from_header, derive_sequence};
