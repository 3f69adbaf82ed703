//! Hash kernels and per-worker hashing context
//!
//! A kernel runs the stage sequence held in a [`WorkerContext`] over one or
//! more header lanes. The scalar kernel hashes one lane per call. The
//! four-way kernel hashes four lanes per call and, for heavy stages whose
//! doubling flag is set, runs lanes in pairs over a doubled scratch buffer
//! (one half per lane). Sequencing and scratch sizing are identical for both.

use thiserror::Error;

use crate::memory::{HeavyFlags, ScratchBuffer, ScratchError, heavy_requirement, required_size};
use crate::params::*;
use crate::primitives::{State, core_stage, heavy_stage};
use crate::rotation::TuneTable;
use crate::sequence::{Stage, StageSequence, derive_from_header, derive_sequence};

/// Formatted header: 20 big-endian words, nonce in word 19
pub type HeaderWords = [u32; HEADER_WORDS];

/// Final digest of one lane
pub type Digest = [u8; DIGEST_SIZE];

/// Most lanes any kernel processes per call
pub const MAX_LANES: usize = 4;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("header must be 80 bytes, got {0}")]
    Length(usize),
}

/// Copy raw bytes into a fixed-size header
pub fn parse_header(bytes: &[u8]) -> Result<[u8; HEADER_LEN], HeaderError> {
    bytes.try_into().map_err(|_| HeaderError::Length(bytes.len()))
}

/// Load an 80-byte header as big-endian 32-bit words
pub fn format_header(header: &[u8; HEADER_LEN]) -> HeaderWords {
    let mut words = [0u32; HEADER_WORDS];
    for (word, chunk) in words.iter_mut().zip(header.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

fn header_bytes(words: &HeaderWords) -> [u8; HEADER_LEN] {
    let mut bytes = [0u8; HEADER_LEN];
    for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// State owned by one hashing thread
///
/// Holds the active stage sequence, the active doubling flags and the
/// scratch buffer the heavy stages run in.
#[derive(Debug)]
pub struct WorkerContext {
    id: usize,
    sequence: StageSequence,
    flags: HeavyFlags,
    scratch: ScratchBuffer,
}

impl WorkerContext {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            sequence: derive_sequence(&[0u8; SELECTION_BYTES]),
            flags: [0u8; HEAVY_COUNT],
            scratch: ScratchBuffer::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn sequence(&self) -> &StageSequence {
        &self.sequence
    }

    pub fn flags(&self) -> &HeavyFlags {
        &self.flags
    }

    pub fn scratch_len(&self) -> usize {
        self.scratch.len()
    }

    /// Switch to a new sequence; call `allocate_needed_memory` afterwards
    pub fn set_sequence(&mut self, sequence: StageSequence) {
        self.sequence = sequence;
    }

    /// Switch to new doubling flags; call `allocate_needed_memory` afterwards
    pub fn set_flags(&mut self, flags: HeavyFlags) {
        self.flags = flags;
    }

    /// Adopt the tuned flags matching the active heavy triple
    ///
    /// When no rotation matches, the previous flags stay in effect.
    pub fn select_tuned_config(&mut self, table: &TuneTable) {
        let heavy = self.sequence.heavy_ids();
        match table.lookup(heavy) {
            Some((rotation, flags)) => {
                self.flags = flags;
                if self.id == 0 {
                    log::debug!("config {rotation}: {flags:?}");
                }
            }
            None => {
                if self.id == 0 {
                    log::error!(
                        "could not find any config for heavy stages {} {} {}",
                        heavy[0] + HEAVY_ID_OFFSET,
                        heavy[1] + HEAVY_ID_OFFSET,
                        heavy[2] + HEAVY_ID_OFFSET
                    );
                }
            }
        }
    }

    /// Scratch bytes the active sequence needs under the active flags
    pub fn needed_memory(&self) -> usize {
        required_size(self.sequence.heavy_ids(), &self.flags)
    }

    /// Purge the scratch buffer and allocate what the active configuration needs
    pub fn allocate_needed_memory(&mut self) -> Result<usize, ScratchError> {
        let size = self.needed_memory();
        self.scratch.reallocate(size)?;
        Ok(size)
    }

    /// Install a sequence and flags, then resize scratch for them
    pub fn prepare(
        &mut self,
        sequence: StageSequence,
        flags: HeavyFlags,
    ) -> Result<usize, ScratchError> {
        self.set_sequence(sequence);
        self.set_flags(flags);
        self.allocate_needed_memory()
    }

    /// Scratch slice of at least `size` bytes, allocating on first need
    fn scratch(&mut self, size: usize) -> Result<&mut [u8], ScratchError> {
        if self.scratch.len() < size {
            self.allocate_needed_memory()?;
        }
        Ok(self.scratch.as_mut_slice())
    }
}

/// Hashing back end for the stage sequence
pub trait HashKernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Headers hashed per call
    fn lanes(&self) -> usize;

    /// Hash `inputs` (exactly `lanes()` headers) into `out`
    fn hash(
        &self,
        ctx: &mut WorkerContext,
        inputs: &[HeaderWords],
        out: &mut [Digest],
    ) -> Result<(), ScratchError>;
}

/// Run the active sequence over `inputs`
///
/// With `pair_heavy`, heavy stages whose flag is set process two lanes per
/// pass, each in its own half of a doubled scratch region.
fn run_sequence(
    ctx: &mut WorkerContext,
    inputs: &[HeaderWords],
    out: &mut [Digest],
    pair_heavy: bool,
) -> Result<(), ScratchError> {
    let lanes = inputs.len();
    assert!(lanes <= MAX_LANES && out.len() == lanes, "lane count mismatch");

    let sequence = ctx.sequence;
    let flags = ctx.flags;
    let mut states: [State; MAX_LANES] = [[0u8; STATE_SIZE]; MAX_LANES];

    for (slot, stage) in sequence.iter().enumerate() {
        match stage {
            Stage::Core(id) => {
                for (state, input) in states.iter_mut().zip(inputs) {
                    *state = if slot == 0 {
                        core_stage(id, &header_bytes(input))
                    } else {
                        core_stage(id, state)
                    };
                }
            }
            Stage::Heavy(id) => {
                let base = HEAVY_BASE_MEMORY[id as usize];
                let scratch = ctx.scratch(heavy_requirement(id, &flags))?;
                if pair_heavy && flags[id as usize] == 1 {
                    for pair in states[..lanes].chunks_mut(2) {
                        let (first, second) = scratch[..2 * base].split_at_mut(base);
                        pair[0] = heavy_stage(id, &pair[0], first);
                        if let Some(state) = pair.get_mut(1) {
                            *state = heavy_stage(id, state, second);
                        }
                    }
                } else {
                    for state in &mut states[..lanes] {
                        *state = heavy_stage(id, state, scratch);
                    }
                }
            }
        }
    }

    for (digest, state) in out.iter_mut().zip(&states) {
        digest.copy_from_slice(&state[..DIGEST_SIZE]);
    }
    Ok(())
}

/// One lane per call
#[derive(Debug, Default, Clone, Copy)]
pub struct ScalarKernel;

impl HashKernel for ScalarKernel {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn lanes(&self) -> usize {
        1
    }

    fn hash(
        &self,
        ctx: &mut WorkerContext,
        inputs: &[HeaderWords],
        out: &mut [Digest],
    ) -> Result<(), ScratchError> {
        run_sequence(ctx, inputs, out, false)
    }
}

/// Four lanes per call, heavy stages paired when their flag is set
#[derive(Debug, Default, Clone, Copy)]
pub struct FourWayKernel;

impl HashKernel for FourWayKernel {
    fn name(&self) -> &'static str {
        "4way"
    }

    fn lanes(&self) -> usize {
        4
    }

    fn hash(
        &self,
        ctx: &mut WorkerContext,
        inputs: &[HeaderWords],
        out: &mut [Digest],
    ) -> Result<(), ScratchError> {
        run_sequence(ctx, inputs, out, true)
    }
}

static SCALAR: ScalarKernel = ScalarKernel;
static FOUR_WAY: FourWayKernel = FourWayKernel;

/// Kernel selected at configuration time
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    #[default]
    Scalar,
    FourWay,
}

impl KernelKind {
    pub fn kernel(self) -> &'static dyn HashKernel {
        match self {
            KernelKind::Scalar => &SCALAR,
            KernelKind::FourWay => &FOUR_WAY,
        }
    }
}

/// Hash one 80-byte header with the sequence it selects and base memory
///
/// For repeated hashing prefer a `WorkerContext`, which keeps its scratch
/// buffer between calls.
pub fn hash_header(header: &[u8; HEADER_LEN]) -> Result<Digest, ScratchError> {
    let mut ctx = WorkerContext::new(0);
    ctx.prepare(derive_from_header(header), [0u8; HEAVY_COUNT])?;

    let mut out = [[0u8; DIGEST_SIZE]; 1];
    SCALAR.hash(&mut ctx, &[format_header(header)], &mut out)?;
    Ok(out[0])
}

/// Check a digest against a leading-zero-bits difficulty
#[inline(always)]
pub fn meets_difficulty(hash: &Digest, difficulty: u32) -> bool {
    let mut zero_bits = 0u32;

    for byte in hash.iter() {
        if *byte == 0 {
            zero_bits += 8;
        } else {
            zero_bits += byte.leading_zeros();
            break;
        }
    }

    zero_bits >= difficulty
}
