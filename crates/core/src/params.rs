//! GhostRider algorithm parameters
//!
//! Alphabet sizes, slot layout and the heavy-stage memory profile.

/// Number of lightweight core primitives
pub const CORE_COUNT: usize = 15;

/// Number of memory-hard heavy primitives available
pub const HEAVY_COUNT: usize = 6;

/// Heavy primitives selected per sequence
pub const HEAVY_PER_SEQUENCE: usize = 3;

/// Total stages in a sequence (15 core + 3 heavy)
pub const SEQUENCE_LEN: usize = CORE_COUNT + HEAVY_PER_SEQUENCE;

/// Slots holding heavy stages
pub const HEAVY_SLOTS: [usize; HEAVY_PER_SEQUENCE] = [5, 11, 17];

/// Heavy stage ids are stored as heavy alphabet id + this offset
pub const HEAVY_ID_OFFSET: u8 = CORE_COUNT as u8;

/// Bytes of input consumed by the stage selection
pub const SELECTION_BYTES: usize = 32;

/// Offset of the selection bytes inside an 80-byte header (previous block hash)
pub const SELECTION_OFFSET: usize = 4;

/// Logical header length in bytes
pub const HEADER_LEN: usize = 80;

/// Header length in 32-bit words
pub const HEADER_WORDS: usize = HEADER_LEN / 4;

/// Word index of the nonce inside a formatted header
pub const NONCE_WORD: usize = 19;

/// Digest size produced by a full GhostRider hash
pub const DIGEST_SIZE: usize = 32;

/// Chaining state carried between stages
pub const STATE_SIZE: usize = 64;

/// Base scratch requirement per heavy alphabet id, in bytes
pub const HEAVY_BASE_MEMORY: [usize; HEAVY_COUNT] = [
    256 * 1024,
    256 * 1024,
    512 * 1024,
    512 * 1024,
    1024 * 1024,
    2048 * 1024,
];

/// Number of predefined heavy rotations (6 choose 3)
pub const ROTATIONS: usize = 20;

/// Flag combinations tried per rotation while tuning (2^3)
pub const FLAG_COMBOS: usize = 1 << HEAVY_PER_SEQUENCE;

/// Total time budget of a realistic benchmark cycle, in seconds
pub const REALISTIC_CYCLE_SECS: f64 = 300.0;

/// Default length of one tuning segment, in seconds
pub const TUNE_SEGMENT_SECS: f64 = 12.5;

/// Default file the tuned configuration is persisted to
pub const TUNE_FILE: &str = "tune_config";

/// Share target factor applied by the miner for GhostRider
pub const TARGET_FACTOR: f64 = 65536.0;
