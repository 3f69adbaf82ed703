//! Reference stage bodies
//!
//! These stand in for the GhostRider core and heavy primitives so the
//! orchestration can be executed and measured. Core stages are cheap
//! compressions of the 64-byte chaining state; heavy stages fill a region
//! of the scratch buffer and walk it with data-dependent reads and writes
//! (alternating SHA-256 compression and AES rounds), with work
//! proportional to the region size.

use aes::Block;
use aes::hazmat::cipher_round;
use sha2::{Digest, Sha256};

use crate::params::{HEAVY_BASE_MEMORY, STATE_SIZE};

/// Chaining state passed from stage to stage
pub type State = [u8; STATE_SIZE];

/// Bytes per scratch block touched by the heavy walk
const BLOCK_SIZE: usize = 64;

/// Walk steps per KB of heavy-stage memory
const STEPS_PER_KB: usize = 1;

/// Mixing constant for address derivation
const MIXING_CONSTANT: u64 = 0x517cc1b727220a95;

const CORE_CONTEXT: &str = "ghostrider 2021 core stage";
const HEAVY_CONTEXT: &str = "ghostrider 2021 heavy stage";

/// Four AES rounds with a single round key
#[inline(always)]
pub fn aes_expand_block(state: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let mut block = Block::clone_from_slice(state);
    let round_key = Block::clone_from_slice(key);
    for _ in 0..4 {
        cipher_round(&mut block, &round_key);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&block);
    out
}

/// Raw SHA-256 compression of one 64-byte block into a 32-byte state
#[inline(always)]
pub fn sha256_compress(state: &[u8; 32], block: &[u8; BLOCK_SIZE]) -> [u8; 32] {
    let mut words = [0u32; 8];
    for (word, chunk) in words.iter_mut().zip(state.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    sha2::compress256(&mut words, &[(*block).into()]);

    let mut out = [0u8; 32];
    for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// Fold arbitrary-length input into a chaining state
fn absorb(input: &[u8]) -> State {
    let mut state = [0u8; STATE_SIZE];
    for (i, byte) in input.iter().enumerate() {
        state[i % STATE_SIZE] ^= byte.rotate_left((i / STATE_SIZE) as u32);
    }
    state
}

/// Core stage `id` (0..=14)
///
/// Stages cycle through three families by `id % 3`: keyed BLAKE3, SHA-256
/// and an AES round chain, each domain-separated by the stage id.
pub fn core_stage(id: u8, input: &[u8]) -> State {
    let mut out = [0u8; STATE_SIZE];
    match id % 3 {
        0 => {
            let mut hasher = blake3::Hasher::new_derive_key(CORE_CONTEXT);
            hasher.update(&[id]);
            hasher.update(input);
            hasher.finalize_xof().fill(&mut out);
        }
        1 => {
            for (half, chunk) in out.chunks_exact_mut(32).enumerate() {
                let digest = Sha256::new()
                    .chain_update([id, half as u8])
                    .chain_update(input)
                    .finalize();
                chunk.copy_from_slice(&digest);
            }
        }
        _ => {
            let state = absorb(input);
            for lane in 0..4 {
                let mut block = [0u8; 16];
                let mut key = [0u8; 16];
                block.copy_from_slice(&state[lane * 16..lane * 16 + 16]);
                key.copy_from_slice(&state[((lane + 1) % 4) * 16..((lane + 1) % 4) * 16 + 16]);
                key[0] ^= id;
                let mixed = aes_expand_block(&block, &key);
                out[lane * 16..lane * 16 + 16].copy_from_slice(&mixed);
            }
        }
    }
    out
}

/// Fill `scratch` from the BLAKE3 output stream of a 32-byte seed
fn fill_scratch(scratch: &mut [u8], seed: &[u8; 32]) {
    blake3::Hasher::new_keyed(seed).finalize_xof().fill(scratch);
}

/// Block offset for walk step `step`
#[inline(always)]
fn walk_address(state: &[u8; 32], step: usize, mask: usize) -> usize {
    let lo = u64::from_le_bytes(state[..8].try_into().unwrap_or_default());
    let hi = u64::from_le_bytes(state[8..16].try_into().unwrap_or_default());
    let step = step as u64;
    let mixed = lo ^ hi ^ step.rotate_left(13) ^ step.wrapping_mul(MIXING_CONSTANT);
    ((mixed as usize) & mask) * BLOCK_SIZE
}

/// Heavy stage `id` (0..=5) over `scratch`
///
/// Uses exactly the first `HEAVY_BASE_MEMORY[id]` bytes of `scratch`.
pub fn heavy_stage(id: u8, input: &State, scratch: &mut [u8]) -> State {
    let memory = HEAVY_BASE_MEMORY[id as usize];
    let region = &mut scratch[..memory];

    let mut seed = [0u8; 32];
    let mut hasher = blake3::Hasher::new_derive_key(HEAVY_CONTEXT);
    hasher.update(&[id]);
    hasher.update(input);
    hasher.finalize_xof().fill(&mut seed);

    fill_scratch(region, &seed);

    let mask = memory / BLOCK_SIZE - 1;
    let mut state = seed;
    for step in 0..(memory / 1024) * STEPS_PER_KB {
        let addr = walk_address(&state, step, mask);
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(&region[addr..addr + BLOCK_SIZE]);

        state = if step % 2 == 0 {
            sha256_compress(&state, &block)
        } else {
            let mut lo = [0u8; 16];
            let mut key = [0u8; 16];
            lo.copy_from_slice(&state[..16]);
            key.copy_from_slice(&block[..16]);
            let mut next = state;
            next[..16].copy_from_slice(&aes_expand_block(&lo, &key));
            next
        };

        // Write back to the block that was read
        region[addr..addr + 32].copy_from_slice(&state);
    }

    let mut out = [0u8; STATE_SIZE];
    let mut hasher = blake3::Hasher::new_derive_key(HEAVY_CONTEXT);
    hasher.update(&state);
    hasher.update(input);
    hasher.finalize_xof().fill(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes_expand_deterministic() {
        let state = [0u8; 16];
        let key = [7u8; 16];
        assert_eq!(aes_expand_block(&state, &key), aes_expand_block(&state, &key));
        assert_ne!(aes_expand_block(&state, &key), state);
    }

    #[test]
    fn test_sha256_compress_deterministic() {
        let state = [0u8; 32];
        let block = [1u8; 64];
        let result = sha256_compress(&state, &block);
        assert_eq!(result, sha256_compress(&state, &block));
        assert_ne!(result, state);
    }

    #[test]
    fn test_core_stages_are_distinct() {
        let input = [0x5Au8; 64];
        let outputs: Vec<State> = (0..15).map(|id| core_stage(id, &input)).collect();
        for (i, a) in outputs.iter().enumerate() {
            for b in &outputs[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_heavy_stage_ignores_extra_scratch() {
        let input = [3u8; STATE_SIZE];
        let memory = HEAVY_BASE_MEMORY[0];
        let mut small = vec![0u8; memory];
        let mut large = vec![0xFFu8; memory * 2];
        assert_eq!(
            heavy_stage(0, &input, &mut small),
            heavy_stage(0, &input, &mut large)
        );
        assert!(large[memory..].iter().all(|&b| b == 0xFF));
    }
}
