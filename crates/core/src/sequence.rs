//! Stage sequence derivation
//!
//! Two independent selection passes run over the same 32 input bytes: one
//! over the 15 core primitives and one over the 6 heavy primitives. Each
//! byte contributes its low nibble then its high nibble, reduced modulo the
//! alphabet size; ids are taken in first-seen order and any id never seen
//! is appended in ascending order. The two orders are then interleaved as
//! five core stages followed by one heavy stage, three times.

use core::fmt;

use crate::params::*;

/// One stage of a GhostRider sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Core primitive, id 0..=14
    Core(u8),
    /// Heavy primitive, heavy alphabet id 0..=5
    Heavy(u8),
}

/// Ordered chain of 18 stage ids
///
/// Slots 5, 11 and 17 hold heavy ids (15..=20), every other slot a core id
/// (0..=14). The core slots form a permutation of the core alphabet and the
/// heavy slots hold three distinct heavy ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSequence {
    stages: [u8; SEQUENCE_LEN],
}

impl StageSequence {
    /// Raw stage ids, heavy stages encoded as heavy id + 15
    pub fn stages(&self) -> &[u8; SEQUENCE_LEN] {
        &self.stages
    }

    /// Decoded stage at `slot`
    pub fn stage(&self, slot: usize) -> Stage {
        let id = self.stages[slot];
        if id >= HEAVY_ID_OFFSET {
            Stage::Heavy(id - HEAVY_ID_OFFSET)
        } else {
            Stage::Core(id)
        }
    }

    /// Iterate over decoded stages in execution order
    pub fn iter(&self) -> impl Iterator<Item = Stage> + '_ {
        (0..SEQUENCE_LEN).map(|slot| self.stage(slot))
    }

    /// Heavy alphabet ids (0..=5) at slots 5, 11 and 17
    pub fn heavy_ids(&self) -> [u8; HEAVY_PER_SEQUENCE] {
        HEAVY_SLOTS.map(|slot| self.stages[slot] - HEAVY_ID_OFFSET)
    }

    /// Copy of this sequence with the heavy slots replaced by `heavy`
    ///
    /// Benchmarking pins the heavy triple to a rotation while keeping the
    /// input-derived core order.
    pub fn with_heavy(&self, heavy: [u8; HEAVY_PER_SEQUENCE]) -> Self {
        let mut stages = self.stages;
        for (slot, id) in HEAVY_SLOTS.iter().zip(heavy) {
            debug_assert!((id as usize) < HEAVY_COUNT);
            stages[*slot] = id + HEAVY_ID_OFFSET;
        }
        Self { stages }
    }
}

impl fmt::Display for StageSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

#[inline(always)]
fn take<const N: usize>(id: usize, selected: &mut [bool; N], order: &mut [u8; N], count: &mut usize) {
    if !selected[id] {
        selected[id] = true;
        order[*count] = id as u8;
        *count += 1;
    }
}

/// Select the order of `N` ids from the input nibbles
fn select_order<const N: usize>(bytes: &[u8; SELECTION_BYTES]) -> [u8; N] {
    let mut selected = [false; N];
    let mut order = [0u8; N];
    let mut count = 0;

    for byte in bytes {
        take((byte & 0x0F) as usize % N, &mut selected, &mut order, &mut count);
        take((byte >> 4) as usize % N, &mut selected, &mut order, &mut count);
        if count == N {
            return order;
        }
    }

    // Fill whatever the input never touched, lowest id first
    for (id, seen) in selected.iter().enumerate() {
        if !seen {
            order[count] = id as u8;
            count += 1;
        }
    }
    debug_assert_eq!(count, N);

    order
}

/// Derive the stage sequence for 32 bytes of input
pub fn derive_sequence(bytes: &[u8; SELECTION_BYTES]) -> StageSequence {
    let core = select_order::<CORE_COUNT>(bytes);
    let heavy = select_order::<HEAVY_COUNT>(bytes);

    let mut stages = [0u8; SEQUENCE_LEN];
    let group = CORE_COUNT / HEAVY_PER_SEQUENCE;
    for (g, (chunk, slot)) in core.chunks(group).zip(HEAVY_SLOTS).enumerate() {
        let start = slot - group;
        stages[start..slot].copy_from_slice(chunk);
        stages[slot] = heavy[g] + HEAVY_ID_OFFSET;
    }

    StageSequence { stages }
}

/// Derive the stage sequence from an 80-byte block header
///
/// Selection reads the previous-block-hash field (header bytes 4..36).
pub fn derive_from_header(header: &[u8; HEADER_LEN]) -> StageSequence {
    let mut bytes = [0u8; SELECTION_BYTES];
    bytes.copy_from_slice(&header[SELECTION_OFFSET..SELECTION_OFFSET + SELECTION_BYTES]);
    derive_sequence(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_order_early_stop() {
        // 0x10, 0x32, ... covers 0..=5 within three bytes, the rest is ignored
        let mut bytes = [0xFFu8; SELECTION_BYTES];
        bytes[0] = 0x10;
        bytes[1] = 0x32;
        bytes[2] = 0x54;
        assert_eq!(select_order::<HEAVY_COUNT>(&bytes), [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_select_order_nibble_order() {
        // Low nibble before high nibble: 0x21 yields 1 then 2
        let mut bytes = [0u8; SELECTION_BYTES];
        bytes[0] = 0x21;
        let order = select_order::<HEAVY_COUNT>(&bytes);
        assert_eq!(order, [1, 2, 0, 3, 4, 5]);
    }

    #[test]
    fn test_select_order_modulo() {
        // 0xF modulo 15 is 0, modulo 6 is 3
        let bytes = [0xFFu8; SELECTION_BYTES];
        assert_eq!(select_order::<CORE_COUNT>(&bytes)[0], 0);
        assert_eq!(select_order::<HEAVY_COUNT>(&bytes), [3, 0, 1, 2, 4, 5]);
    }

    #[test]
    fn test_with_heavy_keeps_core_slots() {
        let seq = derive_sequence(&[0u8; SELECTION_BYTES]);
        let pinned = seq.with_heavy([5, 3, 1]);
        assert_eq!(pinned.heavy_ids(), [5, 3, 1]);
        for slot in (0..SEQUENCE_LEN).filter(|s| !HEAVY_SLOTS.contains(s)) {
            assert_eq!(pinned.stages()[slot], seq.stages()[slot]);
        }
    }

    #[test]
    fn test_display() {
        let seq = derive_sequence(&[0u8; SELECTION_BYTES]);
        assert_eq!(
            seq.to_string(),
            "0 1 2 3 4 15 5 6 7 8 9 16 10 11 12 13 14 17"
        );
    }
}
