//! Heavy-stage memory sizing and the per-worker scratch buffer

use std::collections::TryReserveError;

use thiserror::Error;

use crate::params::*;

/// Doubling flag per heavy alphabet id (0 = base size, 1 = twice the base)
pub type HeavyFlags = [u8; HEAVY_COUNT];

#[derive(Error, Debug)]
pub enum ScratchError {
    #[error("failed to allocate {size} bytes of scratch memory: {source}")]
    Allocation {
        size: usize,
        #[source]
        source: TryReserveError,
    },
}

/// Scratch bytes a heavy id needs under the given flags
#[inline]
pub fn heavy_requirement(id: u8, flags: &HeavyFlags) -> usize {
    let id = id as usize;
    HEAVY_BASE_MEMORY[id] * (flags[id] as usize + 1)
}

/// Largest scratch requirement among the three active heavy ids
pub fn required_size(heavy_ids: [u8; HEAVY_PER_SEQUENCE], flags: &HeavyFlags) -> usize {
    heavy_ids
        .iter()
        .map(|&id| heavy_requirement(id, flags))
        .max()
        .unwrap_or(0)
}

/// Working memory shared by the heavy stages of one worker
///
/// The block is never resized in place: `reallocate` drops the old
/// allocation before requesting the new one.
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    mem: Vec<u8>,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mem
    }

    /// Purge the current block and allocate a zeroed one of exactly `size` bytes
    pub fn reallocate(&mut self, size: usize) -> Result<(), ScratchError> {
        self.mem = Vec::new();

        let mut mem = Vec::new();
        mem.try_reserve_exact(size)
            .map_err(|source| ScratchError::Allocation { size, source })?;
        mem.resize(size, 0);
        self.mem = mem;

        log::trace!("scratch reallocated: {} KB", size / 1024);
        Ok(())
    }
}
