//! Shared benchmark state and the segment handshake
//!
//! N worker threads and one stats thread move through a run in lock-step.
//! Every measured segment is the same exchange:
//!
//! ```text
//! workers                         stats thread
//! -------                         ------------
//! sync_bench   (start)            sync_bench   (start)
//! hash until epoch changes        sleep, close_segment, add elapsed
//! add_hashes
//! sync_bench   (flush)            sync_bench   (flush)
//!                                 compute hashrate, publish next phase
//! sync_bench   (report)           sync_bench   (report)
//! read phase state
//! ```
//!
//! Phase state (rotation, epoch, stop) is written only by the stats thread
//! between two barrier releases and read by workers after the next release,
//! so relaxed atomics are enough: the barrier mutex orders everything else.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::barrier::PhaseBarrier;
use crate::kernel::{Digest, HashKernel, HeaderWords, MAX_LANES, WorkerContext, format_header};
use crate::memory::ScratchError;
use crate::params::*;
use crate::sequence::{StageSequence, derive_sequence};

/// Accumulated measurements of the current run or segment
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BenchStats {
    /// Seconds measured by the stats thread
    pub elapsed: f64,
    /// Hashes reported by the workers
    pub hashes: u64,
    /// Last computed `hashes / elapsed`
    pub hashrate: f64,
}

#[derive(Debug, Default)]
struct PhaseState {
    rotation: AtomicUsize,
    epoch: AtomicU64,
    stop: AtomicBool,
}

/// Barriers, phase state and counters shared by one run
#[derive(Debug)]
pub struct Coordinator {
    workers: usize,
    conf_sync: PhaseBarrier,
    bench_sync: PhaseBarrier,
    phase: PhaseState,
    stats: Mutex<BenchStats>,
}

impl Coordinator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            conf_sync: PhaseBarrier::new(),
            bench_sync: PhaseBarrier::new(),
            phase: PhaseState::default(),
            stats: Mutex::new(BenchStats::default()),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Worker-only phase boundary
    pub fn sync_conf(&self) {
        self.conf_sync.arrive(self.workers);
    }

    /// Phase boundary including the stats thread
    pub fn sync_bench(&self) {
        self.bench_sync.arrive(self.workers + 1);
    }

    pub fn rotation(&self) -> usize {
        self.phase.rotation.load(Ordering::Relaxed)
    }

    pub(crate) fn set_rotation(&self, rotation: usize) {
        self.phase.rotation.store(rotation, Ordering::Relaxed);
    }

    pub fn epoch(&self) -> u64 {
        self.phase.epoch.load(Ordering::Relaxed)
    }

    /// End the running segment; workers stop hashing once they see it
    pub(crate) fn close_segment(&self) {
        self.phase.epoch.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stopped(&self) -> bool {
        self.phase.stop.load(Ordering::Relaxed)
    }

    pub(crate) fn signal_stop(&self) {
        self.phase.stop.store(true, Ordering::Relaxed);
    }

    fn lock_stats(&self) -> MutexGuard<'_, BenchStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_hashes(&self, hashes: u64) {
        self.lock_stats().hashes += hashes;
    }

    pub(crate) fn add_elapsed(&self, seconds: f64) {
        self.lock_stats().elapsed += seconds;
    }

    /// Recompute and store `hashes / elapsed`
    pub(crate) fn compute_hashrate(&self) -> f64 {
        let mut stats = self.lock_stats();
        stats.hashrate = if stats.elapsed > 0.0 {
            stats.hashes as f64 / stats.elapsed
        } else {
            0.0
        };
        stats.hashrate
    }

    pub fn hashrate(&self) -> f64 {
        self.lock_stats().hashrate
    }

    pub fn stats(&self) -> BenchStats {
        *self.lock_stats()
    }

    pub fn reset_stats(&self) {
        *self.lock_stats() = BenchStats::default();
    }
}

/// Abort on a scratch allocation failure
///
/// The other participants are parked on barriers that can never complete,
/// so unwinding this thread alone would hang the process.
pub(crate) fn fatal(err: ScratchError) -> ! {
    log::error!("{err}");
    std::process::abort()
}

/// Header lanes and nonce of one worker
pub(crate) struct WorkerInput {
    base: HeaderWords,
    lanes: usize,
    nonce: u32,
    inputs: [HeaderWords; MAX_LANES],
    out: [Digest; MAX_LANES],
}

impl WorkerInput {
    /// Each thread starts 10000 nonces after the previous one
    pub(crate) fn new(thread_id: usize, lanes: usize, header: &[u8; HEADER_LEN]) -> Self {
        Self {
            base: format_header(header),
            lanes: lanes.clamp(1, MAX_LANES),
            nonce: (thread_id as u32).wrapping_mul(10_000),
            inputs: [[0u32; HEADER_WORDS]; MAX_LANES],
            out: [[0u8; DIGEST_SIZE]; MAX_LANES],
        }
    }

    /// Randomize header words 1..=5 and derive the sequence they select
    pub(crate) fn refresh_core_bytes(&mut self) -> StageSequence {
        let mut random = [0u8; 20];
        match getrandom::getrandom(&mut random) {
            Ok(()) => {
                for (word, chunk) in self.base[1..6].iter_mut().zip(random.chunks_exact(4)) {
                    *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
            Err(e) => log::warn!("no fresh header bytes ({e}), reusing previous core order"),
        }

        let mut bytes = [0u8; SELECTION_BYTES];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(&self.base[1..9]) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        derive_sequence(&bytes)
    }

    /// Hash one batch of lanes with consecutive nonces
    fn hash_batch(
        &mut self,
        kernel: &dyn HashKernel,
        ctx: &mut WorkerContext,
    ) -> Result<u64, ScratchError> {
        let lanes = self.lanes;
        for (lane, input) in self.inputs[..lanes].iter_mut().enumerate() {
            *input = self.base;
            input[NONCE_WORD] = self.nonce.wrapping_add(lane as u32);
        }
        kernel.hash(ctx, &self.inputs[..lanes], &mut self.out[..lanes])?;
        self.nonce = self.nonce.wrapping_add(lanes as u32);
        Ok(lanes as u64)
    }
}

/// Worker side of one measured segment
pub(crate) fn run_segment(
    coord: &Coordinator,
    kernel: &dyn HashKernel,
    ctx: &mut WorkerContext,
    input: &mut WorkerInput,
) {
    // The stats thread only closes this epoch after the start barrier
    let epoch = coord.epoch();
    let mut hashes = 0u64;

    coord.sync_bench();
    loop {
        hashes += input.hash_batch(kernel, ctx).unwrap_or_else(|e| fatal(e));
        if coord.epoch() != epoch {
            break;
        }
    }
    coord.add_hashes(hashes);
    coord.sync_bench();
    coord.sync_bench();
}

/// Stats side of one measured segment, up to and including the flush barrier
///
/// Returns the measured seconds. The caller publishes the next phase and
/// then arrives at the report barrier.
pub(crate) fn time_segment(coord: &Coordinator, length: Duration) -> f64 {
    coord.sync_bench();
    let start = Instant::now();
    thread::sleep(length);
    coord.close_segment();
    let elapsed = start.elapsed().as_secs_f64();
    coord.add_elapsed(elapsed);
    coord.sync_bench();
    elapsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelKind;

    #[test]
    fn test_hashrate_from_stats() {
        let coord = Coordinator::new(2);
        assert_eq!(coord.compute_hashrate(), 0.0);

        coord.add_hashes(300);
        coord.add_elapsed(1.5);
        assert_eq!(coord.compute_hashrate(), 200.0);
        assert_eq!(coord.hashrate(), 200.0);

        coord.reset_stats();
        assert_eq!(coord.stats(), BenchStats::default());
    }

    #[test]
    fn test_zero_workers_clamped() {
        assert_eq!(Coordinator::new(0).workers(), 1);
    }

    #[test]
    fn test_worker_nonces_are_spread() {
        let header = [0u8; HEADER_LEN];
        let a = WorkerInput::new(0, 4, &header);
        let b = WorkerInput::new(3, 4, &header);
        assert_eq!(a.nonce, 0);
        assert_eq!(b.nonce, 30_000);
    }

    #[test]
    fn test_refresh_keeps_sequence_well_formed() {
        let mut input = WorkerInput::new(0, 1, &[7u8; HEADER_LEN]);
        for _ in 0..8 {
            let seq = input.refresh_core_bytes();
            let mut heavy = seq.heavy_ids();
            heavy.sort_unstable();
            assert!(heavy[0] < heavy[1] && heavy[1] < heavy[2]);
        }
    }

    #[test]
    fn test_segment_handshake() {
        let coord = Coordinator::new(2);
        let kernel = KernelKind::Scalar.kernel();
        let header = [1u8; HEADER_LEN];

        thread::scope(|s| {
            for id in 0..2 {
                let coord = &coord;
                let header = &header;
                s.spawn(move || {
                    let mut ctx = WorkerContext::new(id);
                    let mut input = WorkerInput::new(id, kernel.lanes(), header);
                    let seq = input.refresh_core_bytes().with_heavy([0, 1, 2]);
                    ctx.prepare(seq, [0; HEAVY_COUNT]).unwrap();
                    run_segment(coord, kernel, &mut ctx, &mut input);
                });
            }

            let elapsed = time_segment(&coord, Duration::from_millis(20));
            assert!(elapsed >= 0.02);
            // Both workers flushed before the flush barrier released us
            assert!(coord.stats().hashes >= 2);
            assert!(coord.compute_hashrate() > 0.0);
            coord.sync_bench();
        });
        assert_eq!(coord.epoch(), 1);
    }
}
