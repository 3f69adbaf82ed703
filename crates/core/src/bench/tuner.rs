//! Auto-tuning of the heavy-stage memory modes
//!
//! For every rotation the tuner measures all 8 on/off combinations of the
//! doubling flags of the rotation's three heavy ids and keeps the fastest.
//! Workers step through the rotations in lock-step; worker 0 records the
//! results and persists the finished table.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::bench::coordinator::{Coordinator, WorkerInput, fatal, run_segment, time_segment};
use crate::kernel::{HashKernel, KernelKind, WorkerContext};
use crate::memory::HeavyFlags;
use crate::params::*;
use crate::rotation::{ROTATION_TABLE, TuneTable, combo_flags};

/// Tuning run settings
#[derive(Debug, Clone)]
pub struct TuneOptions {
    pub threads: usize,
    pub kernel: KernelKind,
    /// Length of one measured segment
    pub segment: Duration,
    /// Where to persist the finished table, if anywhere
    pub tune_file: Option<PathBuf>,
}

impl Default for TuneOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            kernel: KernelKind::default(),
            segment: Duration::from_secs_f64(TUNE_SEGMENT_SECS),
            tune_file: Some(PathBuf::from(TUNE_FILE)),
        }
    }
}

/// Fastest flag combination seen so far for one rotation
///
/// Only a strictly higher hashrate replaces the current best, so among
/// equal rates the earliest combination wins.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestTracker {
    rate: f64,
    flags: HeavyFlags,
    combo: Option<usize>,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a measurement; returns whether it became the new best
    pub fn observe(&mut self, combo: usize, flags: HeavyFlags, rate: f64) -> bool {
        if rate > self.rate {
            self.rate = rate;
            self.flags = flags;
            self.combo = Some(combo);
            true
        } else {
            false
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn flags(&self) -> HeavyFlags {
        self.flags
    }

    /// Winning combination index, `None` if nothing beat zero
    pub fn combo(&self) -> Option<usize> {
        self.combo
    }
}

/// Result of a tuning run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TuneOutcome {
    pub table: TuneTable,
    /// Best hashrate measured per rotation
    pub rates: [f64; ROTATIONS],
    /// Hashrate of every measured segment, by rotation and combination
    pub combo_rates: [[f64; FLAG_COMBOS]; ROTATIONS],
}

/// Run the full tuning procedure and persist the table
///
/// The calling thread acts as the stats thread. A failure to save the
/// table is logged and the outcome is still returned.
pub fn tune(opts: &TuneOptions) -> TuneOutcome {
    let coord = Coordinator::new(opts.threads);
    let kernel = opts.kernel.kernel();
    let header = tuning_header();

    log::info!(
        "tuning {} rotations x {} configs, {:.1}s each, {} threads ({})",
        ROTATIONS,
        FLAG_COMBOS,
        opts.segment.as_secs_f64(),
        coord.workers(),
        kernel.name()
    );

    let outcome = thread::scope(|s| {
        let handles: Vec<_> = (0..coord.workers())
            .map(|id| {
                let coord = &coord;
                let header = &header;
                s.spawn(move || tune_worker(coord, kernel, id, header))
            })
            .collect();

        tune_clock(&coord, opts.segment);

        let mut outcome = None;
        for handle in handles {
            let result = handle
                .join()
                .unwrap_or_else(|e| std::panic::resume_unwind(e));
            outcome = outcome.or(result);
        }
        outcome.unwrap_or_default()
    });

    for (r, rotation) in ROTATION_TABLE.iter().enumerate() {
        log::info!(
            "Best config for rotation {r} {rotation:?}: {:?}",
            outcome.table.get(r)
        );
    }

    if let Some(path) = &opts.tune_file {
        match outcome.table.save(path) {
            Ok(()) => log::info!("tuned config saved to {}", path.display()),
            Err(e) => log::error!("could not save {}: {e}", path.display()),
        }
    }

    outcome
}

fn tuning_header() -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    for (i, byte) in header.iter_mut().enumerate() {
        *byte = i as u8;
    }
    header
}

/// One tuning worker; worker 0 returns the outcome
fn tune_worker(
    coord: &Coordinator,
    kernel: &dyn HashKernel,
    id: usize,
    header: &[u8; HEADER_LEN],
) -> Option<TuneOutcome> {
    let mut ctx = WorkerContext::new(id);
    let mut input = WorkerInput::new(id, kernel.lanes(), header);
    let mut outcome = TuneOutcome::default();

    for (r, rotation) in ROTATION_TABLE.iter().enumerate() {
        if id == 0 {
            log::info!("Testing rotation: {r}");
        }
        let mut best = BestTracker::new();

        for combo in 0..FLAG_COMBOS {
            let flags = combo_flags(rotation, combo);
            coord.sync_conf();

            let sequence = input.refresh_core_bytes().with_heavy(*rotation);
            ctx.prepare(sequence, flags).unwrap_or_else(|e| fatal(e));
            run_segment(coord, kernel, &mut ctx, &mut input);

            if id == 0 {
                let rate = coord.hashrate();
                outcome.combo_rates[r][combo] = rate;
                if best.observe(combo, flags, rate) {
                    log::debug!("rotation {r} config {combo} {flags:?}: {rate:.2} H/s (best)");
                } else {
                    log::debug!("rotation {r} config {combo} {flags:?}: {rate:.2} H/s");
                }
                coord.reset_stats();
            }
            coord.sync_conf();
        }

        if id == 0 {
            outcome.table.set(r, best.flags());
            outcome.rates[r] = best.rate();
            log::info!("Best config for rotation {r}: {:?}", best.flags());
        }
    }

    (id == 0).then_some(outcome)
}

/// Stats thread of a tuning run: one fixed-length segment per combination
fn tune_clock(coord: &Coordinator, segment: Duration) {
    for _ in 0..ROTATIONS * FLAG_COMBOS {
        let elapsed = time_segment(coord, segment);
        let rate = coord.compute_hashrate();
        log::trace!("segment: {rate:.2} H/s ({elapsed:.2}s)");
        coord.sync_bench();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_is_first_strict_maximum() {
        let rates = [10.0, 30.0, 20.0, 30.0, 5.0, 30.0, 29.9, 0.0];
        let mut best = BestTracker::new();
        for (combo, rate) in rates.into_iter().enumerate() {
            best.observe(combo, combo_flags(&ROTATION_TABLE[0], combo), rate);
        }
        assert_eq!(best.combo(), Some(1));
        assert_eq!(best.rate(), 30.0);
        // Rotation 0 is [0, 1, 2]; combo 1 doubles heavy id 0
        assert_eq!(best.flags(), [1, 0, 0, 0, 0, 0]);
        assert_eq!(best.flags(), combo_flags(&ROTATION_TABLE[0], 1));
    }

    #[test]
    fn test_all_zero_rates_keep_base_memory() {
        let mut best = BestTracker::new();
        for combo in 0..FLAG_COMBOS {
            assert!(!best.observe(combo, [1; HEAVY_COUNT], 0.0));
        }
        assert_eq!(best.combo(), None);
        assert_eq!(best.flags(), [0; HEAVY_COUNT]);
    }

    #[test]
    fn test_tuning_header_counts_up() {
        let header = tuning_header();
        assert_eq!(header[0], 0);
        assert_eq!(header[79], 79);
    }
}
