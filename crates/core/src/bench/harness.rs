//! Continuous benchmark over all heavy rotations
//!
//! The stats thread walks rotations 0..19 once. Each rotation runs for a
//! fixed length or, in realistic mode, for a weighted share of a 300 s
//! cycle. At every
//! boundary workers pick fresh core bytes, pin the new rotation's heavy
//! triple, adopt tuned flags if any and reallocate scratch.

use std::thread;
use std::time::Duration;

use crate::bench::coordinator::{Coordinator, WorkerInput, fatal, run_segment, time_segment};
use crate::kernel::{HashKernel, KernelKind, WorkerContext};
use crate::params::*;
use crate::rotation::{ROTATION_TABLE, TuneTable};

/// Share of the realistic cycle spent on each rotation (sums to 1)
///
/// Placeholder values, not measured from any network.
pub const REALISTIC_WEIGHTS: [f64; ROTATIONS] = [
    0.033, 0.035, 0.041, 0.053, 0.035, 0.043, 0.055, 0.045, 0.057, 0.063, //
    0.035, 0.043, 0.055, 0.045, 0.057, 0.063, 0.047, 0.059, 0.065, 0.071,
];

/// How long each rotation is measured
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentLength {
    Fixed(Duration),
    /// `REALISTIC_WEIGHTS[r]` of a 300 s cycle
    Realistic,
}

impl SegmentLength {
    pub fn duration(&self, rotation: usize) -> Duration {
        match self {
            SegmentLength::Fixed(length) => *length,
            SegmentLength::Realistic => {
                Duration::from_secs_f64(REALISTIC_CYCLE_SECS * REALISTIC_WEIGHTS[rotation])
            }
        }
    }
}

/// Benchmark run settings
#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub threads: usize,
    pub kernel: KernelKind,
    pub segment: SegmentLength,
    /// Tuned flags to apply; all flags stay 0 without them
    pub tuned: Option<TuneTable>,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            kernel: KernelKind::default(),
            segment: SegmentLength::Realistic,
            tuned: None,
        }
    }
}

/// Measurements of one full cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchReport {
    /// Hashrate measured while each rotation was active
    pub rotation_rates: [f64; ROTATIONS],
    pub hashes: u64,
    pub seconds: f64,
    /// Scratch bytes worker 0 allocated for each rotation
    pub scratch_sizes: [usize; ROTATIONS],
}

impl BenchReport {
    /// Cumulative hashes per second over the cycle
    pub fn average(&self) -> f64 {
        if self.seconds > 0.0 {
            self.hashes as f64 / self.seconds
        } else {
            0.0
        }
    }
}

/// Run one benchmark cycle over all rotations
///
/// The calling thread acts as the stats thread.
pub fn benchmark(opts: &BenchOptions) -> BenchReport {
    let coord = Coordinator::new(opts.threads);
    let kernel = opts.kernel.kernel();
    let mut header = [0u8; HEADER_LEN];
    for (i, byte) in header.iter_mut().enumerate() {
        *byte = i as u8;
    }

    log::info!(
        "benchmarking {} rotations, {} threads ({}){}",
        ROTATIONS,
        coord.workers(),
        kernel.name(),
        if opts.tuned.is_some() { ", tuned" } else { "" }
    );

    thread::scope(|s| {
        let handles: Vec<_> = (0..coord.workers())
            .map(|id| {
                let coord = &coord;
                let header = &header;
                let tuned = opts.tuned.as_ref();
                s.spawn(move || bench_worker(coord, kernel, tuned, id, header))
            })
            .collect();

        let mut report = bench_clock(&coord, opts.segment);

        for (id, handle) in handles.into_iter().enumerate() {
            let sizes = handle
                .join()
                .unwrap_or_else(|e| std::panic::resume_unwind(e));
            if id == 0 {
                report.scratch_sizes = sizes;
            }
        }
        report
    })
}

fn bench_worker(
    coord: &Coordinator,
    kernel: &dyn HashKernel,
    tuned: Option<&TuneTable>,
    id: usize,
    header: &[u8; HEADER_LEN],
) -> [usize; ROTATIONS] {
    let mut ctx = WorkerContext::new(id);
    let mut input = WorkerInput::new(id, kernel.lanes(), header);
    let mut sizes = [0usize; ROTATIONS];

    loop {
        let rotation = coord.rotation();
        let sequence = input
            .refresh_core_bytes()
            .with_heavy(ROTATION_TABLE[rotation]);
        ctx.set_sequence(sequence);
        if let Some(table) = tuned {
            ctx.select_tuned_config(table);
        }
        sizes[rotation] = ctx.allocate_needed_memory().unwrap_or_else(|e| fatal(e));

        run_segment(coord, kernel, &mut ctx, &mut input);
        if coord.stopped() {
            return sizes;
        }
    }
}

/// Stats thread of a benchmark: advances the rotation after each segment
fn bench_clock(coord: &Coordinator, length: SegmentLength) -> BenchReport {
    let mut report = BenchReport::default();
    let threads = coord.workers() as f64;

    loop {
        let rotation = coord.rotation();
        let before = coord.stats().hashes;
        let elapsed = time_segment(coord, length.duration(rotation));

        let average = coord.compute_hashrate();
        let stats = coord.stats();
        let rate = if elapsed > 0.0 {
            (stats.hashes - before) as f64 / elapsed
        } else {
            0.0
        };
        report.rotation_rates[rotation] = rate;

        let next = (rotation + 1) % ROTATIONS;
        if next == 0 {
            report.hashes = stats.hashes;
            report.seconds = stats.elapsed;
            log::info!(
                "Hashrate (Avg): {average:.2} H/s ({:.2}s) -> {:.3} H/s per thread",
                stats.elapsed,
                average / threads
            );
            coord.signal_stop();
        } else {
            log::info!(
                "Rotation {rotation}: {rate:.2} H/s, avg {average:.2} H/s ({:.2}s) -> {:.3} H/s per thread",
                stats.elapsed,
                average / threads
            );
            coord.set_rotation(next);
        }
        coord.sync_bench();

        if next == 0 {
            return report;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realistic_weights_partition_cycle() {
        let total: f64 = REALISTIC_WEIGHTS.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
        assert!(REALISTIC_WEIGHTS.iter().all(|&w| w > 0.0));

        let cycle: f64 = (0..ROTATIONS)
            .map(|r| SegmentLength::Realistic.duration(r).as_secs_f64())
            .sum();
        assert!((cycle - REALISTIC_CYCLE_SECS).abs() < 1e-3);
    }

    #[test]
    fn test_fixed_length_ignores_rotation() {
        let length = SegmentLength::Fixed(Duration::from_millis(250));
        assert_eq!(length.duration(0), length.duration(19));
    }

    #[test]
    fn test_report_average() {
        let report = BenchReport {
            hashes: 500,
            seconds: 2.0,
            ..Default::default()
        };
        assert_eq!(report.average(), 250.0);
        assert_eq!(BenchReport::default().average(), 0.0);
    }
}
