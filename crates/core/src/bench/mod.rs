//! Benchmarking and auto-tuning over the heavy rotations

pub mod coordinator;
pub mod harness;
pub mod tuner;

pub use coordinator::{BenchStats, Coordinator};
pub use harness::{BenchOptions, BenchReport, REALISTIC_WEIGHTS, SegmentLength, benchmark};
pub use tuner::{BestTracker, TuneOptions, TuneOutcome, tune};
