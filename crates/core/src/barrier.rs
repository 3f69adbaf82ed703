//! Reusable counting barrier
//!
//! Unlike `std::sync::Barrier`, the participant count is supplied per call so
//! the same type serves worker-only phases (N) and phases that include the
//! stats thread (N + 1). A generation counter tells a woken waiter whether
//! its own phase was released, which rules out lost and spurious wakeups
//! when the barrier is reused immediately.
//!
//! All participants of one phase must pass the same count, and two phases
//! that can be open at the same time need separate barriers.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct PhaseCount {
    arrived: usize,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct PhaseBarrier {
    state: Mutex<PhaseCount>,
    released: Condvar,
}

impl PhaseBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PhaseCount> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `expected` participants have arrived in this phase
    ///
    /// Returns `true` for exactly one caller per phase: the one whose
    /// arrival released the others.
    pub fn arrive(&self, expected: usize) -> bool {
        let mut state = self.lock();
        state.arrived += 1;

        if state.arrived >= expected {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return true;
        }

        let generation = state.generation;
        let _released = self
            .released
            .wait_while(state, |s| s.generation == generation)
            .unwrap_or_else(PoisonError::into_inner);
        false
    }

    /// Completed phases so far
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_single_participant_passes() {
        let barrier = PhaseBarrier::new();
        assert!(barrier.arrive(1));
        assert!(barrier.arrive(1));
        assert_eq!(barrier.generation(), 2);
    }

    #[test]
    fn test_nobody_leaves_before_last_arrival() {
        const N: usize = 4;
        let barrier = Arc::new(PhaseBarrier::new());
        let arrived = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let barrier = Arc::clone(&barrier);
                let arrived = Arc::clone(&arrived);
                thread::spawn(move || {
                    // Stagger arrivals so early callers really wait
                    thread::sleep(Duration::from_millis(10 * i as u64));
                    arrived.fetch_add(1, Ordering::SeqCst);
                    let leader = barrier.arrive(N);
                    assert_eq!(arrived.load(Ordering::SeqCst), N);
                    leader
                })
            })
            .collect();

        let leaders = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&leader| leader)
            .count();
        assert_eq!(leaders, 1);
    }

    #[test]
    fn test_reuse_across_phases() {
        const N: usize = 3;
        const PHASES: usize = 50;
        let barrier = Arc::new(PhaseBarrier::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for phase in 0..PHASES {
                        counter.fetch_add(1, Ordering::SeqCst);
                        barrier.arrive(N);
                        // Every participant of this phase has counted
                        assert!(counter.load(Ordering::SeqCst) >= (phase + 1) * N);
                        barrier.arrive(N);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(barrier.generation(), (2 * PHASES) as u64);
    }
}
