//! Logical recency clock
//!
//! A process-wide monotonically increasing counter, guarded by its own
//! lock, sampled to timestamp buffer accesses. Each sample advances the
//! counter, so concurrent accesses observe distinct, ordered ticks.

use parking_lot::Mutex;

/// Monotonic tick source shared by all recency bookkeeping.
pub struct RecencyClock {
    ticks: Mutex<u64>,
}

impl RecencyClock {
    /// Create a clock starting at tick zero.
    pub fn new() -> Self {
        RecencyClock {
            ticks: Mutex::new(0),
        }
    }

    /// Advance the clock and return the new tick.
    pub fn now(&self) -> u64 {
        let mut ticks = self.ticks.lock();
        *ticks += 1;
        *ticks
    }
}

impl Default for RecencyClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ticks_are_strictly_increasing() {
        let clock = RecencyClock::new();
        let a = clock.now();
        let b = clock.now();
        let c = clock.now();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_concurrent_samples_are_distinct() {
        let clock = Arc::new(RecencyClock::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let clock = clock.clone();
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| clock.now()).collect::<Vec<_>>()
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 4000);
    }
}
