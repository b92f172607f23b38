use crate::metrics::{Aggregator, MetricError};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// A monotonically accumulating `i64` sum.
///
/// Recording is a lock-free fetch-add; collection drains the accumulated
/// value with an atomic swap so no recorded increment is lost or counted
/// twice.
#[derive(Debug, Default)]
pub struct SumAggregator {
    value: AtomicI64,
}

impl SumAggregator {
    /// Create a new sum aggregator starting at zero.
    pub fn new() -> Self {
        SumAggregator {
            value: AtomicI64::new(0),
        }
    }

    /// The accumulated sum, optionally resetting it to zero.
    pub fn value(&self, reset: bool) -> i64 {
        if reset {
            self.value.swap(0, Ordering::Relaxed)
        } else {
            self.value.load(Ordering::Relaxed)
        }
    }

    /// Drains this aggregator's sum into `other`, leaving this one at zero.
    pub fn merge_to_and_reset(&self, other: &SumAggregator) {
        let drained = self.value.swap(0, Ordering::Relaxed);
        other.value.fetch_add(drained, Ordering::Relaxed);
    }
}

impl Aggregator for SumAggregator {
    fn record_i64(&self, value: i64) -> Result<(), MetricError> {
        self.value.fetch_add(value, Ordering::Relaxed);
        Ok(())
    }
}

/// A monotonically accumulating `f64` sum.
///
/// Floating points don't have true atomics, so a mutex guards the value and
/// readers never observe a partially applied add.
#[derive(Debug, Default)]
pub struct F64SumAggregator {
    value: Mutex<f64>,
}

impl F64SumAggregator {
    /// Create a new sum aggregator starting at zero.
    pub fn new() -> Self {
        F64SumAggregator {
            value: Mutex::new(0.0),
        }
    }

    /// The accumulated sum, optionally resetting it to zero.
    pub fn value(&self, reset: bool) -> f64 {
        let mut guard = self.value.lock().expect("F64 mutex was poisoned");
        if reset {
            let value = *guard;
            *guard = 0.0;
            value
        } else {
            *guard
        }
    }

    /// Drains this aggregator's sum into `other`, leaving this one at zero.
    pub fn merge_to_and_reset(&self, other: &F64SumAggregator) {
        let drained = {
            let mut guard = self.value.lock().expect("F64 mutex was poisoned");
            let value = *guard;
            *guard = 0.0;
            value
        };
        let mut other_guard = other.value.lock().expect("F64 mutex was poisoned");
        *other_guard += drained;
    }
}

impl Aggregator for F64SumAggregator {
    fn record_f64(&self, value: f64) -> Result<(), MetricError> {
        let mut guard = self.value.lock().expect("F64 mutex was poisoned");
        *guard += value;
        Ok(())
    }
}
