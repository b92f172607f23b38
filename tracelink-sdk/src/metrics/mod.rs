//! Sum aggregators for counting across threads.
//!
//! Aggregators accumulate recorded measurements and hand them off to a
//! collector through a drain-merge step, so recording threads never block
//! on collection.
use std::fmt;
use thiserror::Error;

pub mod aggregators;

pub use aggregators::{F64SumAggregator, SumAggregator};

/// Errors returned by metric aggregators.
#[derive(Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum MetricError {
    /// The aggregator does not support the recorded value type.
    #[error("unsupported operation: this aggregator does not record {0} values")]
    UnsupportedOperation(&'static str),
}

/// An instrument that accumulates measurements of a single value type.
///
/// The default method implementations reject the value type, so an
/// aggregator only overrides the recorder it supports. Recording the wrong
/// type is a caller bug, reported as
/// [`MetricError::UnsupportedOperation`] rather than silently dropped.
pub trait Aggregator: fmt::Debug {
    /// Record an `i64` measurement.
    fn record_i64(&self, _value: i64) -> Result<(), MetricError> {
        Err(MetricError::UnsupportedOperation("i64"))
    }

    /// Record an `f64` measurement.
    fn record_f64(&self, _value: f64) -> Result<(), MetricError> {
        Err(MetricError::UnsupportedOperation("f64"))
    }
}
