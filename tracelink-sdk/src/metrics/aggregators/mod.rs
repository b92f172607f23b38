//! Aggregator implementations.
mod sum;

pub use sum::{F64SumAggregator, SumAggregator};
