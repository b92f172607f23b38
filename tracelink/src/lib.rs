//! Context propagation primitives for distributed tracing.
//!
//! This crate provides the building blocks for carrying trace identity and
//! user-defined correlation data across process boundaries:
//!
//! * [`Context`]: an immutable, execution-scoped bag of values with a
//!   thread-local "current" slot managed through RAII guards.
//! * [`trace`]: span identity types ([`trace::SpanContext`],
//!   [`trace::TraceId`], [`trace::SpanId`], [`trace::TraceFlags`],
//!   [`trace::TraceState`]).
//! * [`baggage`]: immutable name/value correlation data carried in a
//!   [`Context`].
//! * [`propagation`]: the carrier abstraction ([`propagation::Injector`] /
//!   [`propagation::Extractor`]) and the [`propagation::TextMapPropagator`]
//!   trait implemented by wire codecs.
//!
//! Concrete codecs live in the `tracelink-sdk` and `tracelink-b3-propagator`
//! crates.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), feature(doc_auto_cfg))]

pub mod baggage;
mod common;
mod context;
#[macro_use]
mod internal_logging;
pub mod propagation;
pub mod trace;
mod trace_context;

pub use common::{Key, KeyValue, StringValue};
pub use context::{Context, ContextGuard, FutureExt, WithContext};

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, warn};
}
