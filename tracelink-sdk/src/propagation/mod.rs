//! Concrete codecs for sending context across process boundaries.
//!
//! * [`TraceContextPropagator`]: W3C-style `traceparent`/`tracestate`
//!   headers.
//! * [`BaggagePropagator`]: W3C-style `baggage` header.
//! * [`BinaryPropagator`]: tagged binary layouts for span context and
//!   baggage, via [`BinaryFormat`].
mod baggage;
mod binary;
mod trace_context;

pub use baggage::BaggagePropagator;
pub use binary::{BinaryFormat, BinaryPropagator};
pub use trace_context::TraceContextPropagator;
