//! Span identity types.
//!
//! A [`SpanContext`] is the portion of a span that is serialized and
//! propagated across process boundaries: the trace and span identifiers,
//! the trace flags, and the vendor [`TraceState`]. The identifiers
//! themselves ([`TraceId`], [`SpanId`], [`TraceFlags`]) are plain value
//! types with fixed-width lowercase hex encodings.
mod context;
mod span_context;

pub use self::context::TraceContextExt;
pub use self::span_context::{SpanContext, TraceState, TraceStateError};
pub use crate::trace_context::{SpanId, TraceFlags, TraceId};
