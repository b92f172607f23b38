//! # W3C Trace Context Propagator
//!

use std::str::FromStr;
use std::sync::OnceLock;
use tracelink::{
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, PropagationError, TextMapPropagator},
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    tracelink_warn, Context,
};

const SUPPORTED_VERSION: u8 = 0;
const INVALID_VERSION: u8 = 0xff;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";

// Byte offsets of the fixed-width traceparent fields:
// {2:version}-{32:trace id}-{16:span id}-{2:flags}
const VERSION_RANGE: std::ops::Range<usize> = 0..2;
const TRACE_ID_RANGE: std::ops::Range<usize> = 3..35;
const SPAN_ID_RANGE: std::ops::Range<usize> = 36..52;
const FLAGS_RANGE: std::ops::Range<usize> = 53..55;
const VERSION_0_LEN: usize = 55;

// TODO Replace this with LazyLock once it is stable.
static TRACE_CONTEXT_HEADER_FIELDS: OnceLock<[String; 2]> = OnceLock::new();

fn trace_context_header_fields() -> &'static [String; 2] {
    TRACE_CONTEXT_HEADER_FIELDS
        .get_or_init(|| [TRACEPARENT_HEADER.to_owned(), TRACESTATE_HEADER.to_owned()])
}

fn is_lower_hex(field: &[u8]) -> bool {
    field.iter().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Propagates `SpanContext`s in [W3C TraceContext] format under `traceparent` and `tracestate` header.
///
/// The `traceparent` header represents the incoming request in a
/// tracing system in a common format, understood by all vendors.
/// Here’s an example of a `traceparent` header.
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
/// The `traceparent` HTTP header field identifies the incoming request in a
/// tracing system. It has four fields:
///
///    - version
///    - trace-id
///    - parent-id
///    - trace-flags
///
/// The header is parsed at fixed byte offsets rather than by splitting, so
/// fields of the wrong width are rejected outright. Headers from future
/// format versions are accepted as long as the version-0 prefix parses;
/// version `ff` is always rejected. Flag bits other than `sampled` are
/// cleared on extraction.
///
/// The `tracestate` header provides additional vendor-specific trace
/// identification information across different distributed tracing systems.
/// Here's an example of a `tracestate` header
///
/// `tracestate: vendorname1:opaqueValue1,vendorname2:opaqueValue2`
///
/// A missing `traceparent` is not an error: extraction returns the passed
/// context unchanged. A present but malformed header is reported as a
/// [`PropagationError`] carrying the offending value.
///
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    /// Extract a span context from the w3c trace-context headers, or `None`
    /// if the carrier holds no `traceparent`.
    fn extract_span_context(
        &self,
        extractor: &dyn Extractor,
    ) -> Result<Option<SpanContext>, PropagationError> {
        let header_value = match extractor.get(TRACEPARENT_HEADER) {
            Some(value) => value.trim(),
            None => return Ok(None),
        };
        let malformed = || PropagationError::invalid_field(TRACEPARENT_HEADER, header_value);

        let bytes = header_value.as_bytes();
        if bytes.len() < VERSION_0_LEN
            || bytes[VERSION_RANGE.end] != b'-'
            || bytes[TRACE_ID_RANGE.end] != b'-'
            || bytes[SPAN_ID_RANGE.end] != b'-'
        {
            return Err(malformed());
        }

        let version_field = &bytes[VERSION_RANGE];
        let trace_id_field = &bytes[TRACE_ID_RANGE];
        let span_id_field = &bytes[SPAN_ID_RANGE];
        let flags_field = &bytes[FLAGS_RANGE];
        if !is_lower_hex(version_field)
            || !is_lower_hex(trace_id_field)
            || !is_lower_hex(span_id_field)
            || !is_lower_hex(flags_field)
        {
            return Err(malformed());
        }

        let version = u8::from_str_radix(&header_value[VERSION_RANGE], 16).map_err(|_| malformed())?;
        if version == INVALID_VERSION {
            return Err(malformed());
        }
        // Version 0 headers are exactly 55 bytes; later versions may append
        // `-`-separated fields after the version-0 prefix.
        if version == SUPPORTED_VERSION && bytes.len() != VERSION_0_LEN {
            return Err(malformed());
        }
        if version > SUPPORTED_VERSION
            && bytes.len() > VERSION_0_LEN
            && bytes[VERSION_0_LEN] != b'-'
        {
            return Err(malformed());
        }

        let trace_id = TraceId::from_hex(&header_value[TRACE_ID_RANGE]).map_err(|_| malformed())?;
        let span_id = SpanId::from_hex(&header_value[SPAN_ID_RANGE]).map_err(|_| malformed())?;
        let opts = u8::from_str_radix(&header_value[FLAGS_RANGE], 16).map_err(|_| malformed())?;

        // Build trace flags clearing all flags other than the trace-context
        // supported sampling bit.
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let trace_state = match extractor.get(TRACESTATE_HEADER) {
            Some(trace_state_str) => TraceState::from_str(trace_state_str)?,
            None => TraceState::default(),
        };

        // All-zero ids are well formed and produce an invalid remote context,
        // so invalidity itself travels across process boundaries.
        Ok(Some(SpanContext::new(
            trace_id, span_id, trace_flags, true, trace_state,
        )))
    }
}

impl TextMapPropagator for TraceContextPropagator {
    /// Properly encodes the values of the `SpanContext` and injects them
    /// into the `Injector`.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span_context = cx.span_context();
        let header_value = format!(
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags() & TraceFlags::SAMPLED
        );
        injector.set(TRACEPARENT_HEADER, header_value);
        if !span_context.trace_state().is_empty() {
            injector.set(TRACESTATE_HEADER, span_context.trace_state().header());
        }
    }

    /// Retrieves encoded `SpanContext`s using the `Extractor`. It decodes
    /// the `SpanContext` and returns it. If no `SpanContext` was retrieved
    /// the given `Context` is returned unchanged; a malformed header is an
    /// error.
    fn extract_with_context(
        &self,
        cx: &Context,
        extractor: &dyn Extractor,
    ) -> Result<Context, PropagationError> {
        match self.extract_span_context(extractor) {
            Ok(Some(sc)) => Ok(cx.with_remote_span_context(sc)),
            Ok(None) => Ok(cx.clone()),
            Err(err) => {
                tracelink_warn!(
                    name: "TraceContextPropagator.Extract.Malformed",
                    error = err.to_string(),
                );
                Err(err)
            }
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(trace_context_header_fields())
    }
}
