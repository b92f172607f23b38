//! # B3 Propagator
//!
//! The `Propagator` facilitates `SpanContext` propagation using B3 multiple
//! headers:
//!
//!    x-b3-traceid: {trace_id}
//!    x-b3-spanid: {span_id}
//!    x-b3-sampled: {flags}
//!    x-b3-flags: {debug_flag}
//!    tracestate: {key:value,...}
//!
//! The debug flag is carried as a `debug` entry in the trace state, looked
//! up by key on both sides, so it survives re-encoding through codecs that
//! only understand the trace state.
use std::str::FromStr;
use std::sync::OnceLock;
use tracelink::{
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, PropagationError, TextMapPropagator},
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};

/// As per spec, the multiple header should be case sensitive. But different protocol will use
/// different formats. For example, HTTP will use X-B3-$name while gRPC will use x-b3-$name. So here
/// we leave it to be lower case since we cannot tell what kind of protocol will be used.
const B3_TRACE_ID_HEADER: &str = "x-b3-traceid";
const B3_SPAN_ID_HEADER: &str = "x-b3-spanid";
const B3_SAMPLED_HEADER: &str = "x-b3-sampled";
const B3_DEBUG_FLAG_HEADER: &str = "x-b3-flags";
const TRACESTATE_HEADER: &str = "tracestate";

const DEBUG_ENTRY: &str = "debug";

// TODO Replace this with LazyLock once it is stable.
static B3_MULTI_FIELDS: OnceLock<[String; 5]> = OnceLock::new();

fn b3_multi_fields() -> &'static [String; 5] {
    B3_MULTI_FIELDS.get_or_init(|| {
        [
            B3_TRACE_ID_HEADER.to_owned(),
            B3_SPAN_ID_HEADER.to_owned(),
            B3_SAMPLED_HEADER.to_owned(),
            B3_DEBUG_FLAG_HEADER.to_owned(),
            TRACESTATE_HEADER.to_owned(),
        ]
    })
}

fn is_lower_hex(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Extracts and injects `SpanContext`s into `Extractor`s or `Injector`s
/// using the B3 multiple-header format.
///
/// A carrier without an `x-b3-traceid` header is treated as absent context
/// and extraction returns the given context unchanged. Once the trace id is
/// present, a missing or undecodable `x-b3-spanid` (and any other
/// undecodable companion header) is a [`PropagationError`] naming the
/// offending header. A missing `x-b3-sampled` defaults to not sampled.
#[derive(Clone, Debug, Default)]
pub struct Propagator {
    _private: (),
}

impl Propagator {
    /// Create a new B3 multi-header propagator.
    pub fn new() -> Self {
        Propagator::default()
    }

    /// Extract trace id from hex encoded &str value.
    ///
    /// B3 allows both 64-bit (16 hex chars) and 128-bit (32 hex chars)
    /// trace ids; only lower case is accepted.
    fn extract_trace_id(&self, trace_id: &str) -> Result<TraceId, PropagationError> {
        if !is_lower_hex(trace_id) || (trace_id.len() != 16 && trace_id.len() != 32) {
            return Err(PropagationError::invalid_field(B3_TRACE_ID_HEADER, trace_id));
        }
        TraceId::from_hex(trace_id)
            .map_err(|_| PropagationError::invalid_field(B3_TRACE_ID_HEADER, trace_id))
    }

    /// Extract span id from hex encoded &str value.
    fn extract_span_id(&self, span_id: &str) -> Result<SpanId, PropagationError> {
        if !is_lower_hex(span_id) || span_id.len() != 16 {
            return Err(PropagationError::invalid_field(B3_SPAN_ID_HEADER, span_id));
        }
        SpanId::from_hex(span_id)
            .map_err(|_| PropagationError::invalid_field(B3_SPAN_ID_HEADER, span_id))
    }

    /// Extract the flags byte from the `x-b3-sampled` header value.
    fn extract_sampled_state(&self, sampled: &str) -> Result<TraceFlags, PropagationError> {
        if !is_lower_hex(sampled) || sampled.len() > 2 {
            return Err(PropagationError::invalid_field(B3_SAMPLED_HEADER, sampled));
        }
        u8::from_str_radix(sampled, 16)
            .map(TraceFlags::new)
            .map_err(|_| PropagationError::invalid_field(B3_SAMPLED_HEADER, sampled))
    }

    /// Extract a `SpanContext` from the B3 multi headers, or `None` if the
    /// carrier holds no `x-b3-traceid`.
    fn extract_span_context(
        &self,
        extractor: &dyn Extractor,
    ) -> Result<Option<SpanContext>, PropagationError> {
        let trace_id = match extractor.get(B3_TRACE_ID_HEADER) {
            Some(trace_id_hex) => self.extract_trace_id(trace_id_hex)?,
            None => return Ok(None),
        };

        let span_id = match extractor.get(B3_SPAN_ID_HEADER) {
            Some(span_id_hex) => self.extract_span_id(span_id_hex)?,
            None => return Err(PropagationError::invalid_field(B3_SPAN_ID_HEADER, "")),
        };

        let trace_flags = match extractor.get(B3_SAMPLED_HEADER) {
            Some(sampled) => self.extract_sampled_state(sampled)?,
            None => TraceFlags::NOT_SAMPLED,
        };

        let mut trace_state = match extractor.get(TRACESTATE_HEADER) {
            Some(trace_state_str) => TraceState::from_str(trace_state_str)?,
            None => TraceState::default(),
        };

        // Debug travels by key in the trace state, never by entry position.
        // Only insert when the header disagrees with the parsed trace state,
        // as inserting would move an existing entry to the front.
        if let Some(debug_flag) = extractor.get(B3_DEBUG_FLAG_HEADER) {
            let debug_value = if !debug_flag.is_empty() && debug_flag != "0" {
                "1"
            } else {
                "0"
            };
            if trace_state.get(DEBUG_ENTRY) != Some(debug_value) {
                trace_state = trace_state.insert(DEBUG_ENTRY, debug_value)?;
            }
        }

        Ok(Some(SpanContext::new(
            trace_id,
            span_id,
            trace_flags,
            true,
            trace_state,
        )))
    }
}

impl TextMapPropagator for Propagator {
    /// Properly encodes the values of the `Context` and injects them into
    /// the `Injector`.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span_context = cx.span_context();
        injector.set(B3_TRACE_ID_HEADER, span_context.trace_id().to_string());
        injector.set(B3_SPAN_ID_HEADER, span_context.span_id().to_string());
        injector.set(
            B3_SAMPLED_HEADER,
            format!("{:02x}", span_context.trace_flags()),
        );

        let trace_state = span_context.trace_state();
        if let Some(debug_value) = trace_state.get(DEBUG_ENTRY) {
            injector.set(B3_DEBUG_FLAG_HEADER, debug_value.to_string());
        }
        if !trace_state.is_empty() {
            injector.set(TRACESTATE_HEADER, trace_state.header());
        }
    }

    /// Retrieves encoded data using the provided `Extractor`. A carrier
    /// without a trace id leaves the context unchanged; malformed headers
    /// are errors.
    fn extract_with_context(
        &self,
        cx: &Context,
        extractor: &dyn Extractor,
    ) -> Result<Context, PropagationError> {
        match self.extract_span_context(extractor)? {
            Some(sc) => Ok(cx.with_remote_span_context(sc)),
            None => Ok(cx.clone()),
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(b3_multi_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TRACE_ID_HEX: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const SPAN_ID_HEX: &str = "00f067aa0ba902b7";

    fn trace_id() -> TraceId {
        TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736)
    }

    fn span_id() -> SpanId {
        SpanId::from(0x00f0_67aa_0ba9_02b7)
    }

    fn carrier(headers: &[(&str, &str)]) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rustfmt::skip]
    fn extract_data() -> Vec<(Vec<(&'static str, &'static str)>, SpanContext)> {
        vec![
            // sampled
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "01")],
             SpanContext::new(trace_id(), span_id(), TraceFlags::SAMPLED, true, TraceState::default())),
            // not sampled
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "00")],
             SpanContext::new(trace_id(), span_id(), TraceFlags::default(), true, TraceState::default())),
            // absent sampled defaults to not sampled
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX)],
             SpanContext::new(trace_id(), span_id(), TraceFlags::default(), true, TraceState::default())),
            // 64-bit trace id
            (vec![(B3_TRACE_ID_HEADER, "a3ce929d0e0e4736"), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "01")],
             SpanContext::new(TraceId::from(0xa3ce_929d_0e0e_4736), span_id(), TraceFlags::SAMPLED, true, TraceState::default())),
            // trace state rides along
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "01"), (TRACESTATE_HEADER, "foo:bar,apple:banana")],
             SpanContext::new(trace_id(), span_id(), TraceFlags::SAMPLED, true, TraceState::from_key_value(vec![("foo", "bar"), ("apple", "banana")]).unwrap())),
            // debug flag becomes a trace state entry
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "01"), (B3_DEBUG_FLAG_HEADER, "1")],
             SpanContext::new(trace_id(), span_id(), TraceFlags::SAMPLED, true, TraceState::from_key_value(vec![("debug", "1")]).unwrap())),
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "01"), (B3_DEBUG_FLAG_HEADER, "d")],
             SpanContext::new(trace_id(), span_id(), TraceFlags::SAMPLED, true, TraceState::from_key_value(vec![("debug", "1")]).unwrap())),
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "01"), (B3_DEBUG_FLAG_HEADER, "0")],
             SpanContext::new(trace_id(), span_id(), TraceFlags::SAMPLED, true, TraceState::from_key_value(vec![("debug", "0")]).unwrap())),
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "01"), (B3_DEBUG_FLAG_HEADER, "")],
             SpanContext::new(trace_id(), span_id(), TraceFlags::SAMPLED, true, TraceState::from_key_value(vec![("debug", "0")]).unwrap())),
            // all-zero ids are well formed; invalidity travels
            (vec![(B3_TRACE_ID_HEADER, "00000000000000000000000000000000"), (B3_SPAN_ID_HEADER, "0000000000000000"), (B3_SAMPLED_HEADER, "01")],
             SpanContext::new(TraceId::INVALID, SpanId::INVALID, TraceFlags::SAMPLED, true, TraceState::default())),
        ]
    }

    #[rustfmt::skip]
    fn extract_data_invalid() -> Vec<(Vec<(&'static str, &'static str)>, &'static str)> {
        vec![
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX)], "missing span id"),
            (vec![(B3_TRACE_ID_HEADER, "4BF92F3577B34DA6A3CE929D0E0E4736"), (B3_SPAN_ID_HEADER, SPAN_ID_HEX)], "upper case trace id"),
            (vec![(B3_TRACE_ID_HEADER, "4bf92f3577b34da6"), (B3_SPAN_ID_HEADER, "00F067AA0BA902B7")], "upper case span id"),
            (vec![(B3_TRACE_ID_HEADER, "4bf92f35"), (B3_SPAN_ID_HEADER, SPAN_ID_HEX)], "wrong trace id length"),
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, "00f067aa")], "wrong span id length"),
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "true")], "non-hex sampled"),
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (B3_SAMPLED_HEADER, "012")], "sampled too long"),
            (vec![(B3_TRACE_ID_HEADER, TRACE_ID_HEX), (B3_SPAN_ID_HEADER, SPAN_ID_HEX), (TRACESTATE_HEADER, "no-delimiter")], "malformed trace state"),
        ]
    }

    #[test]
    fn extract_b3_multi() {
        let propagator = Propagator::new();

        for (headers, expected_context) in extract_data() {
            let extractor = carrier(&headers);
            assert_eq!(
                propagator.extract(&extractor).unwrap().span_context(),
                &expected_context,
                "{headers:?}"
            )
        }
    }

    #[test]
    fn extract_b3_multi_absent_trace_id_is_not_an_error() {
        let propagator = Propagator::new();
        // a span id alone is not a context, the carrier counts as absent
        let extractor = carrier(&[(B3_SPAN_ID_HEADER, SPAN_ID_HEX)]);

        let cx = propagator.extract(&extractor).unwrap();
        assert_eq!(cx.span_context(), &SpanContext::empty_context());
    }

    #[test]
    fn extract_b3_multi_reject_invalid() {
        let propagator = Propagator::new();

        for (headers, reason) in extract_data_invalid() {
            let extractor = carrier(&headers);
            assert!(propagator.extract(&extractor).is_err(), "{reason}");
        }
    }

    #[test]
    fn inject_b3_multi() {
        let propagator = Propagator::new();
        let context = SpanContext::new(
            trace_id(),
            span_id(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );

        let mut injector = HashMap::new();
        propagator.inject_context(&Context::new().with_remote_span_context(context), &mut injector);

        assert_eq!(
            Extractor::get(&injector, B3_TRACE_ID_HEADER),
            Some(TRACE_ID_HEX)
        );
        assert_eq!(
            Extractor::get(&injector, B3_SPAN_ID_HEADER),
            Some(SPAN_ID_HEX)
        );
        assert_eq!(Extractor::get(&injector, B3_SAMPLED_HEADER), Some("01"));
        assert_eq!(Extractor::get(&injector, B3_DEBUG_FLAG_HEADER), None);
        assert_eq!(Extractor::get(&injector, TRACESTATE_HEADER), None);
    }

    #[test]
    fn inject_b3_multi_debug_and_trace_state() {
        let propagator = Propagator::new();
        let trace_state =
            TraceState::from_key_value(vec![("debug", "1"), ("foo", "bar")]).unwrap();
        let context = SpanContext::new(trace_id(), span_id(), TraceFlags::SAMPLED, true, trace_state);

        let mut injector = HashMap::new();
        propagator.inject_context(&Context::new().with_remote_span_context(context), &mut injector);

        assert_eq!(Extractor::get(&injector, B3_DEBUG_FLAG_HEADER), Some("1"));
        assert_eq!(
            Extractor::get(&injector, TRACESTATE_HEADER),
            Some("debug:1,foo:bar")
        );
    }

    #[test]
    fn b3_multi_round_trip() {
        let propagator = Propagator::new();
        let context = SpanContext::new(
            trace_id(),
            span_id(),
            TraceFlags::SAMPLED,
            true,
            TraceState::from_key_value(vec![("debug", "1"), ("foo", "bar")]).unwrap(),
        );

        let mut carrier = HashMap::new();
        propagator.inject_context(
            &Context::new().with_remote_span_context(context.clone()),
            &mut carrier,
        );

        let extracted = propagator.extract(&carrier).unwrap();
        assert_eq!(extracted.span_context(), &context);
        assert!(extracted.span_context().is_remote());
    }

    #[test]
    fn b3_multi_round_trip_keeps_trace_state_order() {
        let propagator = Propagator::new();
        // the debug entry is deliberately not at the front
        let context = SpanContext::new(
            trace_id(),
            span_id(),
            TraceFlags::SAMPLED,
            true,
            TraceState::from_key_value(vec![("foo", "bar"), ("debug", "1")]).unwrap(),
        );

        let mut carrier = HashMap::new();
        propagator.inject_context(
            &Context::new().with_remote_span_context(context.clone()),
            &mut carrier,
        );
        assert_eq!(
            Extractor::get(&carrier, TRACESTATE_HEADER),
            Some("foo:bar,debug:1")
        );
        assert_eq!(Extractor::get(&carrier, B3_DEBUG_FLAG_HEADER), Some("1"));

        let extracted = propagator.extract(&carrier).unwrap();
        assert_eq!(extracted.span_context(), &context);
        assert_eq!(
            extracted.span_context().trace_state().header(),
            "foo:bar,debug:1"
        );
    }

    #[test]
    fn b3_multi_header_fields() {
        let propagator = Propagator::new();
        let fields = propagator.fields().collect::<Vec<_>>();
        assert_eq!(
            fields,
            vec![
                B3_TRACE_ID_HEADER,
                B3_SPAN_ID_HEADER,
                B3_SAMPLED_HEADER,
                B3_DEBUG_FLAG_HEADER,
                TRACESTATE_HEADER,
            ]
        );
    }
}
