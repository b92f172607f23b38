//! # Binary Propagator
//!
//! `BinaryFormat` is a formatter to serialize and deserialize a value into a
//! binary format, for carriers that are not header maps (message queues,
//! process metadata blocks).
//!
//! `BinaryFormat` MUST expose the APIs that serializes values into bytes,
//! and deserializes values from bytes.
use tracelink::{
    baggage::Baggage,
    propagation::PropagationError,
    trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState},
};

const VERSION: u8 = 0x00;

// Field tags of the span context layout.
const TRACE_ID_FIELD: u8 = 0x00;
const SPAN_ID_FIELD: u8 = 0x01;
const FLAGS_FIELD: u8 = 0x02;
const SPAN_CONTEXT_LEN: usize = 29;

// Entry tag of the baggage layout.
const BAGGAGE_ENTRY_FIELD: u8 = 0x00;

/// Used to serialize and deserialize a value to and from a binary
/// representation.
///
/// Absence and malformation are kept distinct, as for the text codecs: an
/// empty buffer deserializes to the type's empty value, while a buffer that
/// is present but does not follow the layout is a [`PropagationError`].
pub trait BinaryFormat<T> {
    /// Serializes the value into a byte array and returns the array.
    fn to_bytes(&self, value: &T) -> Vec<u8>;

    /// Deserializes a value from a byte array.
    fn from_bytes(&self, bytes: &[u8]) -> Result<T, PropagationError>;
}

/// Serializes span contexts and baggage to and from byte arrays.
///
/// The span context layout is 29 bytes: a version byte `0x00`, then three
/// tagged fields (`0x00` + 16-byte trace id, `0x01` + 8-byte span id, `0x02`
/// + flags byte). An invalid context serializes with all-zero ids so that
/// the encoding round-trips.
///
/// The baggage layout is a version byte `0x00` followed by one `0x00`-tagged
/// entry per pair, each a sequence of u16 big-endian length-prefixed key,
/// value and metadata strings.
#[derive(Debug, Default)]
pub struct BinaryPropagator {
    _private: (),
}

impl BinaryPropagator {
    /// Create a new binary propagator.
    pub fn new() -> Self {
        BinaryPropagator { _private: () }
    }
}

fn malformed(bytes: &[u8]) -> PropagationError {
    PropagationError::invalid_field("binary context", format!("{bytes:02x?}"))
}

impl BinaryFormat<SpanContext> for BinaryPropagator {
    /// Serializes a span context into a byte array and returns the array.
    fn to_bytes(&self, context: &SpanContext) -> Vec<u8> {
        let mut res = vec![0u8; SPAN_CONTEXT_LEN];
        res[0] = VERSION;
        res[1] = TRACE_ID_FIELD;
        res[2..18].copy_from_slice(&context.trace_id().to_bytes());
        res[18] = SPAN_ID_FIELD;
        res[19..27].copy_from_slice(&context.span_id().to_bytes());
        res[27] = FLAGS_FIELD;
        res[28] = context.trace_flags().to_u8();

        res
    }

    /// Deserializes a span context from a byte array.
    fn from_bytes(&self, bytes: &[u8]) -> Result<SpanContext, PropagationError> {
        if bytes.is_empty() {
            return Ok(SpanContext::empty_context());
        }
        if bytes.len() != SPAN_CONTEXT_LEN
            || bytes[0] != VERSION
            || bytes[1] != TRACE_ID_FIELD
            || bytes[18] != SPAN_ID_FIELD
            || bytes[27] != FLAGS_FIELD
        {
            return Err(malformed(bytes));
        }

        let mut trace_id = [0u8; 16];
        trace_id.copy_from_slice(&bytes[2..18]);
        let mut span_id = [0u8; 8];
        span_id.copy_from_slice(&bytes[19..27]);

        Ok(SpanContext::new(
            TraceId::from_bytes(trace_id),
            SpanId::from_bytes(span_id),
            TraceFlags::new(bytes[28]),
            true,
            TraceState::default(),
        ))
    }
}

impl BinaryFormat<Baggage> for BinaryPropagator {
    /// Serializes baggage into a byte array and returns the array.
    fn to_bytes(&self, baggage: &Baggage) -> Vec<u8> {
        let mut res = vec![VERSION];
        for (key, (value, metadata)) in baggage {
            res.push(BAGGAGE_ENTRY_FIELD);
            for field in [key.as_str(), value.as_str(), metadata.as_str()] {
                let len = field.len().min(u16::MAX as usize) as u16;
                res.extend_from_slice(&len.to_be_bytes());
                res.extend_from_slice(&field.as_bytes()[..len as usize]);
            }
        }
        res
    }

    /// Deserializes baggage from a byte array.
    fn from_bytes(&self, bytes: &[u8]) -> Result<Baggage, PropagationError> {
        if bytes.is_empty() {
            return Ok(Baggage::new());
        }
        if bytes[0] != VERSION {
            return Err(malformed(bytes));
        }

        let mut baggage = Baggage::new();
        let mut rest = &bytes[1..];
        while !rest.is_empty() {
            if rest[0] != BAGGAGE_ENTRY_FIELD {
                return Err(malformed(bytes));
            }
            rest = &rest[1..];

            let mut fields = Vec::with_capacity(3);
            for _ in 0..3 {
                if rest.len() < 2 {
                    return Err(malformed(bytes));
                }
                let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
                rest = &rest[2..];
                if rest.len() < len {
                    return Err(malformed(bytes));
                }
                let field = std::str::from_utf8(&rest[..len]).map_err(|_| malformed(bytes))?;
                fields.push(field.to_string());
                rest = &rest[len..];
            }

            let metadata = fields.pop().unwrap_or_default();
            let value = fields.pop().unwrap_or_default();
            let key = fields.pop().unwrap_or_default();
            baggage.insert_with_metadata(key, value, metadata);
        }
        Ok(baggage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn to_bytes_data() -> Vec<(SpanContext, Vec<u8>)> {
        vec![
            // Context with sampled
            (SpanContext::new(
               TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
               SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::SAMPLED, true, TraceState::default()), vec![
                0x00, 0x00, 0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36,
                0x01, 0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7,
                0x02, 0x01,
            ]),
            // Context without sampled
            (SpanContext::new(
               TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736),
               SpanId::from(0x00f0_67aa_0ba9_02b7), TraceFlags::default(), true, TraceState::default()), vec![
                0x00, 0x00, 0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36,
                0x01, 0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7,
                0x02, 0x00,
            ]),
            // Invalid context writes the full layout with zero ids
            (SpanContext::empty_context(), vec![
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x02, 0x00,
            ]),
        ]
    }

    #[rustfmt::skip]
    fn from_bytes_invalid_data() -> Vec<(Vec<u8>, &'static str)> {
        vec![
            // Future version of the layout
            (vec![
                0x02, 0x00, 0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36,
                0x01, 0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7,
                0x02, 0x01,
            ], "unknown version"),
            // wrong trace id field number
            (vec![
                0x00, 0x01, 0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36,
                0x01, 0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7,
                0x02, 0x01,
            ], "wrong trace id tag"),
            // truncated after span id
            (vec![
                0x00, 0x00, 0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36,
                0x01, 0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7,
            ], "missing flags field"),
            // short byte array
            (vec![
                0x00, 0x00, 0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d,
            ], "short byte array"),
            // trailing garbage
            (vec![
                0x00, 0x00, 0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47, 0x36,
                0x01, 0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7,
                0x02, 0x01, 0xff,
            ], "oversized buffer"),
        ]
    }

    #[test]
    fn to_bytes_conversion() {
        let propagator = BinaryPropagator::new();

        for (context, data) in to_bytes_data() {
            assert_eq!(propagator.to_bytes(&context), data)
        }
    }

    #[test]
    fn from_bytes_conversion() {
        let propagator = BinaryPropagator::new();

        for (context, data) in to_bytes_data() {
            let decoded: SpanContext = propagator.from_bytes(&data).unwrap();
            assert_eq!(decoded.trace_id(), context.trace_id());
            assert_eq!(decoded.span_id(), context.span_id());
            assert_eq!(decoded.trace_flags(), context.trace_flags());
            assert!(decoded.is_remote() || !decoded.is_valid());
        }
    }

    #[test]
    fn from_bytes_empty_input_is_absent() {
        let propagator = BinaryPropagator::new();
        let decoded: SpanContext = propagator.from_bytes(&[]).unwrap();
        assert_eq!(decoded, SpanContext::empty_context());
    }

    #[test]
    fn from_bytes_reject_invalid() {
        let propagator = BinaryPropagator::new();

        for (data, reason) in from_bytes_invalid_data() {
            let result: Result<SpanContext, _> = propagator.from_bytes(&data);
            assert!(result.is_err(), "{reason}");
        }
    }

    #[test]
    fn invalid_context_round_trips() {
        let propagator = BinaryPropagator::new();

        let encoded = propagator.to_bytes(&SpanContext::empty_context());
        let decoded: SpanContext = propagator.from_bytes(&encoded).unwrap();
        assert!(!decoded.is_valid());
    }

    #[test]
    fn baggage_round_trip() {
        let propagator = BinaryPropagator::new();

        let baggage = Baggage::builder()
            .set("user_id", "42")
            .set_with_metadata("flavor", "sweet", "prop=1")
            .set("empty", "")
            .build();

        let encoded = propagator.to_bytes(&baggage);
        assert_eq!(encoded[0], 0x00);

        let decoded: Baggage = propagator.from_bytes(&encoded).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded.get("user_id").map(|v| v.as_str()), Some("42"));
        assert_eq!(
            decoded
                .get_with_metadata("flavor")
                .map(|(v, m)| (v.as_str(), m.as_str())),
            Some(("sweet", "prop=1"))
        );
        assert_eq!(decoded.get("empty").map(|v| v.as_str()), Some(""));
    }

    #[test]
    fn empty_baggage_encodes_version_only() {
        let propagator = BinaryPropagator::new();

        let encoded = propagator.to_bytes(&Baggage::new());
        assert_eq!(encoded, vec![0x00]);

        let decoded: Baggage = propagator.from_bytes(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn baggage_reject_truncated() {
        let propagator = BinaryPropagator::new();

        let baggage = Baggage::builder().set("user_id", "42").build();
        let encoded = propagator.to_bytes(&baggage);

        // length 1 is just the version byte, which decodes as empty baggage
        for len in 2..encoded.len() {
            let result: Result<Baggage, _> = propagator.from_bytes(&encoded[..len]);
            assert!(result.is_err(), "truncated at {len}");
        }

        let result: Result<Baggage, _> = propagator.from_bytes(&[0x01]);
        assert!(result.is_err(), "unknown version");
    }
}
