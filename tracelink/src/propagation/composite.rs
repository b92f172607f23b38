//! # Composite Propagator
//!
//! A utility over multiple codecs to group codecs from different
//! cross-cutting concerns in order to leverage them as a single entity.
//!
//! Each composite codec will implement a specific codec type, such as
//! [`TextMapPropagator`], as different codec types will likely operate on
//! different data types.
use crate::{
    propagation::{
        text_map_propagator::FieldIter, Extractor, Injector, PropagationError, TextMapPropagator,
    },
    Context,
};
use std::collections::HashSet;

/// Composite propagator for [`TextMapPropagator`]s.
///
/// A propagator that chains multiple [`TextMapPropagator`] propagators
/// together, injecting or extracting by their respective HTTP header names.
///
/// Injection and extraction from this propagator will preserve the order of
/// the propagators passed in during initialization. Extraction is
/// short-circuiting: if any member reports malformed carrier data, the error
/// is returned and later members are not consulted.
///
/// # Examples
///
/// ```
/// use tracelink::{
///     propagation::{TextMapPropagator, TextMapCompositePropagator},
///     trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
///     Context,
/// };
/// use tracelink_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
/// use std::collections::HashMap;
///
/// // First create 1 or more propagators
/// let baggage_propagator = BaggagePropagator::new();
/// let trace_context_propagator = TraceContextPropagator::new();
///
/// // Then create a composite propagator
/// let composite_propagator = TextMapCompositePropagator::new(vec![
///     Box::new(baggage_propagator),
///     Box::new(trace_context_propagator),
/// ]);
///
/// // Then for a given implementation of `Injector`
/// let mut injector = HashMap::new();
///
/// // And a given remote span context
/// let cx = Context::new().with_remote_span_context(SpanContext::new(
///     TraceId::from(1u128),
///     SpanId::from(1u64),
///     TraceFlags::SAMPLED,
///     true,
///     TraceState::NONE,
/// ));
///
/// // call inject_context to add the headers
/// composite_propagator.inject_context(&cx, &mut injector);
///
/// // The injector now has a `traceparent` header
/// assert!(injector.get("traceparent").is_some());
/// ```
#[derive(Debug)]
pub struct TextMapCompositePropagator {
    propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>,
    fields: Vec<String>,
}

impl TextMapCompositePropagator {
    /// Constructs a new propagator out of instances of [`TextMapPropagator`].
    ///
    /// [`TextMapPropagator`]: TextMapPropagator
    pub fn new(propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>) -> Self {
        let mut fields = HashSet::new();
        for propagator in &propagators {
            for field in propagator.fields() {
                fields.insert(field.to_string());
            }
        }

        TextMapCompositePropagator {
            propagators,
            fields: fields.into_iter().collect(),
        }
    }
}

impl TextMapPropagator for TextMapCompositePropagator {
    /// Encodes the values of the `Context` and injects them into the `Injector`.
    fn inject_context(&self, context: &Context, injector: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject_context(context, injector)
        }
    }

    /// Runs each member codec over the carrier in order, threading the
    /// context through so later members see what earlier members extracted.
    fn extract_with_context(
        &self,
        cx: &Context,
        extractor: &dyn Extractor,
    ) -> Result<Context, PropagationError> {
        self.propagators
            .iter()
            .try_fold(cx.clone(), |current_cx, propagator| {
                propagator.extract_with_context(&current_cx, extractor)
            })
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(self.fields.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use crate::baggage::BaggageExt;
    use crate::{
        propagation::{
            text_map_propagator::FieldIter, Extractor, Injector, PropagationError,
            TextMapCompositePropagator, TextMapPropagator,
        },
        trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
        Context, KeyValue,
    };
    use std::collections::HashMap;

    /// A test propagator that injects and extracts a single header.
    #[derive(Debug)]
    struct TestPropagator {
        header: &'static str,
        fields: Vec<String>, // used by fields method
    }

    impl TestPropagator {
        fn new(header: &'static str) -> Self {
            TestPropagator {
                header,
                fields: vec![header.to_string()],
            }
        }
    }

    impl TextMapPropagator for TestPropagator {
        fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
            let span_context = cx.span_context();
            match self.header {
                "span-id" => injector.set(self.header, format!("{}", span_context.span_id())),
                "baggage" => injector.set(self.header, cx.baggage().to_string()),
                _ => {}
            }
        }

        fn extract_with_context(
            &self,
            cx: &Context,
            extractor: &dyn Extractor,
        ) -> Result<Context, PropagationError> {
            match (self.header, extractor.get(self.header)) {
                ("span-id", Some(val)) => {
                    let span_id = SpanId::from_hex(val)
                        .map_err(|_| PropagationError::invalid_field("span-id", val))?;
                    Ok(cx.with_remote_span_context(SpanContext::new(
                        TraceId::from(1u128),
                        span_id,
                        TraceFlags::default(),
                        false,
                        TraceState::default(),
                    )))
                }
                ("baggage", Some(_)) => {
                    Ok(cx.with_baggage(vec![KeyValue::new("baggagekey", "value")]))
                }
                _ => Ok(cx.clone()),
            }
        }

        fn fields(&self) -> FieldIter<'_> {
            FieldIter::new(self.fields.as_slice())
        }
    }

    fn setup() -> Context {
        let cx = Context::default().with_remote_span_context(SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(11u64),
            TraceFlags::default(),
            true,
            TraceState::default(),
        ));
        // setup for baggage codec
        cx.with_baggage(vec![KeyValue::new("baggagekey", "value")])
    }

    fn test_data() -> Vec<(&'static str, &'static str)> {
        vec![("span-id", "000000000000000b"), ("baggage", "baggagekey=value")]
    }

    #[test]
    fn zero_propagators_are_noop() {
        let composite_propagator = TextMapCompositePropagator::new(vec![]);
        let cx = setup();

        let mut injector = HashMap::new();
        composite_propagator.inject_context(&cx, &mut injector);

        assert_eq!(injector.len(), 0);
        for (header_name, header_value) in test_data() {
            let mut extractor = HashMap::new();
            extractor.insert(header_name.to_string(), header_value.to_string());
            assert_eq!(
                composite_propagator
                    .extract(&extractor)
                    .unwrap()
                    .span_context(),
                &SpanContext::empty_context()
            );
        }
    }

    #[test]
    fn inject_multiple_propagators() {
        let composite_propagator = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("span-id")),
            Box::new(TestPropagator::new("baggage")),
        ]);

        let cx = setup();
        let mut injector = HashMap::new();
        composite_propagator.inject_context(&cx, &mut injector);

        for (header_name, header_value) in test_data() {
            assert_eq!(injector.get(header_name), Some(&header_value.to_string()));
        }
    }

    #[test]
    fn extract_multiple_propagators() {
        let composite_propagator = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("span-id")),
            Box::new(TestPropagator::new("baggage")),
        ]);

        let mut extractor = HashMap::new();
        for (header_name, header_value) in test_data() {
            extractor.insert(header_name.to_string(), header_value.to_string());
        }
        let cx = composite_propagator.extract(&extractor).unwrap();
        assert_eq!(
            cx.span_context(),
            &SpanContext::new(
                TraceId::from(1u128),
                SpanId::from(11u64),
                TraceFlags::default(),
                false,
                TraceState::default(),
            )
        );
        assert_eq!(cx.baggage().to_string(), "baggagekey=value",);
    }

    #[test]
    fn extract_stops_at_first_error() {
        let composite_propagator = TextMapCompositePropagator::new(vec![
            Box::new(TestPropagator::new("span-id")),
            Box::new(TestPropagator::new("baggage")),
        ]);

        let mut extractor = HashMap::new();
        extractor.insert("span-id".to_string(), "not-hex".to_string());
        extractor.insert("baggage".to_string(), "baggagekey=value".to_string());

        let err = composite_propagator.extract(&extractor).unwrap_err();
        assert_eq!(err, PropagationError::invalid_field("span-id", "not-hex"));
    }

    #[test]
    fn test_get_fields() {
        let test_cases = vec![
            // name, header_name, expected_result
            (
                "multiple propagators with order",
                vec!["span-id", "baggage"],
                vec!["baggage", "span-id"],
            ),
        ];

        for test_case in test_cases {
            let test_propagators = test_case
                .1
                .into_iter()
                .map(|name| {
                    Box::new(TestPropagator::new(name)) as Box<dyn TextMapPropagator + Send + Sync>
                })
                .collect();

            let composite_propagator = TextMapCompositePropagator::new(test_propagators);

            let mut fields = composite_propagator
                .fields()
                .map(|s| s.to_string())
                .collect::<Vec<String>>();
            fields.sort();

            assert_eq!(fields, test_case.2);
        }
    }
}
