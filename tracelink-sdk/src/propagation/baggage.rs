use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::iter;
use std::sync::OnceLock;
use tracelink::{
    baggage::{BaggageExt, KeyValueMetadata},
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, PropagationError, TextMapPropagator},
    tracelink_warn, Context,
};

static BAGGAGE_HEADER: &str = "baggage";
const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b';').add(b',').add(b'=');

// TODO Replace this with LazyLock once it is stable.
static BAGGAGE_FIELDS: OnceLock<[String; 1]> = OnceLock::new();
#[inline]
fn baggage_fields() -> &'static [String; 1] {
    BAGGAGE_FIELDS.get_or_init(|| [BAGGAGE_HEADER.to_owned()])
}

/// Propagates name-value pairs in [W3C Baggage] format.
///
/// Baggage is used to annotate telemetry, adding context and
/// information to metrics, traces, and logs. It is an abstract data type
/// represented by a set of name-value pairs describing user-defined properties.
/// Each name in a [`Baggage`] is associated with exactly one value.
/// `Baggage`s are serialized according to the editor's draft of
/// the [W3C Baggage] specification.
///
/// An entry that is present but cannot be parsed (no `=` delimiter, or a
/// percent-encoded sequence that is not valid UTF-8) aborts extraction with
/// a [`PropagationError`]; a missing `baggage` header is not an error.
///
/// # Examples
///
/// ```
/// use tracelink::{baggage::{Baggage, BaggageExt}, propagation::TextMapPropagator};
/// use tracelink_sdk::propagation::BaggagePropagator;
/// use std::collections::HashMap;
///
/// // Example baggage value passed in externally via http headers
/// let mut headers = HashMap::new();
/// headers.insert("baggage".to_string(), "user_id=1".to_string());
///
/// let propagator = BaggagePropagator::new();
/// // can extract from any type that impls `Extractor`, usually an HTTP header map
/// let cx = propagator.extract(&headers).expect("header is well formed");
///
/// // Iterate over extracted name-value pairs
/// for (name, (value, _metadata)) in cx.baggage() {
///     // ...
/// }
///
/// // Add new baggage
/// let cx_with_additions = cx.with_baggage(
///     cx.baggage().to_builder().set("server_id", "42").build(),
/// );
///
/// // Inject baggage into http request
/// propagator.inject_context(&cx_with_additions, &mut headers);
///
/// let header_value = headers.get("baggage").expect("header is injected");
/// assert!(header_value.contains("user_id=1"), "still contains previous name-value");
/// assert!(header_value.contains("server_id=42"), "contains new name-value pair");
/// ```
///
/// [W3C Baggage]: https://w3c.github.io/baggage
/// [`Baggage`]: tracelink::baggage::Baggage
#[derive(Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Construct a new baggage propagator.
    pub fn new() -> Self {
        BaggagePropagator { _private: () }
    }
}

impl TextMapPropagator for BaggagePropagator {
    /// Encodes the values of the `Context` and injects them into the provided `Injector`.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let baggage = cx.baggage();
        if !baggage.is_empty() {
            let header_value = baggage
                .iter()
                .map(|(name, (value, metadata))| {
                    let metadata_str = metadata.as_str().trim();
                    let metadata_prefix = if metadata_str.is_empty() { "" } else { ";" };
                    utf8_percent_encode(name.as_str().trim(), FRAGMENT)
                        .chain(iter::once("="))
                        .chain(utf8_percent_encode(value.as_str().trim(), FRAGMENT))
                        .chain(iter::once(metadata_prefix))
                        .chain(iter::once(metadata_str))
                        .collect()
                })
                .collect::<Vec<String>>()
                .join(",");
            injector.set(BAGGAGE_HEADER, header_value);
        }
    }

    /// Extracts a `Context` with baggage values from a `Extractor`.
    fn extract_with_context(
        &self,
        cx: &Context,
        extractor: &dyn Extractor,
    ) -> Result<Context, PropagationError> {
        let header_value = match extractor.get(BAGGAGE_HEADER) {
            Some(header_value) => header_value,
            None => return Ok(cx.clone()),
        };

        let mut baggage = Vec::new();
        for context_value in header_value.split(',') {
            let mut parts = context_value.split(';');
            let name_and_value = match parts.next() {
                Some(name_and_value) => name_and_value,
                None => continue,
            };

            let mut iter = name_and_value.split('=');
            let (name, value) = match (iter.next(), iter.next()) {
                (Some(name), Some(value)) => (name, value),
                _ => {
                    tracelink_warn!(
                        name: "BaggagePropagator.Extract.InvalidKeyValueFormat",
                        entry = context_value,
                    );
                    return Err(PropagationError::invalid_field(
                        BAGGAGE_HEADER,
                        context_value,
                    ));
                }
            };

            let decode_name = percent_decode_str(name).decode_utf8();
            let decode_value = percent_decode_str(value).decode_utf8();
            let (name, value) = match (decode_name, decode_value) {
                (Ok(name), Ok(value)) => (name, value),
                _ => {
                    tracelink_warn!(
                        name: "BaggagePropagator.Extract.InvalidUTF8",
                        entry = context_value,
                    );
                    return Err(PropagationError::invalid_field(
                        BAGGAGE_HEADER,
                        context_value,
                    ));
                }
            };

            // The first ; is a separator rather than part of the metadata.
            let decoded_props = parts
                .flat_map(|prop| percent_decode_str(prop).decode_utf8())
                .map(|prop| prop.trim().to_string())
                .collect::<Vec<String>>()
                .join(";");

            baggage.push(KeyValueMetadata::new(
                name.trim().to_owned(),
                value.trim().to_string(),
                decoded_props.as_str(),
            ));
        }
        Ok(cx.with_baggage(baggage))
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(baggage_fields())
    }
}
